use std::fmt::Display;

use tracing::trace;

use crate::token::{Delim, Keyword, TableCode, TableEntry, Token};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ty {
    Int,
    Float,
    Bool,
}

impl Display for Ty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Int => "int",
                Self::Float => "float",
                Self::Bool => "bool",
            }
        )
    }
}

impl Ty {
    /// The type named by a type keyword token.
    pub fn from_keyword(token: Token) -> Option<Self> {
        [
            (Keyword::Int, Self::Int),
            (Keyword::Float, Self::Float),
            (Keyword::Bool, Self::Bool),
        ]
        .into_iter()
        .find_map(|(kw, ty)| token.is_keyword(kw).then_some(ty))
    }

    const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

/// The result of applying `op` to operands of type `lhs` and `rhs`, if that is legal.
pub fn binary_result(op: Delim, lhs: Ty, rhs: Ty) -> Option<Ty> {
    use Delim::*;
    use Ty::*;

    match op {
        Plus | Minus | Star => match (lhs, rhs) {
            (Int, Int) => Some(Int),
            (Float | Int, Float | Int) => Some(Float),
            _ => None,
        },
        Slash => (lhs.is_numeric() && rhs.is_numeric()).then_some(Float),
        EqEq | NotEq => {
            ((lhs.is_numeric() && rhs.is_numeric()) || (lhs == Bool && rhs == Bool)).then_some(Bool)
        }
        Lt | Gt | Le | Ge => (lhs.is_numeric() && rhs.is_numeric()).then_some(Bool),
        And | Or => (lhs == Bool && rhs == Bool).then_some(Bool),
        _ => None,
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SemanticError {
    #[error("token {} is not an identifier", .position + 1)]
    NotAnIdentifier { position: usize },

    #[error("token {} refers to no identifier table entry", .position + 1)]
    UnknownIdentifier { position: usize },

    #[error("identifier `{name}` is already declared (token {})", .position + 1)]
    AlreadyDeclared { name: String, position: usize },

    #[error("undeclared use of identifier `{name}` (token {})", .position + 1)]
    UndeclaredUse { name: String, position: usize },

    #[error("operator `{op}` cannot be applied to {lhs} and {rhs} (token {})", .position + 1)]
    TypeMismatch {
        op: &'static str,
        lhs: Ty,
        rhs: Ty,
        position: usize,
    },

    #[error("operator `{op}` cannot be applied to {operand} (token {})", .position + 1)]
    UnaryMismatch {
        op: &'static str,
        operand: Ty,
        position: usize,
    },

    #[error("expected an expression of type {expected}, got {got} (token {})", .position + 1)]
    ExpressionType { expected: Ty, got: Ty, position: usize },

    #[error("incompatible types: cannot assign {got} to `{name}` of type {expected} (token {})", .position + 1)]
    IncompatibleAssignment {
        name: String,
        expected: Ty,
        got: Ty,
        position: usize,
    },

    #[error("condition must be bool, got {got} (token {})", .position + 1)]
    ConditionNotBool { got: Ty, position: usize },

    #[error("token {} is not a constant", .position + 1)]
    NotAConstant { position: usize },

    #[error("expression expected before token {}", .position + 1)]
    StackExhausted { position: usize },

    #[error("{0} expression value(s) left unconsumed at end of program")]
    UnbalancedStack(usize),
}

/// What the checker knows about one identifier table entry.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeclaredIdent {
    pub index: usize,
    pub name: String,
    pub declared: bool,
    pub ty: Option<Ty>,
}

/// Type-stack checker driven by the parser.
///
/// The checker owns its view of the identifier table; the scanner's table is
/// only read once, when the checker is built.
pub struct Checker {
    idents: Vec<DeclaredIdent>,
    stack: Vec<Ty>,
}

impl Checker {
    pub fn new(identifiers: &[TableEntry]) -> Self {
        let idents = identifiers
            .iter()
            .map(|e| DeclaredIdent {
                index: e.id,
                name: e.value.clone(),
                declared: false,
                ty: None,
            })
            .collect();
        Self {
            idents,
            stack: Vec::new(),
        }
    }

    /// Whether `token` names an identifier that has been declared.
    pub fn is_declared(&self, token: Token) -> bool {
        token.table == TableCode::Identifier
            && self
                .idents
                .iter()
                .any(|i| i.index == token.index && i.declared)
    }

    pub fn begin_declaration_group(&mut self) {
        trace!("declaration group opened");
    }

    pub fn end_declaration_group(&mut self, ty: Ty) {
        trace!(%ty, "declaration group closed");
    }

    pub fn declare_identifier(
        &mut self,
        token: Token,
        ty: Ty,
        position: usize,
    ) -> Result<(), SemanticError> {
        let ident = self.entry_mut(token, position)?;
        if ident.declared {
            return Err(SemanticError::AlreadyDeclared {
                name: ident.name.clone(),
                position,
            });
        }
        ident.declared = true;
        ident.ty = Some(ty);
        trace!(name = %ident.name, %ty, "declared");
        Ok(())
    }

    /// Resolve a declared identifier without touching the type stack.
    pub fn require_declared(&mut self, token: Token, position: usize) -> Result<Ty, SemanticError> {
        let ident = self.entry_mut(token, position)?;
        match ident.ty {
            Some(ty) if ident.declared => Ok(ty),
            _ => Err(SemanticError::UndeclaredUse {
                name: ident.name.clone(),
                position,
            }),
        }
    }

    pub fn use_identifier(&mut self, token: Token, position: usize) -> Result<Ty, SemanticError> {
        let ty = self.require_declared(token, position)?;
        self.stack.push(ty);
        Ok(ty)
    }

    /// Push the type of a literal: a number or one of the boolean keywords.
    pub fn use_constant(
        &mut self,
        token: Token,
        literal: &str,
        position: usize,
    ) -> Result<Ty, SemanticError> {
        let ty = match token.table {
            TableCode::Number if literal.contains(['.', 'e', 'E']) => Ty::Float,
            TableCode::Number => Ty::Int,
            _ if token.is_keyword(Keyword::True) || token.is_keyword(Keyword::False) => Ty::Bool,
            _ => return Err(SemanticError::NotAConstant { position }),
        };
        self.stack.push(ty);
        Ok(ty)
    }

    /// Push the type of a value the program text never spells out, like a default loop step.
    pub fn use_implicit(&mut self, ty: Ty) {
        self.stack.push(ty);
    }

    pub fn binary_op(&mut self, op: Delim, position: usize) -> Result<Ty, SemanticError> {
        let rhs = self.pop(position)?;
        let lhs = self.pop(position)?;
        let ty = binary_result(op, lhs, rhs).ok_or(SemanticError::TypeMismatch {
            op: op.text(),
            lhs,
            rhs,
            position,
        })?;
        self.stack.push(ty);
        Ok(ty)
    }

    pub fn unary_op(&mut self, op: Delim, position: usize) -> Result<Ty, SemanticError> {
        let operand = self.pop(position)?;
        if op != Delim::Not || operand != Ty::Bool {
            return Err(SemanticError::UnaryMismatch {
                op: op.text(),
                operand,
                position,
            });
        }
        self.stack.push(Ty::Bool);
        Ok(Ty::Bool)
    }

    /// Compare the top of the stack with `expected`, leaving it in place.
    pub fn check_expression_type(&self, expected: Ty, position: usize) -> Result<(), SemanticError> {
        let got = *self
            .stack
            .last()
            .ok_or(SemanticError::StackExhausted { position })?;
        if got == expected {
            Ok(())
        } else {
            Err(SemanticError::ExpressionType {
                expected,
                got,
                position,
            })
        }
    }

    pub fn consume_expression_type(
        &mut self,
        expected: Ty,
        position: usize,
    ) -> Result<(), SemanticError> {
        self.check_expression_type(expected, position)?;
        self.stack.pop();
        Ok(())
    }

    pub fn consume_any(&mut self, position: usize) -> Result<Ty, SemanticError> {
        self.pop(position)
    }

    pub fn check_assignment(&mut self, token: Token, position: usize) -> Result<(), SemanticError> {
        let got = self.pop(position)?;
        let expected = self.require_declared(token, position)?;
        match (expected, got) {
            (e, g) if e == g => Ok(()),
            (Ty::Float, Ty::Int) => Ok(()),
            _ => Err(SemanticError::IncompatibleAssignment {
                name: self.entry_mut(token, position)?.name.clone(),
                expected,
                got,
                position,
            }),
        }
    }

    pub fn check_condition(&mut self, position: usize) -> Result<(), SemanticError> {
        match self.pop(position)? {
            Ty::Bool => Ok(()),
            got => Err(SemanticError::ConditionNotBool { got, position }),
        }
    }

    pub fn finalize(&self) -> Result<(), SemanticError> {
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(SemanticError::UnbalancedStack(self.stack.len()))
        }
    }

    fn pop(&mut self, position: usize) -> Result<Ty, SemanticError> {
        self.stack
            .pop()
            .ok_or(SemanticError::StackExhausted { position })
    }

    fn entry_mut(
        &mut self,
        token: Token,
        position: usize,
    ) -> Result<&mut DeclaredIdent, SemanticError> {
        if token.table != TableCode::Identifier {
            return Err(SemanticError::NotAnIdentifier { position });
        }
        self.idents
            .iter_mut()
            .find(|i| i.index == token.index)
            .ok_or(SemanticError::UnknownIdentifier { position })
    }
}

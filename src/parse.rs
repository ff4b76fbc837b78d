//! Recursive-descent driver.
//!
//! One method per non-terminal:
//!
//! ```text
//! program   ::= 'program' 'var' decl { decl } 'begin' stmts 'end' '.'
//! decl      ::= type ident { ',' ident } ';'
//! type      ::= 'int' | 'float' | 'bool'
//! stmts     ::= stmt { ';' stmt }
//! stmt      ::= 'begin' stmts 'end'
//!             | ident ':=' expr
//!             | 'if' '(' expr ')' stmt [ 'else' stmt ]
//!             | 'while' '(' expr ')' stmt
//!             | 'for' ident ':=' expr 'to' expr [ 'step' expr ] stmt 'next'
//!             | 'readln' ident { ',' ident }
//!             | 'writeln' expr { ',' expr }
//! expr      ::= operand { ('==' | '!=' | '<' | '>' | '<=' | '>=') operand }
//! operand   ::= term { ('+' | '-' | '||') term }
//! term      ::= factor { ('*' | '/' | '&&') factor }
//! factor    ::= ident | number | 'true' | 'false' | '!' factor | '(' expr ')'
//! ```
//!
//! Type checking and postfix emission happen while the grammar is recognized,
//! and the first error of either kind ends the parse.

use tracing::debug;

use crate::check::{Checker, SemanticError, Ty};
use crate::ir::{BinOp, Instr, Program};
use crate::token::{Delim, Keyword, TableCode, TableEntry, Token};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("syntax error at token {position}: expected {expected}, found `{found}`")]
    Expected {
        expected: String,
        found: String,
        position: usize,
    },

    #[error("syntax error at token {position}: unknown word `{found}`, did you mean `{keyword}`?")]
    Misspelled {
        keyword: &'static str,
        found: String,
        position: usize,
    },
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

type Parsed<T = ()> = Result<T, ParseError>;

const RELATIONAL: [Delim; 6] = [
    Delim::EqEq,
    Delim::NotEq,
    Delim::Lt,
    Delim::Gt,
    Delim::Le,
    Delim::Ge,
];
const ADDITIVE: [Delim; 3] = [Delim::Plus, Delim::Minus, Delim::Or];
const MULTIPLICATIVE: [Delim; 3] = [Delim::Star, Delim::Slash, Delim::And];

/// Words a statement may start with, or that may follow one.
const STATEMENT_WORDS: [Keyword; 9] = [
    Keyword::Begin,
    Keyword::End,
    Keyword::If,
    Keyword::Else,
    Keyword::For,
    Keyword::While,
    Keyword::Next,
    Keyword::Readln,
    Keyword::Writeln,
];

const TYPE_WORDS: [Keyword; 3] = [Keyword::Int, Keyword::Float, Keyword::Bool];

/// Parse and check a token sequence, producing its postfix program.
///
/// # Errors
/// The first syntax or semantic error met.
pub fn parse(
    tokens: &[Token],
    identifiers: &[TableEntry],
    numbers: &[TableEntry],
) -> Result<Program, ParseError> {
    let mut parser = Parser {
        tokens,
        identifiers,
        numbers,
        cursor: 0,
        checker: Checker::new(identifiers),
        code: Program::new(),
    };
    parser.program()?;
    debug!(slots = parser.code.len(), "parsed program");
    Ok(parser.code)
}

struct Parser<'a> {
    tokens: &'a [Token],
    identifiers: &'a [TableEntry],
    numbers: &'a [TableEntry],
    cursor: usize,
    checker: Checker,
    code: Program,
}

impl<'a> Parser<'a> {
    fn program(&mut self) -> Parsed {
        self.expect_keyword(Keyword::Program)?;
        self.expect_keyword(Keyword::Var)?;
        self.declaration()?;
        while self.at_type() {
            self.declaration()?;
        }
        self.expect_keyword(Keyword::Begin)?;
        self.statements()?;
        self.expect_keyword(Keyword::End)?;
        self.expect_delim(Delim::Dot)?;
        if self.current().is_some() {
            return Err(self.expected("end of input").into());
        }
        self.code.emit(Instr::Halt);
        self.checker.finalize()?;
        Ok(())
    }

    fn declaration(&mut self) -> Parsed {
        let ty = self.ty()?;
        self.checker.begin_declaration_group();
        loop {
            let (token, position) = self.ident()?;
            self.checker.declare_identifier(token, ty, position)?;
            if !self.eat_delim(Delim::Comma) {
                break;
            }
        }
        self.expect_delim(Delim::Semicolon)?;
        self.checker.end_declaration_group(ty);
        Ok(())
    }

    fn ty(&mut self) -> Parsed<Ty> {
        match self.current().and_then(Ty::from_keyword) {
            Some(ty) => {
                self.advance();
                Ok(ty)
            }
            None => Err(self.keyword_error(&TYPE_WORDS, "a type").into()),
        }
    }

    fn at_type(&self) -> bool {
        self.current().and_then(Ty::from_keyword).is_some()
    }

    fn statements(&mut self) -> Parsed {
        loop {
            if self.at_keyword(Keyword::End) || self.current().is_none() {
                break;
            }
            self.statement()?;
            if !self.eat_delim(Delim::Semicolon) {
                break;
            }
        }
        Ok(())
    }

    fn statement(&mut self) -> Parsed {
        let Some(token) = self.current() else {
            return Err(self.expected("a statement").into());
        };
        match token.table {
            TableCode::Identifier => self.assignment().map(drop),
            TableCode::Keyword if token.is_keyword(Keyword::Begin) => self.compound(),
            TableCode::Keyword if token.is_keyword(Keyword::If) => self.if_stmt(),
            TableCode::Keyword if token.is_keyword(Keyword::While) => self.while_stmt(),
            TableCode::Keyword if token.is_keyword(Keyword::For) => self.for_stmt(),
            TableCode::Keyword if token.is_keyword(Keyword::Readln) => self.read_stmt(),
            TableCode::Keyword if token.is_keyword(Keyword::Writeln) => self.write_stmt(),
            _ => Err(self.expected("a statement").into()),
        }
    }

    fn compound(&mut self) -> Parsed {
        self.advance();
        self.statements()?;
        self.expect_keyword(Keyword::End)
    }

    /// `x := e` emits `@x e :=`. Returns the target's token, position and name.
    fn assignment(&mut self) -> Parsed<(Token, usize, String)> {
        let (token, position) = self.ident()?;
        let name = self.text(token).to_owned();
        if !self.at_delim(Delim::Assign) && !self.checker.is_declared(token) {
            if let Some(keyword) = near_keyword(&name, &STATEMENT_WORDS) {
                return Err(SyntaxError::Misspelled {
                    keyword,
                    found: name,
                    position: position + 1,
                }
                .into());
            }
        }
        self.code.emit(Instr::Addr(name.clone()));
        self.expect_delim(Delim::Assign)?;
        self.expression()?;
        self.checker.check_assignment(token, position)?;
        self.code.emit(Instr::Assign);
        Ok((token, position, name))
    }

    fn if_stmt(&mut self) -> Parsed {
        self.advance();
        self.condition()?;
        let skip_then = self.code.reserve();
        self.code.emit(Instr::JumpIfFalse);
        self.statement()?;
        if self.eat_keyword(Keyword::Else) {
            let skip_else = self.code.reserve();
            self.code.emit(Instr::Jump);
            self.code.patch(skip_then, self.code.len());
            self.statement()?;
            self.code.patch(skip_else, self.code.len());
        } else {
            self.code.patch(skip_then, self.code.len());
        }
        Ok(())
    }

    fn while_stmt(&mut self) -> Parsed {
        self.advance();
        let top = self.code.len();
        self.condition()?;
        let exit = self.code.reserve();
        self.code.emit(Instr::JumpIfFalse);
        self.statement()?;
        self.code.emit(Instr::Target(Some(top)));
        self.code.emit(Instr::Jump);
        self.code.patch(exit, self.code.len());
        Ok(())
    }

    /// `'(' expr ')'` whose value must be bool.
    fn condition(&mut self) -> Parsed {
        self.expect_delim(Delim::LParen)?;
        self.expression()?;
        let position = self.cursor;
        self.expect_delim(Delim::RParen)?;
        self.checker.check_condition(position)?;
        Ok(())
    }

    /// The step is parsed where the grammar puts it, but its code is detached and
    /// re-emitted after the body, in front of the increment:
    ///
    /// ```text
    /// @i init :=  top: i bound <= exit !F  body  @i i step + :=  top !!  exit:
    /// ```
    fn for_stmt(&mut self) -> Parsed {
        self.advance();
        let (counter, counter_at, name) = self.assignment()?;
        self.expect_keyword(Keyword::To)?;

        let top = self.code.len();
        self.code.emit(Instr::Var(name.clone()));
        self.checker.use_identifier(counter, counter_at)?;
        let bound_at = self.cursor;
        self.expression()?;
        self.checker.binary_op(Delim::Le, bound_at)?;
        self.code.emit(Instr::Op(BinOp::Le));
        self.checker.check_condition(bound_at)?;
        let exit = self.code.reserve();
        self.code.emit(Instr::JumpIfFalse);

        self.checker.use_identifier(counter, counter_at)?;
        let step = if self.eat_keyword(Keyword::Step) {
            let step_at = self.cursor;
            let mark = self.code.len();
            self.expression()?;
            self.checker.binary_op(Delim::Plus, step_at)?;
            self.code.detach(mark)
        } else {
            self.checker.use_implicit(Ty::Int);
            self.checker.binary_op(Delim::Plus, self.cursor)?;
            vec![Instr::Num("1".to_owned())]
        };
        self.checker.check_assignment(counter, counter_at)?;

        self.statement()?;
        self.expect_keyword(Keyword::Next)?;

        self.code.emit(Instr::Addr(name.clone()));
        self.code.emit(Instr::Var(name));
        self.code.splice(step);
        self.code.emit(Instr::Op(BinOp::Add));
        self.code.emit(Instr::Assign);
        self.code.emit(Instr::Target(Some(top)));
        self.code.emit(Instr::Jump);
        self.code.patch(exit, self.code.len());
        Ok(())
    }

    fn read_stmt(&mut self) -> Parsed {
        self.advance();
        loop {
            let (token, position) = self.ident()?;
            self.checker.require_declared(token, position)?;
            let name = self.text(token);
            self.code.emit(Instr::Addr(name.to_owned()));
            self.code.emit(Instr::Read);
            if !self.eat_delim(Delim::Comma) {
                break Ok(());
            }
        }
    }

    fn write_stmt(&mut self) -> Parsed {
        self.advance();
        loop {
            let position = self.cursor;
            self.expression()?;
            self.checker.consume_any(position)?;
            self.code.emit(Instr::Write);
            if !self.eat_delim(Delim::Comma) {
                break Ok(());
            }
        }
    }

    fn expression(&mut self) -> Parsed {
        self.binary_level(&RELATIONAL, Self::operand)
    }

    fn operand(&mut self) -> Parsed {
        self.binary_level(&ADDITIVE, Self::term)
    }

    fn term(&mut self) -> Parsed {
        self.binary_level(&MULTIPLICATIVE, Self::factor)
    }

    /// Left-associative chain of `next` separated by any of `ops`.
    fn binary_level(&mut self, ops: &[Delim], next: fn(&mut Self) -> Parsed) -> Parsed {
        next(self)?;
        while let Some(op) = ops.iter().copied().find(|&d| self.at_delim(d)) {
            let position = self.cursor;
            self.advance();
            next(self)?;
            self.checker.binary_op(op, position)?;
            if let Some(op) = BinOp::from_delim(op) {
                self.code.emit(Instr::Op(op));
            }
        }
        Ok(())
    }

    fn factor(&mut self) -> Parsed {
        let position = self.cursor;
        let Some(token) = self.current() else {
            return Err(self.expected("an expression").into());
        };
        match token.table {
            TableCode::Identifier => {
                self.checker.use_identifier(token, position)?;
                let name = self.text(token);
                self.code.emit(Instr::Var(name.to_owned()));
                self.advance();
            }
            TableCode::Number => {
                let literal = self.text(token);
                self.checker.use_constant(token, literal, position)?;
                self.code.emit(Instr::Num(literal.to_owned()));
                self.advance();
            }
            TableCode::Keyword
                if token.is_keyword(Keyword::True) || token.is_keyword(Keyword::False) =>
            {
                let literal = self.text(token);
                self.checker.use_constant(token, literal, position)?;
                self.code
                    .emit(Instr::Bool(token.is_keyword(Keyword::True)));
                self.advance();
            }
            TableCode::Delimiter if token.is_delim(Delim::Not) => {
                self.advance();
                self.factor()?;
                self.checker.unary_op(Delim::Not, position)?;
                self.code.emit(Instr::Not);
            }
            TableCode::Delimiter if token.is_delim(Delim::LParen) => {
                self.advance();
                self.expression()?;
                self.expect_delim(Delim::RParen)?;
            }
            _ => return Err(self.expected("an expression").into()),
        }
        Ok(())
    }

    fn ident(&mut self) -> Parsed<(Token, usize)> {
        match self.current() {
            Some(token) if token.table == TableCode::Identifier => {
                let position = self.cursor;
                self.advance();
                Ok((token, position))
            }
            _ => Err(self.expected("an identifier").into()),
        }
    }

    fn current(&self) -> Option<Token> {
        self.tokens.get(self.cursor).copied()
    }

    fn advance(&mut self) {
        self.cursor += 1;
    }

    fn text(&self, token: Token) -> &'a str {
        token.text(self.identifiers, self.numbers)
    }

    fn at_keyword(&self, kw: Keyword) -> bool {
        self.current().is_some_and(|t| t.is_keyword(kw))
    }

    fn at_delim(&self, d: Delim) -> bool {
        self.current().is_some_and(|t| t.is_delim(d))
    }

    fn eat_keyword(&mut self, kw: Keyword) -> bool {
        let hit = self.at_keyword(kw);
        if hit {
            self.advance();
        }
        hit
    }

    fn eat_delim(&mut self, d: Delim) -> bool {
        let hit = self.at_delim(d);
        if hit {
            self.advance();
        }
        hit
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Parsed {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.keyword_error(&[kw], &format!("`{}`", kw.text())).into())
        }
    }

    fn expect_delim(&mut self, d: Delim) -> Parsed {
        if self.eat_delim(d) {
            Ok(())
        } else {
            Err(self.expected(&format!("`{}`", d.text())).into())
        }
    }

    fn found(&self) -> String {
        self.current()
            .map_or_else(|| "end of input".to_owned(), |t| self.text(t).to_owned())
    }

    fn expected(&self, what: &str) -> SyntaxError {
        SyntaxError::Expected {
            expected: what.to_owned(),
            found: self.found(),
            position: self.cursor + 1,
        }
    }

    /// A word was expected: suggest the one keyword the actual word is a typo of, if any.
    fn keyword_error(&self, keywords: &[Keyword], what: &str) -> SyntaxError {
        let wordlike = self
            .current()
            .filter(|t| matches!(t.table, TableCode::Keyword | TableCode::Identifier));
        if let Some(token) = wordlike {
            let found = self.text(token);
            if let Some(keyword) = near_keyword(found, keywords) {
                return SyntaxError::Misspelled {
                    keyword,
                    found: found.to_owned(),
                    position: self.cursor + 1,
                };
            }
        }
        self.expected(what)
    }
}

/// The single keyword among `candidates` that `word` is one edit away from.
fn near_keyword(word: &str, candidates: &[Keyword]) -> Option<&'static str> {
    let mut near = candidates
        .iter()
        .map(|k| k.text())
        .filter(|k| *k != word && strsim::levenshtein(word, k) <= 1);
    let first = near.next()?;
    near.next().is_none().then_some(first)
}

use std::fmt::Display;
use std::ops::Index;
use std::str::FromStr;

use tracing::trace;

use crate::token::Delim;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinOp {
    const ALL: [Self; 12] = [
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Eq,
        Self::Ne,
        Self::Lt,
        Self::Gt,
        Self::Le,
        Self::Ge,
        Self::And,
        Self::Or,
    ];

    pub const fn from_delim(d: Delim) -> Option<Self> {
        Some(match d {
            Delim::Plus => Self::Add,
            Delim::Minus => Self::Sub,
            Delim::Star => Self::Mul,
            Delim::Slash => Self::Div,
            Delim::EqEq => Self::Eq,
            Delim::NotEq => Self::Ne,
            Delim::Lt => Self::Lt,
            Delim::Gt => Self::Gt,
            Delim::Le => Self::Le,
            Delim::Ge => Self::Ge,
            Delim::And => Self::And,
            Delim::Or => Self::Or,
            _ => return None,
        })
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// One slot of a postfix program.
#[derive(Clone, PartialEq, Debug)]
pub enum Instr {
    /// Write target of an assignment or a read.
    Addr(String),
    /// Value of a variable.
    Var(String),
    /// Numeric literal, as stored in the number table.
    Num(String),
    Bool(bool),
    /// Absolute jump destination; `None` until backpatched.
    Target(Option<usize>),
    Op(BinOp),
    Not,
    Assign,
    JumpIfFalse,
    Jump,
    Read,
    Write,
    Halt,
}

const JUMP_IF_FALSE: &str = "!F";
const JUMP: &str = "!!";
const HALT: &str = "@end";

impl Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addr(name) => write!(f, "@{name}"),
            Self::Var(name) => write!(f, "{name}"),
            Self::Num(text) => write!(f, "{text}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Target(Some(t)) => write!(f, "{t}"),
            Self::Target(None) => write!(f, "?"),
            Self::Op(op) => write!(f, "{}", op.symbol()),
            Self::Not => write!(f, "!"),
            Self::Assign => write!(f, ":="),
            Self::JumpIfFalse => write!(f, "{JUMP_IF_FALSE}"),
            Self::Jump => write!(f, "{JUMP}"),
            Self::Read => write!(f, "readln"),
            Self::Write => write!(f, "writeln"),
            Self::Halt => write!(f, "{HALT}"),
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProgramFormatError {
    #[error("unrecognized postfix slot `{0}`")]
    UnknownSlot(String),

    #[error("jump target `{0}` is not a valid index")]
    BadTarget(String),
}

/// A placeholder target slot handed out by [`Program::reserve`] and consumed by
/// [`Program::patch`], so every reserved slot is patched at most once.
#[must_use]
#[derive(Debug, PartialEq, Eq)]
pub struct Reserved(usize);

impl Reserved {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A postfix program: a flat arena of slots that jumps address by absolute index.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Program {
    code: Vec<Instr>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot and return its index.
    pub fn emit(&mut self, instr: Instr) -> usize {
        trace!(slot = self.code.len(), %instr, "emit");
        self.code.push(instr);
        self.code.len() - 1
    }

    /// Index the next emitted slot will get.
    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Emit a placeholder jump target to be patched once the destination is known.
    pub fn reserve(&mut self) -> Reserved {
        Reserved(self.emit(Instr::Target(None)))
    }

    /// Point a reserved slot at `target`.
    ///
    /// # Panics
    /// If the reserved slot was detached before being patched.
    pub fn patch(&mut self, Reserved(slot): Reserved, target: usize) {
        trace!(slot, target, "backpatch");
        self.code[slot] = Instr::Target(Some(target));
    }

    /// Remove and return everything emitted from `from` on. Slots reserved
    /// before `from` keep their indices.
    pub fn detach(&mut self, from: usize) -> Vec<Instr> {
        self.code.split_off(from)
    }

    /// Append previously detached code.
    pub fn splice(&mut self, code: Vec<Instr>) {
        for instr in code {
            self.emit(instr);
        }
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.code
    }

    /// Whether every reserved target has been patched.
    pub fn is_resolved(&self) -> bool {
        !self.code.contains(&Instr::Target(None))
    }
}

impl Index<usize> for Program {
    type Output = Instr;

    fn index(&self, index: usize) -> &Self::Output {
        &self.code[index]
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for instr in &self.code {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{instr}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Program {
    type Err = ProgramFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = s.split_whitespace().collect();
        let mut code = Vec::with_capacity(words.len());
        for (i, word) in words.iter().copied().enumerate() {
            let before_jump = matches!(words.get(i + 1), Some(&(JUMP_IF_FALSE | JUMP)));
            let instr = match word {
                HALT => Instr::Halt,
                JUMP_IF_FALSE => Instr::JumpIfFalse,
                JUMP => Instr::Jump,
                "readln" => Instr::Read,
                "writeln" => Instr::Write,
                ":=" => Instr::Assign,
                "!" => Instr::Not,
                "true" => Instr::Bool(true),
                "false" => Instr::Bool(false),
                "?" => Instr::Target(None),
                _ if before_jump => Instr::Target(Some(
                    word.parse()
                        .map_err(|_| ProgramFormatError::BadTarget(word.to_owned()))?,
                )),
                _ => {
                    if let Some(op) = BinOp::ALL.into_iter().find(|op| op.symbol() == word) {
                        Instr::Op(op)
                    } else if let Some(name) = word.strip_prefix('@').filter(|n| is_name(n)) {
                        Instr::Addr(name.to_owned())
                    } else if word.starts_with(|c: char| c.is_ascii_digit())
                        && word.parse::<f64>().is_ok()
                    {
                        Instr::Num(word.to_owned())
                    } else if is_name(word) {
                        Instr::Var(word.to_owned())
                    } else {
                        return Err(ProgramFormatError::UnknownSlot(word.to_owned()));
                    }
                }
            };
            code.push(instr);
        }
        Ok(Self { code })
    }
}

fn is_name(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_alphabetic()) && word.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpatching() {
        let mut program = Program::new();
        program.emit(Instr::Var("c".into()));
        let slot = program.reserve();
        program.emit(Instr::JumpIfFalse);
        assert!(!program.is_resolved());
        assert_eq!(program.to_string(), "c ? !F");

        let at = slot.index();
        let end = program.len();
        program.patch(slot, end);
        assert!(program.is_resolved());
        assert_eq!(program[at], Instr::Target(Some(3)));
    }

    #[test]
    fn patch_survives_a_later_detach() {
        let mut program = Program::new();
        program.emit(Instr::Bool(true));
        let exit = program.reserve();
        program.emit(Instr::JumpIfFalse);
        let mark = program.len();
        program.emit(Instr::Num("2".into()));
        let step = program.detach(mark);
        program.emit(Instr::Write);
        program.splice(step);
        let end = program.len();
        program.patch(exit, end);
        assert_eq!(program.to_string(), "true 5 !F writeln 2");
    }

    #[test]
    fn detach_and_splice() {
        let mut program = Program::new();
        program.emit(Instr::Addr("i".into()));
        let mark = program.len();
        program.emit(Instr::Num("2".into()));
        let step = program.detach(mark);
        program.emit(Instr::Var("i".into()));
        program.splice(step);
        assert_eq!(program.to_string(), "@i i 2");
    }

    #[test]
    fn textual_form() {
        let text = "@x 5 := x 0 > 12 !F @x x 1 - := 4 !! x writeln @x readln true ! @end";
        let program: Program = text.parse().unwrap();
        assert_eq!(program[4], Instr::Num("0".into()));
        assert_eq!(program[6], Instr::Target(Some(12)));
        assert_eq!(program[11], Instr::Op(BinOp::Sub));
        assert_eq!(program[17], Instr::Addr("x".into()));
        assert_eq!(program[18], Instr::Read);
        assert_eq!(program.to_string(), text);
    }

    #[test]
    fn rejects_unknown_slots() {
        assert_eq!(
            "x # :=".parse::<Program>(),
            Err(ProgramFormatError::UnknownSlot("#".into()))
        );
        assert_eq!(
            "x !F".parse::<Program>(),
            Err(ProgramFormatError::BadTarget("x".into()))
        );
    }
}

//! Postfix stack machine.

use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::ir::{BinOp, Instr, Program};
use crate::token::TableEntry;

pub const DEFAULT_INSTRUCTION_LIMIT: usize = 1_000_000;

/// A value on the machine stack or in the variable store.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// Write target pushed by an address slot.
    VariableRef(String),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::VariableRef(name) => write!(f, "@{name}"),
        }
    }
}

impl Value {
    /// An integer if `x` is integral and representable, a float otherwise.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn narrow(x: f64) -> Self {
        if x.fract() == 0.0 && x >= i64::MIN as f64 && x < i64::MAX as f64 {
            Self::Integer(x as i64)
        } else {
            Self::Float(x)
        }
    }

    /// Value of a numeric literal slot.
    pub fn from_literal(text: &str) -> Option<Self> {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Self::Integer(i));
        }
        text.parse::<f64>().ok().map(Self::narrow)
    }

    /// Interpret one line of input: integer, else float, else boolean, else zero.
    pub fn from_input(line: &str) -> Self {
        let line = line.trim();
        if let Ok(i) = line.parse::<i64>() {
            Self::Integer(i)
        } else if let Ok(x) = line.parse::<f64>() {
            Self::Float(x)
        } else if line.eq_ignore_ascii_case("true") {
            Self::Boolean(true)
        } else if line.eq_ignore_ascii_case("false") {
            Self::Boolean(false)
        } else {
            Self::Integer(0)
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "an integer",
            Self::Float(_) => "a float",
            Self::Boolean(_) => "a boolean",
            Self::VariableRef(_) => "a variable reference",
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("stack underflow at slot {0}")]
    StackUnderflow(usize),

    #[error("undefined reference `{name}` at slot {slot}")]
    UndefinedReference { name: String, slot: usize },

    #[error("instruction limit of {0} exceeded")]
    RuntimeLimitExceeded(usize),

    #[error("`{op}` cannot operate on {found} at slot {slot}")]
    OperandType {
        op: String,
        found: &'static str,
        slot: usize,
    },

    #[error("jump target {target} is out of range at slot {slot}")]
    BadTarget { target: i64, slot: usize },

    #[error("jump target at slot {0} was never patched")]
    UnpatchedTarget(usize),

    #[error("execution cancelled")]
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct MachineConfig {
    /// Executed slots after which a run is aborted.
    pub instruction_limit: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            instruction_limit: DEFAULT_INSTRUCTION_LIMIT,
        }
    }
}

#[derive(Default)]
pub struct Machine {
    config: MachineConfig,
    program: Program,
    vars: HashMap<String, Value>,
    stack: Vec<Value>,
    ip: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Abort a run once `flag` is set; checked before every slot.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Reset the machine for `program`: every identifier starts as integer zero.
    pub fn load(&mut self, program: Program, identifiers: &[TableEntry]) {
        self.program = program;
        self.vars = identifiers
            .iter()
            .map(|e| (e.value.clone(), Value::Integer(0)))
            .collect();
        self.stack.clear();
        self.ip = 0;
    }

    /// Execute the loaded program until it halts or fails.
    ///
    /// `output` receives every written line; `input` is called once per read and
    /// may block.
    ///
    /// # Errors
    /// On the first runtime fault or when the instruction limit is reached.
    pub fn run<O, I>(&mut self, mut output: O, mut input: I) -> Result<(), RuntimeError>
    where
        O: FnMut(String),
        I: FnMut() -> String,
    {
        let program = std::mem::take(&mut self.program);
        let result = self.execute(&program, &mut output, &mut input);
        self.program = program;
        result
    }

    fn execute(
        &mut self,
        program: &Program,
        output: &mut dyn FnMut(String),
        input: &mut dyn FnMut() -> String,
    ) -> Result<(), RuntimeError> {
        let mut steps = 0;
        while let Some(instr) = program.instrs().get(self.ip) {
            if steps >= self.config.instruction_limit {
                warn!(limit = self.config.instruction_limit, "instruction limit reached");
                return Err(RuntimeError::RuntimeLimitExceeded(
                    self.config.instruction_limit,
                ));
            }
            if self.cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
                warn!(slot = self.ip, "run cancelled");
                return Err(RuntimeError::Cancelled);
            }
            steps += 1;
            trace!(slot = self.ip, %instr, depth = self.stack.len(), "step");

            let slot = self.ip;
            self.ip += 1;
            match instr {
                Instr::Halt => break,
                Instr::Addr(name) => self.stack.push(Value::VariableRef(name.clone())),
                Instr::Var(name) => {
                    let value = self.vars.get(name).cloned().ok_or_else(|| {
                        RuntimeError::UndefinedReference {
                            name: name.clone(),
                            slot,
                        }
                    })?;
                    self.stack.push(value);
                }
                Instr::Num(text) => {
                    let value =
                        Value::from_literal(text).ok_or_else(|| RuntimeError::UndefinedReference {
                            name: text.clone(),
                            slot,
                        })?;
                    self.stack.push(value);
                }
                Instr::Bool(b) => self.stack.push(Value::Boolean(*b)),
                #[allow(clippy::cast_possible_wrap)]
                Instr::Target(Some(t)) => self.stack.push(Value::Integer(*t as i64)),
                Instr::Target(None) => return Err(RuntimeError::UnpatchedTarget(slot)),
                Instr::Op(op) => {
                    let rhs = self.pop(slot)?;
                    let lhs = self.pop(slot)?;
                    self.stack.push(binary(*op, &lhs, &rhs, slot)?);
                }
                Instr::Not => match self.pop(slot)? {
                    Value::Boolean(b) => self.stack.push(Value::Boolean(!b)),
                    other => return Err(operand_error(instr, &other, slot)),
                },
                Instr::Assign => {
                    let value = self.pop(slot)?;
                    let name = self.pop_target(instr, slot)?;
                    self.store(name, value, slot)?;
                }
                Instr::Read => {
                    let name = self.pop_target(instr, slot)?;
                    let value = Value::from_input(&input());
                    trace!(%name, %value, "read");
                    self.store(name, value, slot)?;
                }
                Instr::Write => {
                    let value = self.pop(slot)?;
                    output(value.to_string());
                }
                Instr::JumpIfFalse => {
                    let target = self.pop_jump(program, slot)?;
                    match self.pop(slot)? {
                        Value::Boolean(false) => self.ip = target,
                        Value::Boolean(true) => {}
                        other => return Err(operand_error(instr, &other, slot)),
                    }
                }
                Instr::Jump => self.ip = self.pop_jump(program, slot)?,
            }
        }
        debug!(steps, "program finished");
        Ok(())
    }

    fn pop(&mut self, slot: usize) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow(slot))
    }

    fn pop_target(&mut self, instr: &Instr, slot: usize) -> Result<String, RuntimeError> {
        match self.pop(slot)? {
            Value::VariableRef(name) => Ok(name),
            other => Err(operand_error(instr, &other, slot)),
        }
    }

    fn pop_jump(&mut self, program: &Program, slot: usize) -> Result<usize, RuntimeError> {
        match self.pop(slot)? {
            Value::Integer(target) => usize::try_from(target)
                .ok()
                .filter(|t| *t <= program.len())
                .ok_or(RuntimeError::BadTarget { target, slot }),
            other => Err(operand_error(&program[slot], &other, slot)),
        }
    }

    fn store(&mut self, name: String, value: Value, slot: usize) -> Result<(), RuntimeError> {
        match self.vars.get_mut(&name) {
            Some(var) => {
                *var = value;
                Ok(())
            }
            None => Err(RuntimeError::UndefinedReference { name, slot }),
        }
    }
}

fn operand_error(instr: &Instr, found: &Value, slot: usize) -> RuntimeError {
    RuntimeError::OperandType {
        op: instr.to_string(),
        found: found.kind(),
        slot,
    }
}

#[allow(clippy::float_cmp)]
fn binary(op: BinOp, lhs: &Value, rhs: &Value, slot: usize) -> Result<Value, RuntimeError> {
    let mismatch = |v: &Value| operand_error(&Instr::Op(op), v, slot);

    if let (BinOp::And | BinOp::Or | BinOp::Eq | BinOp::Ne, Value::Boolean(l), Value::Boolean(r)) =
        (op, lhs, rhs)
    {
        return Ok(Value::Boolean(match op {
            BinOp::And => *l && *r,
            BinOp::Or => *l || *r,
            BinOp::Eq => l == r,
            _ => l != r,
        }));
    }
    if matches!(op, BinOp::And | BinOp::Or) {
        let culprit = if matches!(lhs, Value::Boolean(_)) { rhs } else { lhs };
        return Err(mismatch(culprit));
    }

    let l = lhs.as_f64().ok_or_else(|| mismatch(lhs))?;
    let r = rhs.as_f64().ok_or_else(|| mismatch(rhs))?;
    Ok(match op {
        BinOp::Add => Value::narrow(l + r),
        BinOp::Sub => Value::narrow(l - r),
        BinOp::Mul => Value::narrow(l * r),
        BinOp::Div => Value::narrow(l / r),
        BinOp::Eq => Value::Boolean(l == r),
        BinOp::Ne => Value::Boolean(l != r),
        BinOp::Lt => Value::Boolean(l < r),
        BinOp::Gt => Value::Boolean(l > r),
        BinOp::Le => Value::Boolean(l <= r),
        BinOp::Ge => Value::Boolean(l >= r),
        BinOp::And | BinOp::Or => unreachable!("boolean operators handled above"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idents(names: &[&str]) -> Vec<TableEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| TableEntry {
                id: i + 1,
                value: (*n).to_owned(),
            })
            .collect()
    }

    fn run(text: &str, names: &[&str], inputs: &[&str]) -> Result<Vec<String>, RuntimeError> {
        let mut machine = Machine::new(MachineConfig::default());
        machine.load(text.parse().unwrap(), &idents(names));
        let mut lines = inputs.iter().map(|s| (*s).to_owned());
        let mut out = Vec::new();
        machine.run(|line| out.push(line), || lines.next().unwrap_or_default())?;
        Ok(out)
    }

    #[test]
    fn arithmetic_narrows_integral_results() {
        assert_eq!(run("7 2 / writeln @end", &[], &[]).unwrap(), ["3.5"]);
        assert_eq!(run("6 2 / writeln @end", &[], &[]).unwrap(), ["3"]);
        assert_eq!(run("1.5 2 * writeln @end", &[], &[]).unwrap(), ["3"]);
        assert_eq!(run("1 0.25 - writeln @end", &[], &[]).unwrap(), ["0.75"]);
    }

    #[test]
    fn comparisons_and_logic() {
        let out = run(
            "1 1.0 == writeln 2 3 >= writeln true false || ! writeln true true != writeln @end",
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(out, ["true", "false", "false", "false"]);
    }

    #[test]
    fn variables_start_at_zero() {
        let out = run("x writeln @x x 5 + := x writeln @end", &["x"], &[]).unwrap();
        assert_eq!(out, ["0", "5"]);
    }

    #[test]
    fn read_classifies_input() {
        let out = run(
            "@a readln @b readln @c readln @d readln a writeln b writeln c writeln d writeln @end",
            &["a", "b", "c", "d"],
            &["42", " 2.5 ", "TRUE", "what"],
        )
        .unwrap();
        assert_eq!(out, ["42", "2.5", "true", "0"]);
    }

    #[test]
    fn jumps() {
        // if (false) writeln 1 else writeln 2
        let out = run("false 7 !F 1 writeln 9 !! 2 writeln @end", &[], &[]).unwrap();
        assert_eq!(out, ["2"]);
    }

    #[test]
    fn runtime_faults() {
        assert_eq!(run("+ @end", &[], &[]), Err(RuntimeError::StackUnderflow(0)));
        assert_eq!(
            run("y writeln", &[], &[]),
            Err(RuntimeError::UndefinedReference {
                name: "y".into(),
                slot: 0
            })
        );
        assert!(matches!(
            run("1 true + writeln", &[], &[]),
            Err(RuntimeError::OperandType { .. })
        ));
        assert_eq!(
            run("true 99 !F", &[], &[]),
            Err(RuntimeError::BadTarget { target: 99, slot: 2 })
        );
        assert_eq!(
            run("true ? !F", &[], &[]),
            Err(RuntimeError::UnpatchedTarget(1))
        );
    }

    #[test]
    fn instruction_limit() {
        let mut machine = Machine::new(MachineConfig {
            instruction_limit: 100,
        });
        machine.load("0 !!".parse().unwrap(), &[]);
        assert_eq!(
            machine.run(|_| {}, String::new),
            Err(RuntimeError::RuntimeLimitExceeded(100))
        );
    }

    #[test]
    fn cancellation() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut machine = Machine::new(MachineConfig::default()).with_cancel_flag(flag);
        machine.load("0 !!".parse().unwrap(), &[]);
        assert_eq!(machine.run(|_| {}, String::new), Err(RuntimeError::Cancelled));
    }

    #[test]
    fn load_resets_state() {
        let mut machine = Machine::new(MachineConfig::default());
        let names = idents(&["x"]);
        machine.load("@x 7 := @end".parse().unwrap(), &names);
        machine.run(|_| {}, String::new).unwrap();
        assert_eq!(machine.vars.get("x"), Some(&Value::Integer(7)));

        machine.load("@end".parse().unwrap(), &names);
        assert_eq!(machine.vars.get("x"), Some(&Value::Integer(0)));
    }
}

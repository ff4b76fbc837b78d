pub mod check;
pub mod ir;
pub mod parse;
pub mod scan;
pub mod token;
pub mod vm;

use std::io::BufRead;
use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use check::SemanticError;
use ir::Program;
use parse::{ParseError, SyntaxError};
use scan::{ScanError, Scanned};
use token::{TableEntry, Token};
use vm::{Machine, MachineConfig, RuntimeError};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("lexical error at {0}")]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Parser outcome in the shape a front end displays: at most one error in total.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub syntax_errors: Vec<SyntaxError>,
    pub semantic_errors: Vec<SemanticError>,
    pub program: Option<Program>,
}

impl ParseReport {
    pub fn success(&self) -> bool {
        self.syntax_errors.is_empty() && self.semantic_errors.is_empty()
    }
}

impl From<Result<Program, ParseError>> for ParseReport {
    fn from(result: Result<Program, ParseError>) -> Self {
        match result {
            Ok(program) => Self {
                program: Some(program),
                ..Self::default()
            },
            Err(ParseError::Syntax(e)) => Self {
                syntax_errors: vec![e],
                ..Self::default()
            },
            Err(ParseError::Semantic(e)) => Self {
                semantic_errors: vec![e],
                ..Self::default()
            },
        }
    }
}

/// Parse scanned tokens into a report.
pub fn analyze(tokens: &[Token], identifiers: &[TableEntry], numbers: &[TableEntry]) -> ParseReport {
    parse::parse(tokens, identifiers, numbers).into()
}

/// A successfully compiled source: its tables and its postfix program.
#[derive(Debug)]
pub struct Compiled {
    pub scanned: Scanned,
    pub program: Program,
}

/// Scan and parse `source`.
///
/// # Errors
/// The first lexical, syntax or semantic error.
pub fn compile(source: &str) -> Result<Compiled, Error> {
    let scanned = scan::scan(source)?;
    let program = parse::parse(&scanned.tokens, &scanned.identifiers, &scanned.numbers)?;
    Ok(Compiled { scanned, program })
}

impl Compiled {
    /// Execute the program with line I/O callbacks.
    ///
    /// # Errors
    /// If the machine faults or hits its instruction limit.
    pub fn execute<O, I>(&self, config: MachineConfig, output: O, input: I) -> Result<(), Error>
    where
        O: FnMut(String),
        I: FnMut() -> String,
    {
        let mut machine = Machine::new(config);
        machine.load(self.program.clone(), &self.scanned.identifiers);
        machine.run(output, input)?;
        Ok(())
    }

    /// Execute the program against stdin and stdout, one value per line.
    ///
    /// # Errors
    /// If the machine faults or hits its instruction limit.
    pub fn execute_stdio(&self, config: MachineConfig) -> Result<(), Error> {
        let stdin = std::io::stdin();
        let mut lines = stdin.lock().lines();
        self.execute(
            config,
            |line| println!("{line}"),
            || next_line(&mut lines),
        )
    }
}

/// Next input line for a read. A failed or exhausted input reads as an empty
/// line, which the machine stores as zero.
fn next_line<L>(lines: &mut L) -> String
where
    L: Iterator<Item = std::io::Result<String>>,
{
    match lines.next() {
        Some(Ok(line)) => line,
        Some(Err(e)) => {
            warn!(error = %e, "could not read input line, reading it as empty");
            String::new()
        }
        None => {
            warn!("input exhausted, reading an empty line");
            String::new()
        }
    }
}

/// Compile and run the source file.
///
/// # Errors
/// If the file cannot be read, or compiling or running it fails.
pub fn run(path: &Path, config: MachineConfig) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("could not read `{}`", path.display()))?;
    let compiled = compile(&source)?;
    info!(slots = compiled.program.len(), "running {}", path.display());
    compiled.execute_stdio(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn unreadable_input_lines_read_as_empty() {
        let mut lines = vec![
            Ok("5".to_owned()),
            Err(io::Error::new(io::ErrorKind::InvalidData, "stream did not contain valid UTF-8")),
            Ok("true".to_owned()),
        ]
        .into_iter();
        assert_eq!(next_line(&mut lines), "5");
        assert_eq!(next_line(&mut lines), "");
        assert_eq!(next_line(&mut lines), "true");
        assert_eq!(next_line(&mut lines), "");
    }

    #[test]
    fn report_keeps_the_single_error() {
        let scanned = scan::scan("program var int x; begin x := true end.").unwrap();
        let report = analyze(&scanned.tokens, &scanned.identifiers, &scanned.numbers);
        assert!(report.syntax_errors.is_empty());
        assert_eq!(report.semantic_errors.len(), 1);
        assert!(report.program.is_none());

        let scanned = scan::scan("program var int x; begin x := 1 end.").unwrap();
        let report = analyze(&scanned.tokens, &scanned.identifiers, &scanned.numbers);
        assert!(report.success());
        assert!(report.program.is_some());
    }
}

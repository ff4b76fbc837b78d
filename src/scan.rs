//! Finite-state scanner.
//!
//! The scanner walks the source once, switching between the states below. Each
//! state consumes characters and names the state to continue in; `Finish` means
//! a lexeme is complete and control goes back to `Start`.
//!
//! Identifiers and numbers are collected into their own deduplicated tables and
//! tokens only carry the table index. Numbers written in a radix other than ten
//! are stored as their decimal value.

use tracing::debug;

use crate::token::{
    lookup_delimiter, lookup_keyword, Delim, Keyword, Table, TableCode, TableEntry, Token,
};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {kind}")]
pub struct ScanError {
    pub line: usize,
    pub kind: ScanErrorKind,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScanErrorKind {
    #[error("unexpected lexeme `{0}`")]
    UnexpectedLexeme(String),

    #[error("malformed number `{0}`")]
    MalformedNumber(String),

    #[error("number `{0}` does not fit in 64 bits")]
    NumberOverflow(String),

    #[error("unterminated comment")]
    UnterminatedComment,

    #[error("comment contains the program terminator `end.`")]
    TerminatorInComment,
}

/// Everything the parser needs from a successful scan.
#[derive(Debug, Default)]
pub struct Scanned {
    pub tokens: Vec<Token>,
    pub identifiers: Vec<TableEntry>,
    pub numbers: Vec<TableEntry>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
    Start,
    Word,
    Number,
    Fraction,
    Exponent,
    Comment,
    Relational,
    Delimiter,
    Finish,
}

/// Scan `source` into tokens and literal tables.
///
/// # Errors
/// On the first character sequence no state accepts.
pub fn scan(source: &str) -> Result<Scanned, ScanError> {
    let scanned = Scanner::new(source).run()?;
    debug!(
        tokens = scanned.tokens.len(),
        identifiers = scanned.identifiers.len(),
        numbers = scanned.numbers.len(),
        "scanned source"
    );
    Ok(scanned)
}

struct Scanner {
    chars: Vec<char>,
    cursor: usize,
    line: usize,
    /// Text of the lexeme being accumulated.
    lexeme: String,
    tokens: Vec<Token>,
    identifiers: Table,
    numbers: Table,
}

impl Scanner {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            cursor: 0,
            line: 1,
            lexeme: String::new(),
            tokens: Vec::new(),
            identifiers: Table::default(),
            numbers: Table::default(),
        }
    }

    fn run(mut self) -> Result<Scanned, ScanError> {
        let mut state = State::Start;
        loop {
            state = match state {
                State::Start => match self.start() {
                    Some(next) => next,
                    None => break,
                },
                State::Word => self.word(),
                State::Number => self.number()?,
                State::Fraction => self.fraction()?,
                State::Exponent => self.exponent()?,
                State::Comment => self.comment()?,
                State::Relational => self.relational(),
                State::Delimiter => self.delimiter()?,
                State::Finish => {
                    self.lexeme.clear();
                    State::Start
                }
            };
        }
        Ok(Scanned {
            tokens: self.tokens,
            identifiers: self.identifiers.into_entries(),
            numbers: self.numbers.into_entries(),
        })
    }

    /// Skip whitespace and pick the state for the next lexeme. `None` at end of input.
    fn start(&mut self) -> Option<State> {
        loop {
            let c = self.peek()?;
            match c {
                '\n' => {
                    self.line += 1;
                    self.cursor += 1;
                }
                c if c.is_whitespace() => self.cursor += 1,
                c if c.is_ascii_alphabetic() => return Some(State::Word),
                c if c.is_ascii_digit() => return Some(State::Number),
                '.' if self.last_is_end() => {
                    self.cursor += 1;
                    self.tokens.push(Token::delim(Delim::Dot));
                    return Some(State::Finish);
                }
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.cursor += 1;
                    self.lexeme.push_str("0.");
                    return Some(State::Fraction);
                }
                '{' => {
                    self.cursor += 1;
                    return Some(State::Comment);
                }
                '<' | '>' | '!' => return Some(State::Relational),
                _ => return Some(State::Delimiter),
            }
        }
    }

    fn word(&mut self) -> State {
        while let Some(c) = self.peek().filter(char::is_ascii_alphanumeric) {
            self.lexeme.push(c);
            self.cursor += 1;
        }
        let token = match lookup_keyword(&self.lexeme) {
            Some(index) => Token::new(TableCode::Keyword, index),
            None => Token::new(TableCode::Identifier, self.identifiers.intern(&self.lexeme)),
        };
        self.tokens.push(token);
        State::Finish
    }

    /// Greedy run of hexadecimal digits; the suffix that follows decides the radix.
    fn number(&mut self) -> Result<State, ScanError> {
        while let Some(c) = self.peek().filter(char::is_ascii_hexdigit) {
            self.lexeme.push(c);
            self.cursor += 1;
        }
        let decimal = self.lexeme.chars().all(|c| c.is_ascii_digit());
        match self.peek() {
            Some('H' | 'h') => {
                self.cursor += 1;
                let digits = self.lexeme.clone();
                self.radix_literal(&digits, 16)
            }
            Some('O' | 'o') => {
                self.cursor += 1;
                let digits = self.lexeme.clone();
                if !digits.chars().all(|c| ('0'..='7').contains(&c)) {
                    return Err(self.malformed(&format!("{digits}O")));
                }
                self.radix_literal(&digits, 8)
            }
            Some('.') if decimal && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.cursor += 1;
                self.lexeme.push('.');
                Ok(State::Fraction)
            }
            Some('+' | '-') if self.is_exponent_head() => Ok(State::Exponent),
            _ => self.plain_run(),
        }
    }

    /// A run with no radix suffix consumed after it.
    fn plain_run(&mut self) -> Result<State, ScanError> {
        let run = self.lexeme.clone();
        let (head, last) = run.split_at(run.len() - 1);
        let all = |s: &str, f: fn(char) -> bool| !s.is_empty() && s.chars().all(f);

        if all(&run, |c| c.is_ascii_digit()) {
            if run.parse::<i64>().is_err() {
                return Err(self.error(ScanErrorKind::NumberOverflow(run)));
            }
            return self.push_number(&run);
        }
        match last {
            "B" | "b" if all(head, |c| c == '0' || c == '1') => return self.radix_literal(head, 2),
            "D" | "d" if all(head, |c| c.is_ascii_digit()) => return self.radix_literal(head, 10),
            _ => {}
        }
        if let Some((mantissa, exp)) = run.split_once(['E', 'e']) {
            if all(mantissa, |c| c.is_ascii_digit()) && all(exp, |c| c.is_ascii_digit()) {
                return self.float_literal();
            }
        }
        Err(self.malformed(&run))
    }

    fn fraction(&mut self) -> Result<State, ScanError> {
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            self.lexeme.push(c);
            self.cursor += 1;
        }
        if matches!(self.peek(), Some('E' | 'e')) {
            let digit_follows = match self.peek_at(1) {
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if digit_follows {
                self.lexeme.push('e');
                self.cursor += 1;
                return Ok(State::Exponent);
            }
        }
        self.float_literal()
    }

    /// Entered right after the exponent marker, which is already part of the lexeme.
    fn exponent(&mut self) -> Result<State, ScanError> {
        if let Some(sign @ ('+' | '-')) = self.peek() {
            self.lexeme.push(sign);
            self.cursor += 1;
        }
        let mut digits = 0;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            self.lexeme.push(c);
            self.cursor += 1;
            digits += 1;
        }
        if digits == 0 {
            let lexeme = self.lexeme.clone();
            return Err(self.malformed(&lexeme));
        }
        self.float_literal()
    }

    fn comment(&mut self) -> Result<State, ScanError> {
        let opened_on = self.line;
        let mut body = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ScanError {
                    line: opened_on,
                    kind: ScanErrorKind::UnterminatedComment,
                });
            };
            self.cursor += 1;
            match c {
                '}' => return Ok(State::Finish),
                '\n' => self.line += 1,
                _ => {}
            }
            body.push(c);
            if body.ends_with("end.") {
                return Err(self.error(ScanErrorKind::TerminatorInComment));
            }
        }
    }

    fn relational(&mut self) -> State {
        let mut text = String::new();
        if let Some(c) = self.peek() {
            text.push(c);
            self.cursor += 1;
        }
        if self.peek() == Some('=') {
            text.push('=');
            self.cursor += 1;
        }
        if let Some(index) = lookup_delimiter(&text) {
            self.tokens.push(Token::new(TableCode::Delimiter, index));
        }
        State::Finish
    }

    fn delimiter(&mut self) -> Result<State, ScanError> {
        let first = self.peek().unwrap_or_default();
        if let Some(second) = self.peek_at(1) {
            let pair: String = [first, second].iter().collect();
            if let Some(index) = lookup_delimiter(&pair) {
                self.cursor += 2;
                self.tokens.push(Token::new(TableCode::Delimiter, index));
                return Ok(State::Finish);
            }
        }
        match lookup_delimiter(first.encode_utf8(&mut [0; 4])) {
            Some(index) => {
                self.cursor += 1;
                self.tokens.push(Token::new(TableCode::Delimiter, index));
                Ok(State::Finish)
            }
            None => Err(self.error(ScanErrorKind::UnexpectedLexeme(first.to_string()))),
        }
    }

    fn radix_literal(&mut self, digits: &str, radix: u32) -> Result<State, ScanError> {
        match i64::from_str_radix(digits, radix) {
            Ok(value) => self.push_number(&value.to_string()),
            Err(_) => Err(self.error(ScanErrorKind::NumberOverflow(self.lexeme.clone()))),
        }
    }

    fn float_literal(&mut self) -> Result<State, ScanError> {
        let value = match self.lexeme.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            Ok(_) => return Err(self.error(ScanErrorKind::NumberOverflow(self.lexeme.clone()))),
            Err(_) => {
                let lexeme = self.lexeme.clone();
                return Err(self.malformed(&lexeme));
            }
        };
        let text = canonical_float(value);
        self.push_number(&text)
    }

    fn push_number(&mut self, text: &str) -> Result<State, ScanError> {
        // A number glued to a letter, like `12ab`, is not a lexeme of its own.
        if let Some(c) = self.peek().filter(char::is_ascii_alphabetic) {
            let mut fragment = self.lexeme.clone();
            fragment.push(c);
            return Err(self.malformed(&fragment));
        }
        let index = self.numbers.intern(text);
        self.tokens.push(Token::new(TableCode::Number, index));
        Ok(State::Finish)
    }

    fn is_exponent_head(&self) -> bool {
        let mut chars = self.lexeme.chars();
        matches!(chars.next_back(), Some('E' | 'e'))
            && chars.as_str().chars().all(|c| c.is_ascii_digit())
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
    }

    fn last_is_end(&self) -> bool {
        self.tokens
            .last()
            .is_some_and(|t| t.is_keyword(Keyword::End))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.cursor + offset).copied()
    }

    fn error(&self, kind: ScanErrorKind) -> ScanError {
        ScanError {
            line: self.line,
            kind,
        }
    }

    fn malformed(&self, fragment: &str) -> ScanError {
        self.error(ScanErrorKind::MalformedNumber(fragment.to_owned()))
    }
}

/// Render a float the way the number table stores it. The text always reads
/// back as a float, so `1E3` is kept as `1000.0`.
fn canonical_float(value: f64) -> String {
    let magnitude = value.abs();
    let text = if magnitude != 0.0 && !(1e-5..1e15).contains(&magnitude) {
        format!("{value:e}")
    } else {
        format!("{value}")
    };
    if !text.contains(['.', 'e']) {
        text + ".0"
    } else {
        text
    }
}

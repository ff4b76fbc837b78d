use std::fmt::Display;
use std::str::FromStr;

/// Reserved words, in table order. A keyword token's index is its position here plus one.
pub const KEYWORDS: [&str; 18] = [
    "program", "var", "begin", "end", "int", "float", "bool", "if", "else", "while", "for", "to",
    "step", "next", "true", "false", "readln", "writeln",
];

/// Punctuation, in table order.
pub const DELIMITERS: [&str; 22] = [
    ";", ",", ":", ":=", "!", "!=", "==", "<", ">", "<=", ">=", "+", "-", "||", "*", "&&", "/",
    "(", ")", "{", "}", ".",
];

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Keyword {
    Program = 1,
    Var,
    Begin,
    End,
    Int,
    Float,
    Bool,
    If,
    Else,
    While,
    For,
    To,
    Step,
    Next,
    True,
    False,
    Readln,
    Writeln,
}

impl Keyword {
    pub const fn text(self) -> &'static str {
        KEYWORDS[self as usize - 1]
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Delim {
    Semicolon = 1,
    Comma,
    Colon,
    Assign,
    Not,
    NotEq,
    EqEq,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    Minus,
    Or,
    Star,
    And,
    Slash,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Dot,
}

impl Delim {
    pub const fn text(self) -> &'static str {
        DELIMITERS[self as usize - 1]
    }
}

/// Which table a token's index points into.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum TableCode {
    Keyword = 1,
    Delimiter = 2,
    Number = 3,
    Identifier = 4,
}

impl TryFrom<u8> for TableCode {
    type Error = TokenFormatError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => Self::Keyword,
            2 => Self::Delimiter,
            3 => Self::Number,
            4 => Self::Identifier,
            _ => return Err(TokenFormatError::UnknownTable(code)),
        })
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenFormatError {
    #[error("malformed token `{0}`, expected `(table,index)`")]
    Malformed(String),

    #[error("unknown table code {0}")]
    UnknownTable(u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Token {
    pub table: TableCode,
    /// 1-based position in the table.
    pub index: usize,
}

impl Token {
    pub const fn new(table: TableCode, index: usize) -> Self {
        Self { table, index }
    }

    pub const fn keyword(kw: Keyword) -> Self {
        Self::new(TableCode::Keyword, kw as usize)
    }

    pub const fn delim(d: Delim) -> Self {
        Self::new(TableCode::Delimiter, d as usize)
    }

    pub fn is_keyword(self, kw: Keyword) -> bool {
        self == Self::keyword(kw)
    }

    pub fn is_delim(self, d: Delim) -> bool {
        self == Self::delim(d)
    }

    /// The token's source text, resolved against the fixed and the scanned tables.
    pub fn text<'a>(&self, identifiers: &'a [TableEntry], numbers: &'a [TableEntry]) -> &'a str {
        let lookup = |table: &'a [TableEntry]| {
            table
                .get(self.index.wrapping_sub(1))
                .map_or("<?>", |e| e.value.as_str())
        };
        match self.table {
            TableCode::Keyword => KEYWORDS.get(self.index.wrapping_sub(1)).copied().unwrap_or("<?>"),
            TableCode::Delimiter => DELIMITERS
                .get(self.index.wrapping_sub(1))
                .copied()
                .unwrap_or("<?>"),
            TableCode::Number => lookup(numbers),
            TableCode::Identifier => lookup(identifiers),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{})", self.table as u8, self.index)
    }
}

impl FromStr for Token {
    type Err = TokenFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TokenFormatError::Malformed(s.to_owned());
        let inner = s
            .strip_prefix('(')
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(malformed)?;
        let (code, index) = inner.split_once(',').ok_or_else(malformed)?;
        let code: u8 = code.trim().parse().map_err(|_| malformed())?;
        let index: usize = index.trim().parse().map_err(|_| malformed())?;
        if index == 0 {
            return Err(malformed());
        }
        Ok(Self::new(code.try_into()?, index))
    }
}

/// Render a token sequence in its space-separated textual form.
pub fn format_tokens(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the space-separated textual form back into tokens.
///
/// # Errors
/// If any element is not a well-formed `(table,index)` pair.
pub fn parse_tokens(text: &str) -> Result<Vec<Token>, TokenFormatError> {
    text.split_whitespace().map(str::parse).collect()
}

/// One row of the identifier or number table.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TableEntry {
    pub id: usize,
    pub value: String,
}

impl Display for TableEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}", self.id, self.value)
    }
}

/// Insertion-ordered, deduplicated table built while scanning.
#[derive(Default, Debug)]
pub struct Table {
    entries: Vec<TableEntry>,
}

impl Table {
    /// Index of `value`, inserting it on first sight.
    pub fn intern(&mut self, value: &str) -> usize {
        if let Some(entry) = self.entries.iter().find(|e| e.value == value) {
            return entry.id;
        }
        let id = self.entries.len() + 1;
        self.entries.push(TableEntry {
            id,
            value: value.to_owned(),
        });
        id
    }

    pub fn into_entries(self) -> Vec<TableEntry> {
        self.entries
    }
}

pub fn lookup_keyword(word: &str) -> Option<usize> {
    KEYWORDS.iter().position(|k| *k == word).map(|i| i + 1)
}

pub fn lookup_delimiter(text: &str) -> Option<usize> {
    DELIMITERS.iter().position(|d| *d == text).map(|i| i + 1)
}

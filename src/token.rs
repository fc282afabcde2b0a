//! The token definition for the filter language.

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    // Clause keywords
    Filter, // "Filter:"
    Search, // "Search:"

    // Keywords
    And,        // "AND"
    Or,         // "OR"
    In,         // "IN"
    Bt,         // "BT"
    Contains,   // "CONTAINS"
    StartsWith, // "STARTSWITH"
    EndsWith,   // "ENDSWITH"
    True,
    False,

    // Literals
    Identifier(&'a str),
    String(&'a str), // Content between the quotes
    Number(f64),
    Date(&'a str), // YYYY-MM-DD, validated by the parser

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    Semicolon, // ;
    Comma,     // ,

    // Operators
    Eq,    // =
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=

    // Special
    Illegal, // An illegal/unknown character or an unterminated string
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

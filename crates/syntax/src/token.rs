use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use sqfls_span::HasSpan;
use sqfls_span::Location;
use sqfls_span::Span;

/// Lexical classification of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Ident,
    Number,
    HexNumber,
    String,
    True,
    False,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    LeftParen,
    RightParen,
    Semicolon,
    Comma,
    Assign,
    /// A symbolic operator such as `&&`, `==`, `+`, or `:`.
    Operator,
    /// Synthetic token marking the end of the input.
    EndOfInput,
}

/// A lexed token.
///
/// `location.offset` is a byte offset into the preprocessed text, while
/// `location.line` and `path` are attributed back to the originating source
/// file through the preprocessor's line map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub contents: String,
    pub location: Location,
    pub path: Arc<str>,
}

impl Token {
    #[must_use]
    pub fn synthetic(path: Arc<str>) -> Self {
        Self { kind: TokenKind::EndOfInput, contents: String::new(), location: Location::zero(), path }
    }
}

impl HasSpan for Token {
    fn span(&self) -> Span {
        Span::new(self.location, self.contents.len() as u32)
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == TokenKind::EndOfInput {
            write!(f, "end of input")
        } else {
            write!(f, "`{}`", self.contents)
        }
    }
}

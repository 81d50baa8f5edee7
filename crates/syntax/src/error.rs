use sqfls_span::Location;

/// Errors produced by the lexer and the parsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnexpectedToken { found: String, expected: &'static str, location: Location },
    UnexpectedEndOfInput { expected: &'static str, location: Location },
    UnterminatedString { location: Location },
    UnterminatedComment { location: Location },
}

impl ParseError {
    #[must_use]
    pub const fn location(&self) -> Location {
        match self {
            ParseError::UnexpectedToken { location, .. }
            | ParseError::UnexpectedEndOfInput { location, .. }
            | ParseError::UnterminatedString { location }
            | ParseError::UnterminatedComment { location } => *location,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::UnexpectedToken { found, expected, .. } => {
                write!(f, "Expected {expected}, found {found}")
            }
            ParseError::UnexpectedEndOfInput { expected, .. } => {
                write!(f, "Expected {expected} before end of input")
            }
            ParseError::UnterminatedString { .. } => write!(f, "Unterminated string literal"),
            ParseError::UnterminatedComment { .. } => write!(f, "Unterminated block comment"),
        }
    }
}

impl std::error::Error for ParseError {}

use std::sync::Arc;

use sqfls_span::LineOrigins;
use sqfls_span::Location;

use crate::error::ParseError;
use crate::text::iequal;
use crate::token::Token;
use crate::token::TokenKind;

/// Tokenizer over preprocessed text.
///
/// Offsets and columns are positions in the preprocessed text; lines and
/// paths are re-attributed through the optional [`LineOrigins`] so tokens
/// spliced in from an include carry that file's identity.
pub struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    default_path: Arc<str>,
    origins: Option<&'a LineOrigins>,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(text: &'a str, path: &str, origins: Option<&'a LineOrigins>) -> Self {
        Self { bytes: text.as_bytes(), pos: 0, line: 1, column: 0, default_path: Arc::from(path), origins }
    }

    /// Tokenizes the whole input.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_trivia()?;
            if self.pos >= self.bytes.len() {
                break;
            }

            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn location(&self) -> Location {
        let (line, _) = self.attribute(self.line);

        Location { line, column: self.column, offset: self.pos as u32 }
    }

    fn attribute(&self, output_line: u32) -> (u32, Arc<str>) {
        match self.origins.and_then(|origins| origins.origin_of(output_line)) {
            Some((path, line)) => (line, path),
            None => (output_line, Arc::clone(&self.default_path)),
        }
    }

    fn current_path(&self) -> Arc<str> {
        self.attribute(self.line).1
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, delta: usize) -> Option<u8> {
        self.bytes.get(self.pos + delta).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }

        Some(byte)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(byte) if byte.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(ParseError::UnterminatedComment { location: start }),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let location = self.location();
        let path = self.current_path();
        let byte = self.peek().unwrap_or(b'\0');

        if byte == b'"' || byte == b'\'' {
            return self.lex_string(location, path);
        }

        if byte.is_ascii_digit()
            || (byte == b'.' && self.peek_at(1).is_some_and(|next| next.is_ascii_digit()))
            || byte == b'$'
        {
            return Ok(self.lex_number(location, path));
        }

        if byte.is_ascii_alphabetic() || byte == b'_' {
            return Ok(self.lex_ident(location, path));
        }

        self.lex_symbol(location, path)
    }

    fn lex_string(&mut self, location: Location, path: Arc<str>) -> Result<Token, ParseError> {
        let quote = self.bump().unwrap_or(b'"');
        let mut contents = String::new();
        contents.push(quote as char);

        loop {
            match self.peek() {
                Some(byte) if byte == quote => {
                    self.bump();
                    contents.push(quote as char);
                    // A doubled quote continues the literal.
                    if self.peek() == Some(quote) {
                        self.bump();
                        contents.push(quote as char);
                    } else {
                        break;
                    }
                }
                Some(byte) => {
                    self.bump();
                    contents.push(byte as char);
                }
                None => return Err(ParseError::UnterminatedString { location }),
            }
        }

        Ok(Token { kind: TokenKind::String, contents, location, path })
    }

    fn lex_number(&mut self, location: Location, path: Arc<str>) -> Token {
        let mut contents = String::new();
        let mut kind = TokenKind::Number;

        if self.peek() == Some(b'$') {
            kind = TokenKind::HexNumber;
            contents.push(self.bump().unwrap_or(b'$') as char);
            while let Some(byte) = self.peek() {
                if byte.is_ascii_hexdigit() {
                    contents.push(byte as char);
                    self.bump();
                } else {
                    break;
                }
            }
            return Token { kind, contents, location, path };
        }

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            kind = TokenKind::HexNumber;
            contents.push(self.bump().unwrap_or(b'0') as char);
            contents.push(self.bump().unwrap_or(b'x') as char);
            while let Some(byte) = self.peek() {
                if byte.is_ascii_hexdigit() {
                    contents.push(byte as char);
                    self.bump();
                } else {
                    break;
                }
            }
            return Token { kind, contents, location, path };
        }

        let mut seen_dot = false;
        let mut seen_exponent = false;
        while let Some(byte) = self.peek() {
            match byte {
                b'0'..=b'9' => {
                    contents.push(byte as char);
                    self.bump();
                }
                b'.' if !seen_dot && !seen_exponent => {
                    seen_dot = true;
                    contents.push(byte as char);
                    self.bump();
                }
                b'e' | b'E' if !seen_exponent => {
                    seen_exponent = true;
                    contents.push(byte as char);
                    self.bump();
                    if matches!(self.peek(), Some(b'+' | b'-')) {
                        contents.push(self.bump().unwrap_or(b'+') as char);
                    }
                }
                _ => break,
            }
        }

        Token { kind, contents, location, path }
    }

    fn lex_ident(&mut self, location: Location, path: Arc<str>) -> Token {
        let mut contents = String::new();
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                contents.push(byte as char);
                self.bump();
            } else {
                break;
            }
        }

        let kind = if iequal(&contents, "true") {
            TokenKind::True
        } else if iequal(&contents, "false") {
            TokenKind::False
        } else {
            TokenKind::Ident
        };

        Token { kind, contents, location, path }
    }

    fn lex_symbol(&mut self, location: Location, path: Arc<str>) -> Result<Token, ParseError> {
        let byte = self.bump().unwrap_or(b'\0');

        let (kind, contents) = match byte {
            b'{' => (TokenKind::LeftBrace, "{".to_string()),
            b'}' => (TokenKind::RightBrace, "}".to_string()),
            b'[' => (TokenKind::LeftBracket, "[".to_string()),
            b']' => (TokenKind::RightBracket, "]".to_string()),
            b'(' => (TokenKind::LeftParen, "(".to_string()),
            b')' => (TokenKind::RightParen, ")".to_string()),
            b';' => (TokenKind::Semicolon, ";".to_string()),
            b',' => (TokenKind::Comma, ",".to_string()),
            b'=' if self.peek() == Some(b'=') => {
                self.bump();
                (TokenKind::Operator, "==".to_string())
            }
            b'=' => (TokenKind::Assign, "=".to_string()),
            b'&' if self.peek() == Some(b'&') => {
                self.bump();
                (TokenKind::Operator, "&&".to_string())
            }
            b'|' if self.peek() == Some(b'|') => {
                self.bump();
                (TokenKind::Operator, "||".to_string())
            }
            b'!' if self.peek() == Some(b'=') => {
                self.bump();
                (TokenKind::Operator, "!=".to_string())
            }
            b'<' if self.peek() == Some(b'=') => {
                self.bump();
                (TokenKind::Operator, "<=".to_string())
            }
            b'>' if self.peek() == Some(b'=') => {
                self.bump();
                (TokenKind::Operator, ">=".to_string())
            }
            b'>' if self.peek() == Some(b'>') => {
                self.bump();
                (TokenKind::Operator, ">>".to_string())
            }
            b'!' => (TokenKind::Operator, "!".to_string()),
            b'<' => (TokenKind::Operator, "<".to_string()),
            b'>' => (TokenKind::Operator, ">".to_string()),
            b'+' => (TokenKind::Operator, "+".to_string()),
            b'-' => (TokenKind::Operator, "-".to_string()),
            b'*' => (TokenKind::Operator, "*".to_string()),
            b'/' => (TokenKind::Operator, "/".to_string()),
            b'%' => (TokenKind::Operator, "%".to_string()),
            b'^' => (TokenKind::Operator, "^".to_string()),
            b':' => (TokenKind::Operator, ":".to_string()),
            b'#' => (TokenKind::Operator, "#".to_string()),
            other => {
                return Err(ParseError::UnexpectedToken {
                    found: format!("`{}`", other as char),
                    expected: "a token",
                    location,
                })
            }
        };

        Ok(Token { kind, contents, location, path })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Lexer::new(text, "test.sqf", None).tokenize().unwrap().into_iter().map(|token| token.kind).collect()
    }

    #[test]
    fn lexes_assignment_statement() {
        assert_eq!(
            kinds("private _x = 1;"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Assign, TokenKind::Number, TokenKind::Semicolon]
        );
    }

    #[test]
    fn lexes_doubled_quotes_as_one_string() {
        let tokens = Lexer::new(r#""say ""hi""""#, "test.sqf", None).tokenize().unwrap();

        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].contents, r#""say ""hi""""#);
    }

    #[test]
    fn lexes_hex_numbers() {
        let tokens = Lexer::new("0x1F $FF 12.5e-3", "test.sqf", None).tokenize().unwrap();

        assert_eq!(tokens[0].kind, TokenKind::HexNumber);
        assert_eq!(tokens[1].kind, TokenKind::HexNumber);
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].contents, "12.5e-3");
    }

    #[test]
    fn tracks_locations_across_lines() {
        let tokens = Lexer::new("a\n  b", "test.sqf", None).tokenize().unwrap();

        assert_eq!(tokens[0].location, Location::new(1, 0, 0));
        assert_eq!(tokens[1].location, Location::new(2, 2, 4));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("a // line\n/* block\n */ b"), vec![TokenKind::Ident, TokenKind::Ident]);
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let error = Lexer::new("/* oops", "test.sqf", None).tokenize().unwrap_err();

        assert!(matches!(error, ParseError::UnterminatedComment { .. }));
    }

    #[test]
    fn attributes_lines_through_origins() {
        let mut origins = LineOrigins::new();
        origins.push(Arc::from("a.sqf"), 1);
        origins.push(Arc::from("inc.hpp"), 7);

        let tokens = Lexer::new("x\ny", "a.sqf", Some(&origins)).tokenize().unwrap();

        assert_eq!(tokens[0].path.as_ref(), "a.sqf");
        assert_eq!(tokens[0].location.line, 1);
        assert_eq!(tokens[1].path.as_ref(), "inc.hpp");
        assert_eq!(tokens[1].location.line, 7);
    }
}

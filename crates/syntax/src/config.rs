//! Parser for the key-value configuration format.
//!
//! The format is a tree of `class` blocks containing properties
//! (`name = value;`, `name[] = {v, v};`) and nested classes, plus
//! `delete name;` entries. Like the script parser it runs over
//! preprocessed text with line re-attribution.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use strum::Display;

use sqfls_span::HasSpan;
use sqfls_span::LineOrigins;
use sqfls_span::Location;
use sqfls_span::Span;

use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::text::iequal;
use crate::token::Token;
use crate::token::TokenKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum ConfigNodeKind {
    #[strum(serialize = "CONFIG")]
    Config,
    /// A class definition; the token is the class name. An `EXTENDS` child
    /// precedes the body entries when a parent class is named.
    #[strum(serialize = "CLASS")]
    Class,
    /// An external class declaration (`class Name;`).
    #[strum(serialize = "CLASS_DECLARATION")]
    ClassDeclaration,
    #[strum(serialize = "EXTENDS")]
    Extends,
    #[strum(serialize = "DELETE")]
    Delete,
    /// `name = value;` — one `VALUE` child.
    #[strum(serialize = "PROPERTY")]
    Property,
    /// `name[] = {…};` — one `VALUE` child per element.
    #[strum(serialize = "ARRAY_PROPERTY")]
    ArrayProperty,
    #[strum(serialize = "VALUE")]
    Value,
}

/// An owned configuration AST node.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNode {
    pub kind: ConfigNodeKind,
    pub token: Token,
    pub children: Vec<ConfigNode>,
}

impl ConfigNode {
    #[must_use]
    pub fn new(kind: ConfigNodeKind, token: Token) -> Self {
        Self { kind, token, children: Vec::new() }
    }

    #[must_use]
    pub fn with_children(kind: ConfigNodeKind, token: Token, children: Vec<ConfigNode>) -> Self {
        Self { kind, token, children }
    }
}

impl HasSpan for ConfigNode {
    fn span(&self) -> Span {
        self.token.span()
    }
}

/// Parses preprocessed configuration text into a `Config` tree.
pub fn parse_config(text: &str, path: &str, origins: Option<&LineOrigins>) -> Result<ConfigNode, ParseError> {
    let tokens = Lexer::new(text, path, origins).tokenize()?;

    ConfigParser::new(tokens, Arc::from(path)).parse()
}

struct ConfigParser {
    tokens: Vec<Token>,
    pos: usize,
    path: Arc<str>,
}

impl ConfigParser {
    fn new(tokens: Vec<Token>, path: Arc<str>) -> Self {
        Self { tokens, pos: 0, path }
    }

    fn parse(mut self) -> Result<ConfigNode, ParseError> {
        let root_token = self.tokens.first().cloned().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));
        let entries = self.parse_entries(None)?;

        Ok(ConfigNode::with_children(ConfigNodeKind::Config, root_token, entries))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, delta: usize) -> Option<&Token> {
        self.tokens.get(self.pos + delta)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }

        token
    }

    fn end_location(&self) -> Location {
        self.tokens.last().map(|token| token.location).unwrap_or_default()
    }

    fn expect(&mut self, kind: TokenKind, expected: &'static str) -> Result<Token, ParseError> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                Ok(self.bump().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path))))
            }
            Some(token) => Err(ParseError::UnexpectedToken {
                found: token.to_string(),
                expected,
                location: token.location,
            }),
            None => Err(ParseError::UnexpectedEndOfInput { expected, location: self.end_location() }),
        }
    }

    fn parse_entries(&mut self, until: Option<TokenKind>) -> Result<Vec<ConfigNode>, ParseError> {
        let mut entries = Vec::new();

        loop {
            while self.peek().is_some_and(|token| token.kind == TokenKind::Semicolon) {
                self.bump();
            }

            match self.peek() {
                None => break,
                Some(token) if Some(token.kind) == until => break,
                Some(_) => {}
            }

            entries.push(self.parse_entry()?);
        }

        Ok(entries)
    }

    fn parse_entry(&mut self) -> Result<ConfigNode, ParseError> {
        let token = self.peek().cloned().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));

        if token.kind == TokenKind::Ident && iequal(&token.contents, "class") {
            return self.parse_class();
        }

        if token.kind == TokenKind::Ident && iequal(&token.contents, "delete") {
            self.bump();
            let name = self.expect(TokenKind::Ident, "a class name")?;
            return Ok(ConfigNode::new(ConfigNodeKind::Delete, name));
        }

        self.parse_property()
    }

    fn parse_class(&mut self) -> Result<ConfigNode, ParseError> {
        self.bump();
        let name = self.expect(TokenKind::Ident, "a class name")?;

        // `class Name;` declares without a body.
        if self.peek().is_some_and(|token| token.kind == TokenKind::Semicolon) {
            return Ok(ConfigNode::new(ConfigNodeKind::ClassDeclaration, name));
        }

        let mut children = Vec::new();
        if self.peek().is_some_and(|token| token.kind == TokenKind::Operator && token.contents == ":") {
            self.bump();
            let parent = self.expect(TokenKind::Ident, "a parent class name")?;
            children.push(ConfigNode::new(ConfigNodeKind::Extends, parent));
        }

        self.expect(TokenKind::LeftBrace, "`{`")?;
        children.extend(self.parse_entries(Some(TokenKind::RightBrace))?);
        self.expect(TokenKind::RightBrace, "`}`")?;

        Ok(ConfigNode::with_children(ConfigNodeKind::Class, name, children))
    }

    fn parse_property(&mut self) -> Result<ConfigNode, ParseError> {
        let name = self.expect(TokenKind::Ident, "a property name")?;

        let is_array = self.peek().is_some_and(|token| token.kind == TokenKind::LeftBracket)
            && self.peek_at(1).is_some_and(|token| token.kind == TokenKind::RightBracket);
        if is_array {
            self.bump();
            self.bump();
        }

        self.expect(TokenKind::Assign, "`=`")?;

        if is_array {
            let values = self.parse_array_values()?;
            return Ok(ConfigNode::with_children(ConfigNodeKind::ArrayProperty, name, values));
        }

        let value = self.parse_value()?;

        Ok(ConfigNode::with_children(ConfigNodeKind::Property, name, vec![value]))
    }

    fn parse_array_values(&mut self) -> Result<Vec<ConfigNode>, ParseError> {
        self.expect(TokenKind::LeftBrace, "`{`")?;
        let mut values = Vec::new();

        loop {
            while self.peek().is_some_and(|token| token.kind == TokenKind::Comma) {
                self.bump();
            }
            match self.peek() {
                Some(token) if token.kind == TokenKind::RightBrace => break,
                Some(token) if token.kind == TokenKind::LeftBrace => {
                    // Nested array value.
                    let opener = token.clone();
                    let nested = self.parse_array_values()?;
                    values.push(ConfigNode::with_children(ConfigNodeKind::Value, opener, nested));
                }
                Some(_) => values.push(self.parse_value()?),
                None => {
                    return Err(ParseError::UnexpectedEndOfInput { expected: "`}`", location: self.end_location() })
                }
            }
        }

        self.expect(TokenKind::RightBrace, "`}`")?;

        Ok(values)
    }

    fn parse_value(&mut self) -> Result<ConfigNode, ParseError> {
        // A leading minus is folded into the literal token.
        if self.peek().is_some_and(|token| token.kind == TokenKind::Operator && token.contents == "-") {
            let minus = self.bump().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));
            let mut number = self.expect(TokenKind::Number, "a number")?;
            number.contents = format!("-{}", number.contents);
            number.location = minus.location;

            return Ok(ConfigNode::new(ConfigNodeKind::Value, number));
        }

        match self.peek() {
            Some(token)
                if matches!(
                    token.kind,
                    TokenKind::Number | TokenKind::HexNumber | TokenKind::String | TokenKind::Ident | TokenKind::True | TokenKind::False
                ) =>
            {
                let token = self.bump().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));
                Ok(ConfigNode::new(ConfigNodeKind::Value, token))
            }
            Some(token) => Err(ParseError::UnexpectedToken {
                found: token.to_string(),
                expected: "a value",
                location: token.location,
            }),
            None => Err(ParseError::UnexpectedEndOfInput { expected: "a value", location: self.end_location() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(text: &str) -> ConfigNode {
        parse_config(text, "config.cpp", None).unwrap()
    }

    #[test]
    fn parses_nested_classes_with_parent() {
        let root = parse(indoc! {r#"
            class CfgPatches {
                class MyMod : BaseMod {
                    units[] = {"MyUnit"};
                    weapons[] = {};
                    version = 1.5;
                };
            };
        "#});

        let patches = &root.children[0];
        assert_eq!(patches.kind, ConfigNodeKind::Class);
        assert_eq!(patches.token.contents, "CfgPatches");

        let my_mod = &patches.children[0];
        assert_eq!(my_mod.kind, ConfigNodeKind::Class);
        assert_eq!(my_mod.children[0].kind, ConfigNodeKind::Extends);
        assert_eq!(my_mod.children[0].token.contents, "BaseMod");
        assert_eq!(my_mod.children[1].kind, ConfigNodeKind::ArrayProperty);
        assert_eq!(my_mod.children[1].children.len(), 1);
        assert_eq!(my_mod.children[2].children.len(), 0);
        assert_eq!(my_mod.children[3].kind, ConfigNodeKind::Property);
    }

    #[test]
    fn parses_class_declaration_and_delete() {
        let root = parse("class External; delete Obsolete;");

        assert_eq!(root.children[0].kind, ConfigNodeKind::ClassDeclaration);
        assert_eq!(root.children[1].kind, ConfigNodeKind::Delete);
        assert_eq!(root.children[1].token.contents, "Obsolete");
    }

    #[test]
    fn negative_numbers_fold_the_sign() {
        let root = parse("offset = -1.5;");
        let value = &root.children[0].children[0];

        assert_eq!(value.token.contents, "-1.5");
    }

    #[test]
    fn nested_array_values() {
        let root = parse("grid[] = {{1, 2}, {3, 4}};");
        let array = &root.children[0];

        assert_eq!(array.children.len(), 2);
        assert_eq!(array.children[0].children.len(), 2);
    }
}

use std::sync::Arc;

use sqfls_span::LineOrigins;
use sqfls_span::Location;

use crate::ast::Node;
use crate::ast::NodeKind;
use crate::commands::CommandTable;
use crate::error::ParseError;
use crate::lexer::Lexer;
use crate::text::iequal;
use crate::token::Token;
use crate::token::TokenKind;

/// Parses preprocessed script text into a `Statements` tree.
pub fn parse_script(text: &str, path: &str, origins: Option<&LineOrigins>) -> Result<Node, ParseError> {
    let tokens = Lexer::new(text, path, origins).tokenize()?;
    let commands = CommandTable::builtin();

    Parser::new(tokens, Arc::from(path), &commands).parse()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    path: Arc<str>,
    commands: &'a CommandTable,
}

impl<'a> Parser<'a> {
    fn new(tokens: Vec<Token>, path: Arc<str>, commands: &'a CommandTable) -> Self {
        Self { tokens, pos: 0, path, commands }
    }

    fn parse(mut self) -> Result<Node, ParseError> {
        let root_token = self.tokens.first().cloned().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));
        let statements = self.parse_statements(None)?;

        Ok(Node::with_children(NodeKind::Statements, root_token, statements))
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
            Some(token) if token.kind == kind => Ok(self.bump().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)))),
            Some(token) => Err(ParseError::UnexpectedToken {
                found: token.to_string(),
                expected,
                location: token.location,
            }),
            None => Err(ParseError::UnexpectedEndOfInput { expected, location: self.end_location() }),
        }
    }

    /// Parses statements until the given closing token (or end of input),
    /// without consuming the closer.
    fn parse_statements(&mut self, until: Option<TokenKind>) -> Result<Vec<Node>, ParseError> {
        let mut statements = Vec::new();

        loop {
            while self.peek().is_some_and(|token| matches!(token.kind, TokenKind::Semicolon | TokenKind::Comma)) {
                self.bump();
            }

            match self.peek() {
                None => break,
                Some(token) if Some(token.kind) == until => break,
                Some(_) => {}
            }

            let first = self.peek().cloned().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));
            let inner = self.parse_statement()?;
            statements.push(Node::with_children(NodeKind::Statement, first, vec![inner]));
        }

        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        // `ident = expr` is a plain assignment; `private ident = expr` a
        // local one. Anything else is an expression statement.
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Ident && self.peek_at(1).is_some_and(|next| next.kind == TokenKind::Assign) {
                return self.parse_assignment(NodeKind::Assignment);
            }

            if token.kind == TokenKind::Ident
                && iequal(&token.contents, "private")
                && self.peek_at(1).is_some_and(|next| next.kind == TokenKind::Ident)
                && self.peek_at(2).is_some_and(|next| next.kind == TokenKind::Assign)
            {
                self.bump();
                return self.parse_assignment(NodeKind::AssignmentLocal);
            }
        }

        self.parse_expression(1)
    }

    fn parse_assignment(&mut self, kind: NodeKind) -> Result<Node, ParseError> {
        let ident = self.expect(TokenKind::Ident, "an identifier")?;
        self.expect(TokenKind::Assign, "`=`")?;
        let value = self.parse_expression(1)?;
        let lhs = Node::new(NodeKind::Ident, ident.clone());

        Ok(Node::with_children(kind, ident, vec![lhs, value]))
    }

    fn parse_expression(&mut self, min_tier: u8) -> Result<Node, ParseError> {
        let mut lhs = self.parse_unary()?;

        while let Some((tier, token)) = self.peek_binary_operator() {
            if tier < min_tier {
                break;
            }

            self.bump();
            let rhs = self.parse_expression(tier + 1)?;
            lhs = Node::with_children(NodeKind::binary(tier), token, vec![lhs, rhs]);
        }

        Ok(lhs)
    }

    fn peek_binary_operator(&self) -> Option<(u8, Token)> {
        let token = self.peek()?;

        let tier = match token.kind {
            TokenKind::Operator => match token.contents.as_str() {
                "||" => 1,
                "&&" => 2,
                "==" | "!=" | "<" | ">" | "<=" | ">=" | ">>" => 3,
                ":" => 4,
                "+" | "-" => 6,
                "*" | "/" | "%" => 7,
                "^" => 8,
                "#" => 9,
                _ => return None,
            },
            TokenKind::Ident => {
                if iequal(&token.contents, "or") {
                    1
                } else if iequal(&token.contents, "and") {
                    2
                } else if iequal(&token.contents, "isequalto") || iequal(&token.contents, "isnotequalto") {
                    3
                } else if iequal(&token.contents, "else") {
                    5
                } else if iequal(&token.contents, "min") || iequal(&token.contents, "max") {
                    6
                } else if iequal(&token.contents, "mod") || iequal(&token.contents, "atan2") {
                    7
                } else if self.commands.is_binary(&token.contents) {
                    4
                } else {
                    return None;
                }
            }
            _ => return None,
        };

        Some((tier, token.clone()))
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        if let Some(token) = self.peek() {
            let is_symbol_unary =
                token.kind == TokenKind::Operator && matches!(token.contents.as_str(), "!" | "-");
            let is_command_unary = token.kind == TokenKind::Ident && self.commands.is_unary(&token.contents);

            if is_symbol_unary || is_command_unary {
                let operator = self.bump().unwrap_or_else(|| Token::synthetic(Arc::clone(&self.path)));
                let operand = self.parse_unary()?;

                return Ok(Node::with_children(NodeKind::UnaryExp, operator, vec![operand]));
            }
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let Some(token) = self.peek().cloned() else {
            return Err(ParseError::UnexpectedEndOfInput { expected: "an expression", location: self.end_location() });
        };

        match token.kind {
            TokenKind::Number => {
                self.bump();
                Ok(Node::new(NodeKind::Number, token))
            }
            TokenKind::HexNumber => {
                self.bump();
                Ok(Node::new(NodeKind::HexNumber, token))
            }
            TokenKind::String => {
                self.bump();
                Ok(Node::new(NodeKind::String, token))
            }
            TokenKind::True => {
                self.bump();
                Ok(Node::new(NodeKind::BooleanTrue, token))
            }
            TokenKind::False => {
                self.bump();
                Ok(Node::new(NodeKind::BooleanFalse, token))
            }
            TokenKind::Ident => {
                self.bump();
                if self.commands.is_nullar(&token.contents) {
                    Ok(Node::new(NodeKind::NullarExp, token))
                } else {
                    Ok(Node::new(NodeKind::Ident, token))
                }
            }
            TokenKind::LeftBrace => {
                self.bump();
                let statements = self.parse_statements(Some(TokenKind::RightBrace))?;
                self.expect(TokenKind::RightBrace, "`}`")?;
                Ok(Node::with_children(NodeKind::Code, token, statements))
            }
            TokenKind::LeftBracket => {
                self.bump();
                let mut items = Vec::new();
                loop {
                    while self.peek().is_some_and(|next| next.kind == TokenKind::Comma) {
                        self.bump();
                    }
                    if self.peek().is_some_and(|next| next.kind == TokenKind::RightBracket) {
                        break;
                    }
                    if self.peek().is_none() {
                        return Err(ParseError::UnexpectedEndOfInput {
                            expected: "`]`",
                            location: self.end_location(),
                        });
                    }
                    items.push(self.parse_expression(1)?);
                }
                self.expect(TokenKind::RightBracket, "`]`")?;
                Ok(Node::with_children(NodeKind::Array, token, items))
            }
            TokenKind::LeftParen => {
                self.bump();
                let inner = self.parse_expression(1)?;
                let closer = self.expect(TokenKind::RightParen, "`)`")?;
                let closer_node = Node::new(NodeKind::TokenNode, closer);
                Ok(Node::with_children(NodeKind::GroupExp, token, vec![inner, closer_node]))
            }
            _ => Err(ParseError::UnexpectedToken {
                found: token.to_string(),
                expected: "an expression",
                location: token.location,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(text: &str) -> Node {
        parse_script(text, "test.sqf", None).unwrap()
    }

    fn statement(root: &Node, index: usize) -> &Node {
        &root.children[index].children[0]
    }

    #[test]
    fn parses_local_assignment() {
        let root = parse("private _x = 1;");
        let assignment = statement(&root, 0);

        assert_eq!(assignment.kind, NodeKind::AssignmentLocal);
        assert_eq!(assignment.token.contents, "_x");
        assert_eq!(assignment.children[0].kind, NodeKind::Ident);
        assert_eq!(assignment.children[1].kind, NodeKind::Number);
    }

    #[test]
    fn parses_plain_assignment_with_ident_child() {
        let root = parse("x = y;");
        let assignment = statement(&root, 0);

        assert_eq!(assignment.kind, NodeKind::Assignment);
        assert_eq!(assignment.children[0].token.contents, "x");
        assert_eq!(assignment.children[1].kind, NodeKind::Ident);
        assert_eq!(assignment.children[1].token.contents, "y");
    }

    #[test]
    fn binary_tiers_nest_by_precedence() {
        let root = parse("a || b && c;");
        let or = statement(&root, 0);

        assert_eq!(or.kind, NodeKind::BinaryExp1);
        assert_eq!(or.children[0].kind, NodeKind::Ident);
        assert_eq!(or.children[1].kind, NodeKind::BinaryExp2);
    }

    #[test]
    fn arithmetic_binds_tighter_than_commands() {
        let root = parse("[1, 2] select 1 + 1;");
        let select = statement(&root, 0);

        assert_eq!(select.kind, NodeKind::BinaryExp4);
        assert_eq!(select.children[1].kind, NodeKind::BinaryExp6);
    }

    #[test]
    fn group_carries_closing_bracket_node() {
        let root = parse("x = (1 + 2);");
        let assignment = statement(&root, 0);
        let group = &assignment.children[1];

        assert_eq!(group.kind, NodeKind::GroupExp);
        assert_eq!(group.token.contents, "(");
        assert_eq!(group.children.len(), 2);
        assert_eq!(group.children[0].kind, NodeKind::BinaryExp6);
        assert_eq!(group.children[1].kind, NodeKind::TokenNode);
        assert_eq!(group.children[1].token.contents, ")");
    }

    #[test]
    fn code_blocks_contain_statements() {
        let root = parse("{ private _a = 1; _a } forEach [1, 2];");
        let for_each = statement(&root, 0);

        assert_eq!(for_each.kind, NodeKind::BinaryExp4);
        let code = &for_each.children[0];
        assert_eq!(code.kind, NodeKind::Code);
        assert_eq!(code.children.len(), 2);
        assert_eq!(code.children[0].kind, NodeKind::Statement);
    }

    #[test]
    fn unary_command_over_primary() {
        let root = parse("private \"_x\";");
        let private = statement(&root, 0);

        assert_eq!(private.kind, NodeKind::UnaryExp);
        assert_eq!(private.token.contents, "private");
        assert_eq!(private.children[0].kind, NodeKind::String);
    }

    #[test]
    fn nil_is_a_nullar_expression() {
        let root = parse("_x = nil;");
        let assignment = statement(&root, 0);

        assert_eq!(assignment.children[1].kind, NodeKind::NullarExp);
        assert_eq!(assignment.children[1].token.contents, "nil");
    }

    #[test]
    fn for_loop_shape() {
        let root = parse("for \"_i\" from 1 to 5 do { _i };");
        let do_node = statement(&root, 0);

        // `do` is the outermost binary command; `for "_i"` sits on its left.
        assert_eq!(do_node.kind, NodeKind::BinaryExp4);
        let mut node = &do_node.children[0];
        while node.kind == NodeKind::BinaryExp4 {
            node = &node.children[0];
        }
        assert_eq!(node.kind, NodeKind::UnaryExp);
        assert_eq!(node.token.contents, "for");
        assert_eq!(node.children[0].kind, NodeKind::String);
    }

    #[test]
    fn missing_closer_is_an_error() {
        let error = parse_script("x = (1 + 2;", "test.sqf", None).unwrap_err();

        assert!(matches!(error, ParseError::UnexpectedToken { .. }));
    }
}

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

use sqfls_span::HasSpan;
use sqfls_span::Span;

use crate::token::Token;

/// The kind of a script AST node.
///
/// Binary expressions carry their precedence tier in the kind itself, tier 1
/// binding loosest (`or`) and tier 9 tightest (`#`). The string forms are
/// the vocabulary exposed to scripted analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum NodeKind {
    #[strum(serialize = "__TOKEN")]
    TokenNode,
    #[strum(serialize = "STATEMENTS")]
    Statements,
    #[strum(serialize = "STATEMENT")]
    Statement,
    #[strum(serialize = "IDENT")]
    Ident,
    #[strum(serialize = "NUMBER")]
    Number,
    #[strum(serialize = "HEXNUMBER")]
    HexNumber,
    #[strum(serialize = "STRING")]
    String,
    #[strum(serialize = "BOOLEAN_TRUE")]
    BooleanTrue,
    #[strum(serialize = "BOOLEAN_FALSE")]
    BooleanFalse,
    #[strum(serialize = "CODE")]
    Code,
    #[strum(serialize = "ARRAY")]
    Array,
    #[strum(serialize = "ASSIGNMENT")]
    Assignment,
    #[strum(serialize = "ASSIGNMENT_LOCAL")]
    AssignmentLocal,
    #[strum(serialize = "EXPN")]
    NullarExp,
    #[strum(serialize = "EXPU")]
    UnaryExp,
    #[strum(serialize = "EXP1")]
    BinaryExp1,
    #[strum(serialize = "EXP2")]
    BinaryExp2,
    #[strum(serialize = "EXP3")]
    BinaryExp3,
    #[strum(serialize = "EXP4")]
    BinaryExp4,
    #[strum(serialize = "EXP5")]
    BinaryExp5,
    #[strum(serialize = "EXP6")]
    BinaryExp6,
    #[strum(serialize = "EXP7")]
    BinaryExp7,
    #[strum(serialize = "EXP8")]
    BinaryExp8,
    #[strum(serialize = "EXP9")]
    BinaryExp9,
    #[strum(serialize = "EXP_GROUP")]
    GroupExp,
}

impl NodeKind {
    /// The binary node kind for a precedence tier in 1..=9.
    #[must_use]
    pub fn binary(tier: u8) -> Self {
        match tier {
            1 => NodeKind::BinaryExp1,
            2 => NodeKind::BinaryExp2,
            3 => NodeKind::BinaryExp3,
            4 => NodeKind::BinaryExp4,
            5 => NodeKind::BinaryExp5,
            6 => NodeKind::BinaryExp6,
            7 => NodeKind::BinaryExp7,
            8 => NodeKind::BinaryExp8,
            _ => NodeKind::BinaryExp9,
        }
    }

    /// Precedence class used by the redundant-parentheses detector.
    ///
    /// Twelve classes: binary tiers 1–9, unary 10, nullar 11, everything
    /// else 12. A larger class binds tighter.
    #[must_use]
    pub const fn precedence_class(&self) -> u8 {
        match self {
            NodeKind::BinaryExp1 => 1,
            NodeKind::BinaryExp2 => 2,
            NodeKind::BinaryExp3 => 3,
            NodeKind::BinaryExp4 => 4,
            NodeKind::BinaryExp5 => 5,
            NodeKind::BinaryExp6 => 6,
            NodeKind::BinaryExp7 => 7,
            NodeKind::BinaryExp8 => 8,
            NodeKind::BinaryExp9 => 9,
            NodeKind::UnaryExp => 10,
            NodeKind::NullarExp => 11,
            _ => 12,
        }
    }

    /// Whether this kind is a unary or binary operator expression.
    #[must_use]
    pub const fn is_operator_expression(&self) -> bool {
        matches!(
            self,
            NodeKind::UnaryExp
                | NodeKind::BinaryExp1
                | NodeKind::BinaryExp2
                | NodeKind::BinaryExp3
                | NodeKind::BinaryExp4
                | NodeKind::BinaryExp5
                | NodeKind::BinaryExp6
                | NodeKind::BinaryExp7
                | NodeKind::BinaryExp8
                | NodeKind::BinaryExp9
        )
    }
}

/// An owned script AST node.
///
/// The token is the node's defining token: the identifier for `Ident` and
/// assignment nodes, the operator for expression nodes, the opening bracket
/// for `Code`, `Array` and `GroupExp`. An assignment holds its left-side
/// identifier as the first child and the right-side expression as the
/// second; a group holds the inner expression first and a `TokenNode` for
/// the closing bracket last.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub token: Token,
    pub children: Vec<Node>,
}

impl Node {
    #[must_use]
    pub fn new(kind: NodeKind, token: Token) -> Self {
        Self { kind, token, children: Vec::new() }
    }

    #[must_use]
    pub fn with_children(kind: NodeKind, token: Token, children: Vec<Node>) -> Self {
        Self { kind, token, children }
    }
}

impl HasSpan for Node {
    fn span(&self) -> Span {
        self.token.span()
    }
}

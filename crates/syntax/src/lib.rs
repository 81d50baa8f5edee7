//! Syntax layer for the SQF language server.
//!
//! Provides the tokenizer, the script parser producing an owned [`ast::Node`]
//! tree, and the lighter parser for the key-value configuration format. The
//! parsers operate on already-preprocessed text; tokens are attributed back
//! to their originating file and line through [`sqfls_span::LineOrigins`].

pub mod ast;
pub mod commands;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod text;
pub mod token;

pub use ast::Node;
pub use ast::NodeKind;
pub use config::ConfigNode;
pub use config::ConfigNodeKind;
pub use error::ParseError;
pub use parser::parse_script;
pub use config::parse_config;

//! The incremental analysis engine.
//!
//! One file's analysis flows through this crate end to end: the runtime
//! factory builds a preprocessor wired with path mappings, the `sls`
//! suppression pragma, and the offset-map and include observers; the parser
//! produces the AST; the visitor framework drives the symbol visitor (and,
//! when enabled, the scripted extension host) with a live parent stack; and
//! the commit coordinator persists everything atomically.

pub mod commit;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod offset_map;
pub mod runtime;
pub mod script;
pub mod scripted;
pub mod suppression;
pub mod visitor;

pub use commit::CommitInputs;
pub use commit::commit_analysis;
pub use config::ConfigAnalyzer;
pub use dispatch::Analyzer;
pub use dispatch::AnalyzerInputs;
pub use dispatch::AnalyzerRegistry;
pub use error::AnalysisError;
pub use offset_map::OffsetMap;
pub use runtime::RuntimeFactory;
pub use script::ScriptAnalyzer;
pub use script::SymbolVisitor;
pub use scripted::ScriptEngine;
pub use suppression::SuppressionContext;
pub use visitor::AnalyzerView;
pub use visitor::Visitor;
pub use visitor::VisitorOutput;

//! The script analyzer.
//!
//! Drives one `.sqf` file through the full pipeline: path check,
//! preprocessing (recording offset pairs and include edges), parsing,
//! the visitor walk, and the atomic commit.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::HoverRecord;
use sqfls_database::model::Severity;
use sqfls_preprocessor::PreprocessError;
use sqfls_syntax::Node;
use sqfls_syntax::ParseError;
use sqfls_syntax::parse_script;

use crate::commit::CommitInputs;
use crate::commit::commit_analysis;
use crate::dispatch::Analyzer;
use crate::dispatch::AnalyzerInputs;
use crate::error::AnalysisError;
use crate::offset_map::OffsetMap;
use crate::runtime::RuntimeFactory;
use crate::runtime::remap_through_macros;
use crate::scripted::ScriptedVisitor;
use crate::suppression::SuppressionContext;
use crate::visitor::AnalyzerView;
use crate::visitor::Visitor;
use crate::visitor::VisitorOutput;
use crate::visitor::drive;

pub mod diagnostics;
pub mod symbols;

pub use symbols::SymbolVisitor;

pub struct ScriptAnalyzer {
    file: FileRecord,
    text: String,
    tooling_dir: PathBuf,
    factory: Arc<RuntimeFactory>,
    now: i64,
    suppression: Rc<RefCell<SuppressionContext>>,
    offsets: Rc<RefCell<OffsetMap>>,
    includes: Rc<RefCell<Vec<(String, String)>>>,
    diagnostics: Vec<DiagnosticRecord>,
    outputs: Vec<VisitorOutput>,
    preprocessed: String,
}

impl ScriptAnalyzer {
    #[must_use]
    pub fn new(inputs: AnalyzerInputs) -> Self {
        Self {
            file: inputs.file,
            text: inputs.text,
            tooling_dir: inputs.tooling_dir,
            factory: inputs.factory,
            now: inputs.now,
            suppression: Rc::new(RefCell::new(SuppressionContext::new())),
            offsets: Rc::new(RefCell::new(OffsetMap::new())),
            includes: Rc::new(RefCell::new(Vec::new())),
            diagnostics: Vec::new(),
            outputs: Vec::new(),
            preprocessed: String::new(),
        }
    }
}

impl Analyzer for ScriptAnalyzer {
    fn analyze(&mut self, store: &Store) -> Result<(), AnalysisError> {
        if !self.factory.provider().exists(&self.file.path) {
            self.diagnostics.push(path_failure_diagnostic(&self.file));
            return Ok(());
        }

        let mut runtime = self.factory.create_runtime(
            Rc::clone(&self.suppression),
            Rc::clone(&self.offsets),
            Rc::clone(&self.includes),
        );

        let preprocessed = match runtime.preprocessor.preprocess(&self.text, &self.file.path) {
            Ok(preprocessed) => preprocessed,
            Err(error) => {
                self.diagnostics.push(preprocess_failure_diagnostic(store, &self.file, &error, self.now));
                return Ok(());
            }
        };
        self.preprocessed = preprocessed.text.clone();

        // Included files are sighted here; the include edges committed
        // later must point at existing rows.
        for (included, _) in self.includes.borrow().iter() {
            if let Err(error) = store.ensure_file(included, self.now) {
                tracing::warn!("Failed to index included file `{included}`: {error}");
            }
        }

        let root: Node = match parse_script(&preprocessed.text, &self.file.path, Some(&preprocessed.origins)) {
            Ok(root) => root,
            Err(error) => {
                let mut diagnostic = parse_failure_diagnostic(&self.file, &error);
                remap_through_macros(&mut diagnostic, &self.offsets.borrow());
                self.diagnostics.push(diagnostic);
                return Ok(());
            }
        };

        let offsets = self.offsets.borrow();
        let view = AnalyzerView::new(&self.file, &preprocessed.text, &offsets, store, &self.tooling_dir, self.now);

        let mut visitors: Vec<Box<dyn Visitor<Node>>> = vec![Box::new(SymbolVisitor::new())];
        if let Some(engine) = runtime.engine.take() {
            visitors.push(Box::new(ScriptedVisitor::new(engine, &self.file)));
        }

        drive(&root, &mut visitors, &view);

        self.outputs = visitors.iter_mut().map(|visitor| visitor.take_output()).collect();

        Ok(())
    }

    fn commit(&mut self, store: &mut Store) -> Result<(), AnalysisError> {
        let extra_hovers = macro_expansion_hovers(&self.file, &self.text, &self.preprocessed, &self.offsets.borrow());

        commit_analysis(
            store,
            &self.file,
            CommitInputs {
                outputs: std::mem::take(&mut self.outputs),
                analyzer_diagnostics: std::mem::take(&mut self.diagnostics),
                includes: std::mem::take(&mut *self.includes.borrow_mut()),
                extra_hovers,
                suppression: &self.suppression.borrow(),
            },
        )
    }
}

pub(crate) fn path_failure_diagnostic(file: &FileRecord) -> DiagnosticRecord {
    DiagnosticRecord {
        file_id: file.id,
        source_file_id: file.id,
        severity: Severity::Error,
        message: format!("Failed to get path info for file: {}", file.path),
        ..DiagnosticRecord::default()
    }
}

pub(crate) fn preprocess_failure_diagnostic(
    store: &Store,
    file: &FileRecord,
    error: &PreprocessError,
    now: i64,
) -> DiagnosticRecord {
    // The failure may sit in an included file rather than the analyzed one.
    let file_id = if error.path() == file.path {
        file.id
    } else {
        store.ensure_file(error.path(), now).map(|record| record.id).unwrap_or(file.id)
    };

    DiagnosticRecord {
        file_id,
        source_file_id: file.id,
        line: error.line(),
        severity: Severity::Error,
        message: error.to_string(),
        ..DiagnosticRecord::default()
    }
}

pub(crate) fn parse_failure_diagnostic(file: &FileRecord, error: &ParseError) -> DiagnosticRecord {
    let location = error.location();

    DiagnosticRecord {
        file_id: file.id,
        source_file_id: file.id,
        line: location.line,
        column: location.column,
        offset: location.offset,
        length: 1,
        severity: Severity::Error,
        message: error.to_string(),
        ..DiagnosticRecord::default()
    }
}

/// Hovers for macro invocations in the analyzed file: the raw invocation
/// and its expansion, both rendered as code blocks.
pub(crate) fn macro_expansion_hovers(
    file: &FileRecord,
    raw_text: &str,
    preprocessed_text: &str,
    offsets: &OffsetMap,
) -> Vec<HoverRecord> {
    offsets
        .expansions_in(&file.path)
        .filter_map(|expansion| {
            let raw = raw_text.get(expansion.raw_start.offset as usize..expansion.raw_end.offset as usize)?;
            let expanded = preprocessed_text
                .get(expansion.preprocessed_start as usize..expansion.preprocessed_end as usize)?;

            Some(HoverRecord {
                id: 0,
                file_id: file.id,
                start_line: expansion.raw_start.line,
                start_column: expansion.raw_start.column,
                end_line: expansion.raw_end.line,
                end_column: expansion.raw_end.column,
                markdown: format!("```sqf\n{raw}\n```\n\n---\n\n```sqf\n{expanded}\n```"),
            })
        })
        .collect()
}

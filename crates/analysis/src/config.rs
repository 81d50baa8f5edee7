//! The configuration analyzer.
//!
//! Lighter sibling of the script analyzer for `config.cpp` and
//! `description.ext`: it runs the same preprocessing (so include edges and
//! suppression pragmas behave identically), parses the key-value format,
//! and mostly produces hover spans for classes and properties.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::HoverRecord;
use sqfls_syntax::ConfigNode;
use sqfls_syntax::ConfigNodeKind;
use sqfls_syntax::parse_config;

use crate::commit::CommitInputs;
use crate::commit::commit_analysis;
use crate::dispatch::Analyzer;
use crate::dispatch::AnalyzerInputs;
use crate::error::AnalysisError;
use crate::offset_map::OffsetMap;
use crate::runtime::RuntimeFactory;
use crate::runtime::remap_through_macros;
use crate::script::macro_expansion_hovers;
use crate::script::parse_failure_diagnostic;
use crate::script::path_failure_diagnostic;
use crate::script::preprocess_failure_diagnostic;
use crate::suppression::SuppressionContext;
use crate::visitor::AnalyzerView;
use crate::visitor::Visitor;
use crate::visitor::VisitorOutput;
use crate::visitor::drive;

pub struct ConfigAnalyzer {
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

impl ConfigAnalyzer {
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

impl Analyzer for ConfigAnalyzer {
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

        for (included, _) in self.includes.borrow().iter() {
            if let Err(error) = store.ensure_file(included, self.now) {
                tracing::warn!("Failed to index included file `{included}`: {error}");
            }
        }

        let root = match parse_config(&preprocessed.text, &self.file.path, Some(&preprocessed.origins)) {
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

        let mut visitors: Vec<Box<dyn Visitor<ConfigNode>>> = vec![Box::new(ConfigVisitor::default())];
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

/// Walks the configuration tree producing hover spans: the class breadcrumb
/// for class definitions and the rendered value for properties.
#[derive(Debug, Default)]
struct ConfigVisitor {
    class_stack: Vec<String>,
    hovers: Vec<HoverRecord>,
}

impl ConfigVisitor {
    fn hover_for(&self, view: &AnalyzerView<'_>, node: &ConfigNode, markdown: String) -> HoverRecord {
        let token = &node.token;

        HoverRecord {
            id: 0,
            file_id: view.file_id_of(&token.path),
            start_line: token.location.line,
            start_column: token.location.column,
            end_line: token.location.line,
            end_column: token.location.column + token.contents.len() as u32,
            markdown,
        }
    }

    fn breadcrumb(&self, name: &str) -> String {
        let mut path: Vec<&str> = self.class_stack.iter().map(String::as_str).collect();
        path.push(name);

        format!("```cpp\nclass {}\n```", path.join(" » "))
    }
}

impl Visitor<ConfigNode> for ConfigVisitor {
    fn start(&mut self, _view: &AnalyzerView<'_>) {}

    fn enter(&mut self, view: &AnalyzerView<'_>, node: &ConfigNode, _parents: &[&ConfigNode]) {
        match node.kind {
            ConfigNodeKind::Class | ConfigNodeKind::ClassDeclaration => {
                let markdown = self.breadcrumb(&node.token.contents);
                let hover = self.hover_for(view, node, markdown);
                self.hovers.push(hover);

                if node.kind == ConfigNodeKind::Class {
                    self.class_stack.push(node.token.contents.clone());
                }
            }
            ConfigNodeKind::Property => {
                let value =
                    node.children.first().map(|child| child.token.contents.clone()).unwrap_or_default();
                let markdown = format!("```cpp\n{} = {};\n```", node.token.contents, value);
                let hover = self.hover_for(view, node, markdown);
                self.hovers.push(hover);
            }
            ConfigNodeKind::ArrayProperty => {
                let values: Vec<String> =
                    node.children.iter().map(|child| child.token.contents.clone()).collect();
                let markdown = format!("```cpp\n{}[] = {{{}}};\n```", node.token.contents, values.join(", "));
                let hover = self.hover_for(view, node, markdown);
                self.hovers.push(hover);
            }
            _ => {}
        }
    }

    fn exit(&mut self, _view: &AnalyzerView<'_>, node: &ConfigNode, _parents: &[&ConfigNode]) {
        if node.kind == ConfigNodeKind::Class {
            self.class_stack.pop();
        }
    }

    fn end(&mut self, _view: &AnalyzerView<'_>) {}

    fn take_output(&mut self) -> VisitorOutput {
        VisitorOutput { hovers: std::mem::take(&mut self.hovers), ..VisitorOutput::default() }
    }
}

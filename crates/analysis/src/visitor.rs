//! The AST visitor framework.
//!
//! A depth-first walk delivers `enter`/`exit` callbacks with a live parent
//! stack to every registered visitor. Visitors accumulate their results in
//! a [`VisitorOutput`] that the commit coordinator merges into the store;
//! they talk to the rest of the analyzer only through the narrow
//! [`AnalyzerView`] capability.

use std::cell::RefCell;
use std::path::Path;

use foldhash::HashMap;
use foldhash::HashMapExt;

use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::model::CodeActionChangeRecord;
use sqfls_database::model::CodeActionRecord;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::HoverRecord;
use sqfls_database::model::ReferenceRecord;
use sqfls_database::model::VariableRecord;
use sqfls_syntax::ConfigNode;
use sqfls_syntax::Node;

use crate::offset_map::DecodedOffset;
use crate::offset_map::OffsetMap;

/// Everything one visitor produced for one analysis.
#[derive(Debug, Default)]
pub struct VisitorOutput {
    /// Variables keyed by local id (index + 1); the commit coordinator
    /// rewrites them onto store rows.
    pub variables: Vec<VariableRecord>,
    /// References whose `variable_id` is a local variable id.
    pub references: Vec<ReferenceRecord>,
    pub diagnostics: Vec<DiagnosticRecord>,
    pub hovers: Vec<HoverRecord>,
    pub code_actions: Vec<(CodeActionRecord, Vec<CodeActionChangeRecord>)>,
}

/// Trees the framework can walk.
pub trait TreeNode: Sized {
    fn child_nodes(&self) -> &[Self];
}

impl TreeNode for Node {
    fn child_nodes(&self) -> &[Self] {
        &self.children
    }
}

impl TreeNode for ConfigNode {
    fn child_nodes(&self) -> &[Self] {
        &self.children
    }
}

/// A visitor over a tree of `N`.
pub trait Visitor<N: TreeNode> {
    fn start(&mut self, view: &AnalyzerView<'_>);

    fn enter(&mut self, view: &AnalyzerView<'_>, node: &N, parents: &[&N]);

    fn exit(&mut self, view: &AnalyzerView<'_>, node: &N, parents: &[&N]);

    fn end(&mut self, view: &AnalyzerView<'_>);

    /// Post-pass over the visitor's own results, after traversal.
    fn analyze(&mut self, _view: &AnalyzerView<'_>) {}

    fn take_output(&mut self) -> VisitorOutput;
}

/// Runs the full visitor sequence over a tree: `start`, the depth-first
/// walk, `end`, then the `analyze` post-pass.
pub fn drive<N: TreeNode>(root: &N, visitors: &mut [Box<dyn Visitor<N>>], view: &AnalyzerView<'_>) {
    for visitor in visitors.iter_mut() {
        visitor.start(view);
    }

    let mut parents: Vec<&N> = Vec::new();
    recurse(root, &mut parents, visitors, view);

    for visitor in visitors.iter_mut() {
        visitor.end(view);
    }
    for visitor in visitors.iter_mut() {
        visitor.analyze(view);
    }
}

fn recurse<'a, N: TreeNode>(
    node: &'a N,
    parents: &mut Vec<&'a N>,
    visitors: &mut [Box<dyn Visitor<N>>],
    view: &AnalyzerView<'_>,
) {
    for visitor in visitors.iter_mut() {
        visitor.enter(view, node, parents);
    }

    parents.push(node);
    for child in node.child_nodes() {
        recurse(child, parents, visitors, view);
    }
    parents.pop();

    for visitor in visitors.iter_mut() {
        visitor.exit(view, node, parents);
    }
}

/// The narrow capability visitors get: the file under analysis, the
/// preprocessed text, offset-map queries, the scope-tag prefix, file-id
/// lookup for included files, and the tooling directory.
pub struct AnalyzerView<'a> {
    pub file: &'a FileRecord,
    pub preprocessed_text: &'a str,
    pub offsets: &'a OffsetMap,
    pub tooling_dir: &'a Path,
    store: &'a Store,
    now: i64,
    scope_name: String,
    file_ids: RefCell<HashMap<String, i64>>,
}

impl<'a> AnalyzerView<'a> {
    #[must_use]
    pub fn new(
        file: &'a FileRecord,
        preprocessed_text: &'a str,
        offsets: &'a OffsetMap,
        store: &'a Store,
        tooling_dir: &'a Path,
        now: i64,
    ) -> Self {
        let scope_name = format!("scope@{}://", file.id);

        Self { file, preprocessed_text, offsets, tooling_dir, store, now, scope_name, file_ids: RefCell::new(HashMap::new()) }
    }

    /// The scope-tag prefix of the file under analysis.
    #[must_use]
    pub fn scope_name(&self) -> &str {
        &self.scope_name
    }

    /// The file id a token path belongs to. Paths other than the analyzed
    /// file's (tokens spliced in from includes) are resolved through the
    /// store, creating the file row on first sight.
    #[must_use]
    pub fn file_id_of(&self, path: &str) -> i64 {
        if path.is_empty() || path == self.file.path {
            return self.file.id;
        }

        if let Some(cached) = self.file_ids.borrow().get(path) {
            return *cached;
        }

        let id = match self.store.ensure_file(path, self.now) {
            Ok(record) => record.id,
            Err(error) => {
                tracing::warn!("Failed to resolve file id for `{path}`: {error}");
                self.file.id
            }
        };
        self.file_ids.borrow_mut().insert(path.to_string(), id);

        id
    }

    #[must_use]
    pub fn is_in_macro(&self, offset: u32) -> bool {
        self.offsets.is_in_macro(offset)
    }

    #[must_use]
    pub fn decode_offset(&self, offset: u32) -> Option<DecodedOffset> {
        self.offsets.decode(offset)
    }
}

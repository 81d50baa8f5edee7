//! The runtime factory.
//!
//! Per analysis, the factory wires up a preprocessor carrying the current
//! path mappings, the `sls` suppression pragma, and the two observation
//! points (macro expansions into the offset map, includes into the edge
//! list), plus an optional scripted-extension engine. The factory itself is
//! long-lived; its mapping table is read by every runtime and mutated only
//! while the workspace mutex is held.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::Mutex;

use sqfls_database::model::DiagnosticRecord;
use sqfls_preprocessor::FileProvider;
use sqfls_preprocessor::PathMapping;
use sqfls_preprocessor::Preprocessor;

use crate::offset_map::OffsetMap;
use crate::scripted::ScriptEngine;
use crate::suppression::SuppressionContext;

/// Builds a scripted-extension engine per analysis.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn ScriptEngine> + Send + Sync>;

/// A per-analysis runtime: the wired preprocessor and the optional
/// scripted-extension engine.
pub struct Runtime {
    pub preprocessor: Preprocessor,
    pub engine: Option<Box<dyn ScriptEngine>>,
}

/// Long-lived factory for per-analysis runtimes.
pub struct RuntimeFactory {
    provider: Arc<dyn FileProvider>,
    mappings: Mutex<Vec<PathMapping>>,
    engine_factory: Option<EngineFactory>,
}

impl RuntimeFactory {
    #[must_use]
    pub fn new(provider: Arc<dyn FileProvider>) -> Self {
        Self { provider, mappings: Mutex::new(Vec::new()), engine_factory: None }
    }

    #[must_use]
    pub fn with_engine_factory(mut self, factory: EngineFactory) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn provider(&self) -> Arc<dyn FileProvider> {
        Arc::clone(&self.provider)
    }

    #[must_use]
    pub fn mappings(&self) -> Vec<PathMapping> {
        self.mappings.lock().map(|mappings| mappings.clone()).unwrap_or_default()
    }

    /// Replaces the workspace-configured mappings, preserving the ones
    /// learned from path-prefix marker files.
    pub fn set_workspace_mappings(&self, pairs: &[(String, String)]) {
        if let Ok(mut mappings) = self.mappings.lock() {
            mappings.retain(|mapping| !mapping.workspace);
            mappings.extend(pairs.iter().map(|(physical, prefix)| PathMapping::new(physical, prefix, true)));
        }
    }

    /// Adds or updates the mapping derived from a path-prefix marker file.
    pub fn upsert_marker_mapping(&self, physical: &str, prefix: &str) {
        if let Ok(mut mappings) = self.mappings.lock() {
            let mapping = PathMapping::new(physical, prefix, false);
            if let Some(existing) =
                mappings.iter_mut().find(|existing| !existing.workspace && existing.physical == mapping.physical)
            {
                existing.virtual_prefix = mapping.virtual_prefix;
            } else {
                mappings.push(mapping);
            }
        }
    }

    /// Drops the mapping derived from a removed marker file.
    pub fn remove_marker_mapping(&self, physical: &str) {
        if let Ok(mut mappings) = self.mappings.lock() {
            let physical = sqfls_preprocessor::mappings::normalize_physical(physical);
            mappings.retain(|mapping| mapping.workspace || mapping.physical != physical);
        }
    }

    /// Builds a runtime around a fresh suppression context and offset map.
    #[must_use]
    pub fn create_runtime(
        &self,
        suppression: Rc<RefCell<SuppressionContext>>,
        offsets: Rc<RefCell<OffsetMap>>,
        includes: Rc<RefCell<Vec<(String, String)>>>,
    ) -> Runtime {
        let mut preprocessor = Preprocessor::new(self.provider(), self.mappings());

        preprocessor.register_pragma("sls", move |context| {
            dispatch_sls_pragma(&suppression, context.path, context.line, context.data);
        });

        let expansion_sink = Rc::clone(&offsets);
        preprocessor.on_macro_expansion(move |expansion| {
            expansion_sink.borrow_mut().record(expansion);
        });

        let include_sink = Rc::clone(&includes);
        preprocessor.on_file_included(move |included, including| {
            include_sink.borrow_mut().push((included.to_string(), including.to_string()));
        });

        let engine = self.engine_factory.as_ref().map(|factory| factory());

        Runtime { preprocessor, engine }
    }
}

/// Applies one `sls` pragma to the suppression context.
///
/// Recognized forms: `enable <code>`, `disable <code>`,
/// `disable line <code>`, `disable file <code>`.
fn dispatch_sls_pragma(suppression: &Rc<RefCell<SuppressionContext>>, path: &str, line: u32, data: &str) {
    let arguments: Vec<&str> = data.split_whitespace().collect();
    if arguments.len() < 2 {
        return;
    }

    let command = arguments[0];
    let code = arguments[arguments.len() - 1];
    let mut suppression = suppression.borrow_mut();

    match command {
        "enable" => suppression.push_enable(path, line, code),
        "disable" if arguments.len() < 3 => suppression.push_disable(path, line, code),
        "disable" if arguments[1] == "line" => suppression.push_disable_line(path, line, code),
        "disable" if arguments[1] == "file" => suppression.push_disable_file(code),
        _ => {
            tracing::trace!("Ignoring unrecognized sls pragma `{data}` in {path}:{line}");
        }
    }
}

/// Rewrites a diagnostic's position from preprocessed to raw coordinates
/// when the offset map knows the offset.
pub fn remap_through_macros(diagnostic: &mut DiagnosticRecord, offsets: &OffsetMap) {
    if let Some(decoded) = offsets.decode(diagnostic.offset) {
        diagnostic.line = decoded.raw.line;
        diagnostic.column = decoded.raw.column;
        diagnostic.offset = decoded.raw.offset;
        diagnostic.length = decoded.length;
    }
}

#[cfg(test)]
mod tests {
    use sqfls_preprocessor::MemoryFileProvider;

    use super::*;

    fn factory() -> RuntimeFactory {
        RuntimeFactory::new(Arc::new(MemoryFileProvider::new()))
    }

    #[test]
    fn sls_pragma_feeds_the_suppression_context() {
        let factory = factory();
        let suppression = Rc::new(RefCell::new(SuppressionContext::new()));
        let offsets = Rc::new(RefCell::new(OffsetMap::new()));
        let includes = Rc::new(RefCell::new(Vec::new()));

        let mut runtime = factory.create_runtime(Rc::clone(&suppression), offsets, includes);
        let text = "#pragma sls disable VV-001\nprivate _x = 1;\n";
        runtime.preprocessor.preprocess(text, "a.sqf").unwrap();

        assert!(!suppression.borrow().can_report("VV-001", "a.sqf", 2));
        assert!(suppression.borrow().can_report("VV-002", "a.sqf", 2));
    }

    #[test]
    fn workspace_mappings_replace_only_workspace_entries() {
        let factory = factory();
        factory.upsert_marker_mapping("/ws/addons/main", "\\x\\main");
        factory.set_workspace_mappings(&[("/ws/lib".to_string(), "\\lib".to_string())]);
        factory.set_workspace_mappings(&[("/ws/other".to_string(), "\\other".to_string())]);

        let mappings = factory.mappings();
        assert_eq!(mappings.len(), 2);
        assert!(mappings.iter().any(|mapping| !mapping.workspace && mapping.physical == "/ws/addons/main"));
        assert!(mappings.iter().any(|mapping| mapping.workspace && mapping.physical == "/ws/other"));
    }

    #[test]
    fn marker_mappings_update_in_place() {
        let factory = factory();
        factory.upsert_marker_mapping("/ws/addons/main", "\\x\\main");
        factory.upsert_marker_mapping("/ws/addons/main", "\\z\\renamed");

        let mappings = factory.mappings();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].virtual_prefix, "\\z\\renamed");

        factory.remove_marker_mapping("/ws/addons/main");
        assert!(factory.mappings().is_empty());
    }
}

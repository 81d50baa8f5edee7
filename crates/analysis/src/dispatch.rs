//! Analyzer dispatch.
//!
//! Maps file extensions to analyzer constructors and exposes the uniform
//! `analyze` / `commit` pair. The configuration analyzer is additionally
//! restricted to the two canonical filenames.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use sqfls_database::Store;
use sqfls_database::model::FileRecord;

use crate::config::ConfigAnalyzer;
use crate::error::AnalysisError;
use crate::runtime::RuntimeFactory;
use crate::script::ScriptAnalyzer;

/// One file's analysis: gather results, then commit them atomically.
pub trait Analyzer {
    fn analyze(&mut self, store: &Store) -> Result<(), AnalysisError>;

    fn commit(&mut self, store: &mut Store) -> Result<(), AnalysisError>;
}

/// Everything an analyzer constructor needs.
pub struct AnalyzerInputs {
    pub file: FileRecord,
    pub text: String,
    pub tooling_dir: PathBuf,
    pub factory: Arc<RuntimeFactory>,
    /// Timestamp (Unix milliseconds) attached to rows created during this
    /// analysis.
    pub now: i64,
}

type Constructor = Box<dyn Fn(AnalyzerInputs) -> Box<dyn Analyzer> + Send + Sync>;

struct Registration {
    extension: &'static str,
    /// When set, only these (case-insensitive) filenames are analyzed.
    filenames: Option<&'static [&'static str]>,
    constructor: Constructor,
}

/// Extension-to-constructor registry.
pub struct AnalyzerRegistry {
    registrations: Vec<Registration>,
}

impl AnalyzerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { registrations: Vec::new() }
    }

    /// The built-in set: the script analyzer for `.sqf`, the configuration
    /// analyzer for `config.cpp` and `description.ext`.
    #[must_use]
    pub fn with_builtin_analyzers() -> Self {
        let mut registry = Self::new();

        registry.register("sqf", None, |inputs| Box::new(ScriptAnalyzer::new(inputs)));
        registry.register("cpp", Some(&["config.cpp", "description.ext"]), |inputs| {
            Box::new(ConfigAnalyzer::new(inputs))
        });
        registry.register("ext", Some(&["config.cpp", "description.ext"]), |inputs| {
            Box::new(ConfigAnalyzer::new(inputs))
        });

        registry
    }

    pub fn register(
        &mut self,
        extension: &'static str,
        filenames: Option<&'static [&'static str]>,
        constructor: impl Fn(AnalyzerInputs) -> Box<dyn Analyzer> + Send + Sync + 'static,
    ) {
        self.registrations.push(Registration { extension, filenames, constructor: Box::new(constructor) });
    }

    /// Whether the path's extension has a registered analyzer. Used by the
    /// scan to decide which files to index.
    #[must_use]
    pub fn supports(&self, path: &str) -> bool {
        let Some(extension) = extension_of(path) else {
            return false;
        };

        self.registrations.iter().any(|registration| registration.extension.eq_ignore_ascii_case(&extension))
    }

    /// Builds the analyzer for a file, honoring the filename filter.
    #[must_use]
    pub fn create(&self, inputs: AnalyzerInputs) -> Option<Box<dyn Analyzer>> {
        let extension = extension_of(&inputs.file.path)?;
        let filename = filename_of(&inputs.file.path);

        let registration = self.registrations.iter().find(|registration| {
            registration.extension.eq_ignore_ascii_case(&extension)
                && registration
                    .filenames
                    .is_none_or(|names| names.iter().any(|name| name.eq_ignore_ascii_case(&filename)))
        })?;

        Some((registration.constructor)(inputs))
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::with_builtin_analyzers()
    }
}

fn extension_of(path: &str) -> Option<String> {
    Path::new(path).extension().map(|extension| extension.to_string_lossy().to_string())
}

fn filename_of(path: &str) -> String {
    Path::new(path).file_name().map(|name| name.to_string_lossy().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use sqfls_preprocessor::MemoryFileProvider;

    use super::*;

    fn inputs(path: &str) -> AnalyzerInputs {
        AnalyzerInputs {
            file: FileRecord { id: 1, path: path.to_string(), ..FileRecord::default() },
            text: String::new(),
            tooling_dir: PathBuf::from("/ws/.vscode/sqfvm-lsp"),
            factory: Arc::new(RuntimeFactory::new(Arc::new(MemoryFileProvider::new()))),
            now: 0,
        }
    }

    #[test]
    fn script_extension_is_supported() {
        let registry = AnalyzerRegistry::with_builtin_analyzers();

        assert!(registry.supports("scripts/init.sqf"));
        assert!(registry.supports("config.cpp"));
        assert!(!registry.supports("readme.md"));
        assert!(!registry.supports("no_extension"));
    }

    #[test]
    fn config_analyzer_only_accepts_canonical_filenames() {
        let registry = AnalyzerRegistry::with_builtin_analyzers();

        assert!(registry.create(inputs("addons/main/config.cpp")).is_some());
        assert!(registry.create(inputs("Description.EXT")).is_some());
        assert!(registry.create(inputs("addons/main/functions.cpp")).is_none());
    }

    #[test]
    fn script_analyzer_accepts_any_filename() {
        let registry = AnalyzerRegistry::with_builtin_analyzers();

        assert!(registry.create(inputs("deep/nested/fn_doThing.sqf")).is_some());
    }
}

//! The workspace orchestrator.
//!
//! Owns the lifecycle of a workspace: bootstrapping the tooling directory,
//! the initial scan, the file-system watch loop, staleness propagation
//! across include edges and shared globals, the analysis drain behind the
//! workspace-wide mutex, diagnostic publishing, and the editor-facing
//! queries. The wire protocol is the collaborator — this crate consumes
//! paths and positions and produces `lsp-types` values.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use foldhash::HashSet;
use foldhash::HashSetExt;
use lsp_types::CodeActionOrCommand;
use lsp_types::Hover;
use lsp_types::InlayHint;
use lsp_types::Location;
use lsp_types::Position;
use lsp_types::PublishDiagnosticsParams;
use lsp_types::Range;
use lsp_types::ServerCapabilities;
use rayon::prelude::*;
use walkdir::WalkDir;

use sqfls_analysis::AnalyzerInputs;
use sqfls_analysis::AnalyzerRegistry;
use sqfls_analysis::RuntimeFactory;
use sqfls_database::Store;
use sqfls_database::StoreAccess;
use sqfls_database::model::DiagnosticRecord;
use sqfls_database::model::FileRecord;
use sqfls_database::model::Severity;
use sqfls_preprocessor::DiskFileProvider;

pub mod config;
pub mod error;
pub mod ignore;
pub mod queries;
pub mod watcher;

pub use config::path_mappings_from_settings;
pub use error::WorkspaceError;
pub use ignore::IgnoreList;
pub use watcher::WorkspaceEvent;
pub use watcher::WorkspaceWatcher;

/// Tooling directory, relative to the workspace root.
pub const TOOLING_DIR: &[&str] = &[".vscode", "sqfvm-lsp"];

/// The store's file name inside the tooling directory.
pub const DATABASE_FILE: &str = "sqlite3.db";

/// Base name of a path-prefix marker file. Its contents declare the virtual
/// prefix its directory maps to; any change to one invalidates the whole
/// workspace.
pub const MARKER_FILE_NAME: &str = "$PBOPREFIX$";

const GITIGNORE_TEMPLATE: &str = ".gitignore\nsqlite3.db\nsqlite3.db-journal\nsqlite3.db-wal\nsqlite3.db-shm\n";

type Publisher = Arc<dyn Fn(PublishDiagnosticsParams) + Send + Sync>;

struct EngineState {
    store: Store,
    ignore: IgnoreList,
}

/// The long-lived engine for one workspace.
///
/// Analysis and commits are serialized behind the internal mutex; editor
/// queries run on their own store connection and only observe committed
/// state.
pub struct WorkspaceEngine {
    root: PathBuf,
    tooling_dir: PathBuf,
    db_path: PathBuf,
    factory: Arc<RuntimeFactory>,
    registry: AnalyzerRegistry,
    state: Mutex<EngineState>,
    publisher: Option<Publisher>,
}

impl WorkspaceEngine {
    /// Bootstraps the tooling directory and opens the store. The initial
    /// scan is a separate step ([`Self::initialize`]) so a publisher can be
    /// attached first.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(WorkspaceError::InvalidWorkspacePath(root.to_path_buf()));
        }
        let root = root.canonicalize().map_err(|_| WorkspaceError::InvalidWorkspacePath(root.to_path_buf()))?;

        let mut tooling_dir = root.clone();
        for part in TOOLING_DIR {
            tooling_dir.push(part);
        }
        std::fs::create_dir_all(&tooling_dir)
            .map_err(|error| WorkspaceError::CreateToolingDirectory(tooling_dir.clone(), error))?;

        let gitignore = tooling_dir.join(".gitignore");
        if !gitignore.exists() {
            std::fs::write(&gitignore, GITIGNORE_TEMPLATE)
                .map_err(|error| WorkspaceError::WriteToolingFile(gitignore.clone(), error))?;
        }

        let db_path = tooling_dir.join(DATABASE_FILE);
        let (store, report) = Store::open(&db_path)?;
        tracing::info!("{report}");

        let ignore = match IgnoreList::load_or_create(&root, &tooling_dir) {
            Ok(ignore) => ignore,
            Err(error) => {
                tracing::warn!("Failed to load the ignore list: {error}; continuing without one");
                IgnoreList::default()
            }
        };

        Ok(Self {
            root,
            tooling_dir,
            db_path,
            factory: Arc::new(RuntimeFactory::new(Arc::new(DiskFileProvider))),
            registry: AnalyzerRegistry::with_builtin_analyzers(),
            state: Mutex::new(EngineState { store, ignore }),
            publisher: None,
        })
    }

    pub fn set_publisher(&mut self, publisher: impl Fn(PublishDiagnosticsParams) + Send + Sync + 'static) {
        self.publisher = Some(Arc::new(publisher));
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn tooling_dir(&self) -> &Path {
        &self.tooling_dir
    }

    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        queries::capabilities()
    }

    /// Initial scan: index every analyzable file, register path-prefix
    /// markers, purge files that disappeared since the last run, then
    /// analyze everything outdated.
    pub fn initialize(&self) -> Result<(), WorkspaceError> {
        let published = {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

            self.scan(&mut state)?;

            // Files the store remembers but the disk no longer has are
            // flagged, then removed in bulk.
            for mut file in state.store.files_under_path("")? {
                if !file.is_deleted && !Path::new(&file.path).exists() {
                    file.is_deleted = true;
                    state.store.update_file(&file)?;
                }
            }
            let purged = state.store.purge_deleted_files()?;
            if purged > 0 {
                tracing::info!("Purged {purged} deleted file(s) from the store");
            }

            self.drain_outdated(&mut state)
        };
        self.publish_all(published);

        Ok(())
    }

    fn scan(&self, state: &mut EngineState) -> Result<(), WorkspaceError> {
        let mut to_index: Vec<(String, i64)> = Vec::new();

        let ignore = state.ignore.clone();
        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| entry.path() == self.root || !ignore.is_ignored(entry.path()));
        for entry in walker.filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();

            if path.file_name().is_some_and(|name| name.to_string_lossy() == MARKER_FILE_NAME) {
                self.register_marker(path);
                continue;
            }

            let normalized = normalize_path(path);
            if self.registry.supports(&normalized) {
                to_index.push((normalized, modified_ms(path)));
            }
        }

        // Decide which files need their content re-read, then read those in
        // parallel; the single-threaded analysis pass comes later.
        let mut to_read: Vec<(i64, String, i64)> = Vec::new();
        for (path, mtime) in &to_index {
            let mut file = state.store.ensure_file(path, *mtime)?;
            let latest = state.store.latest_file_history(file.id)?;

            let changed = latest.as_ref().is_none_or(|history| history.created_at < *mtime);
            if changed {
                to_read.push((file.id, path.clone(), *mtime));
                if !file.is_outdated || file.is_deleted || file.last_changed != *mtime {
                    file.is_outdated = true;
                    file.is_deleted = false;
                    file.last_changed = *mtime;
                    state.store.update_file(&file)?;
                }
            } else if file.is_deleted {
                file.is_deleted = false;
                file.is_outdated = true;
                state.store.update_file(&file)?;
            }
        }

        let contents: Vec<(i64, i64, std::io::Result<String>)> = to_read
            .par_iter()
            .map(|(file_id, path, mtime)| (*file_id, *mtime, std::fs::read_to_string(path)))
            .collect();

        for (file_id, mtime, result) in contents {
            match result {
                Ok(text) => state.store.push_file_history(file_id, &text, mtime, true)?,
                Err(error) => tracing::warn!("Failed to read file {file_id} during scan: {error}"),
            }
        }

        tracing::info!("Workspace scan indexed {} file(s)", to_index.len());

        Ok(())
    }

    fn register_marker(&self, path: &Path) {
        let Some(parent) = path.parent() else {
            return;
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let prefix = contents.trim();
                if prefix.is_empty() {
                    tracing::warn!("Ignoring empty path-prefix marker `{}`", path.display());
                    return;
                }
                self.factory.upsert_marker_mapping(&normalize_path(parent), prefix);
            }
            Err(error) => {
                tracing::error!("Failed to read path-prefix marker `{}`: {error}", path.display());
            }
        }
    }

    /// Applies one file-system event, then drains the outdated set.
    pub fn handle_event(&self, event: WorkspaceEvent) {
        let vscode = self.root.join(".vscode");
        let path_of = |event: &WorkspaceEvent| match event {
            WorkspaceEvent::Created(path)
            | WorkspaceEvent::CreatedDirectory(path)
            | WorkspaceEvent::Removed(path)
            | WorkspaceEvent::RemovedDirectory(path)
            | WorkspaceEvent::Modified(path) => path.clone(),
        };
        let path = path_of(&event);
        if path.starts_with(&vscode) {
            return;
        }

        let published = {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if state.ignore.is_ignored(&path) {
                return;
            }

            let result = self.apply_event(&mut state, event);
            if let Err(error) = result {
                tracing::error!("Failed to apply file-system event for `{}`: {error}", path.display());
            }

            self.drain_outdated(&mut state)
        };
        self.publish_all(published);
    }

    fn apply_event(&self, state: &mut EngineState, event: WorkspaceEvent) -> Result<(), WorkspaceError> {
        match event {
            WorkspaceEvent::CreatedDirectory(path) => {
                for entry in WalkDir::new(&path).into_iter().filter_map(Result::ok) {
                    if entry.file_type().is_file() {
                        let normalized = normalize_path(entry.path());
                        if self.registry.supports(&normalized) {
                            let file = state.store.ensure_file(&normalized, modified_ms(entry.path()))?;
                            state.store.set_file_outdated(file.id)?;
                        }
                    }
                }
            }
            WorkspaceEvent::Created(path) => {
                if is_marker(&path) {
                    self.register_marker(&path);
                    state.store.mark_all_files_outdated()?;
                } else if self.registry.supports(&normalize_path(&path)) {
                    let file = state.store.ensure_file(&normalize_path(&path), modified_ms(&path))?;
                    state.store.set_file_outdated(file.id)?;
                }
            }
            WorkspaceEvent::RemovedDirectory(path) => {
                let prefix = format!("{}/", normalize_path(&path));
                for file in state.store.files_under_path(&prefix)? {
                    self.delete_file(state, file)?;
                }
            }
            WorkspaceEvent::Removed(path) => {
                if is_marker(&path) {
                    self.factory.remove_marker_mapping(&normalize_path(path.parent().unwrap_or(&path)));
                    state.store.mark_all_files_outdated()?;
                } else if let Some(file) = state.store.file_by_path(&normalize_path(&path))? {
                    self.delete_file(state, file)?;
                } else {
                    // Some platforms do not distinguish removed directories.
                    let prefix = format!("{}/", normalize_path(&path));
                    for file in state.store.files_under_path(&prefix)? {
                        self.delete_file(state, file)?;
                    }
                }
            }
            WorkspaceEvent::Modified(path) => {
                if is_marker(&path) {
                    self.register_marker(&path);
                    state.store.mark_all_files_outdated()?;
                } else {
                    let normalized = normalize_path(&path);
                    if self.registry.supports(&normalized) || state.store.file_by_path(&normalized)?.is_some() {
                        let file = state.store.ensure_file(&normalized, modified_ms(&path))?;
                        state.store.set_file_outdated(file.id)?;
                        self.mark_related_files_outdated(state, &file)?;
                    }
                }
            }
        }

        Ok(())
    }

    /// The editor delivered new content for a document (didOpen, didChange,
    /// or save-with-text).
    pub fn document_changed(&self, path: &Path, text: &str) {
        let published = {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let normalized = normalize_path(path);
            let now = now_ms();

            let result = (|| -> Result<(), WorkspaceError> {
                let file = state.store.ensure_file(&normalized, now)?;
                state.store.push_file_history(file.id, text, now, false)?;
                state.store.set_file_outdated(file.id)?;
                self.mark_related_files_outdated(&mut state, &file)?;
                Ok(())
            })();
            if let Err(error) = result {
                tracing::error!("Failed to record document change for `{normalized}`: {error}");
            }

            self.drain_outdated(&mut state)
        };
        self.publish_all(published);
    }

    /// `workspace/didChangeConfiguration`: replaces workspace path
    /// mappings, preserving marker-derived ones, and re-analyzes.
    pub fn update_configuration(&self, settings: &serde_json::Value) {
        let mappings = path_mappings_from_settings(settings);
        let pairs: Vec<(String, String)> =
            mappings.into_iter().map(|mapping| (mapping.physical, mapping.virtual_prefix)).collect();
        self.factory.set_workspace_mappings(&pairs);

        let published = {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Err(error) = state.store.mark_all_files_outdated() {
                tracing::error!("Failed to invalidate the workspace: {error}");
            }

            self.drain_outdated(&mut state)
        };
        self.publish_all(published);
    }

    /// Marks every file depending on this one as outdated: transitive
    /// includers, plus files referencing a global whose analysis this file
    /// produced.
    fn mark_related_files_outdated(&self, state: &mut EngineState, file: &FileRecord) -> Result<(), WorkspaceError> {
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(file.id);

        let mut queue = state.store.includers_of(file.id)?;
        while let Some(includer) = queue.pop() {
            if !visited.insert(includer) {
                continue;
            }
            state.store.set_file_outdated(includer)?;
            queue.extend(state.store.includers_of(includer)?);
        }

        for variable in state.store.global_variables_sourced_from(file.id)? {
            for other in state.store.files_referencing_variable(variable.id, file.id)? {
                state.store.set_file_outdated(other)?;
            }
        }

        Ok(())
    }

    fn delete_file(&self, state: &mut EngineState, mut file: FileRecord) -> Result<(), WorkspaceError> {
        self.mark_related_files_outdated(state, &file)?;

        file.is_deleted = true;
        state.store.update_file(&file)?;
        state.store.delete_file_owned_rows(file.id)?;

        // An empty publish clears the editor's markers for the file.
        if let Some(publisher) = &self.publisher {
            if let (Some(params), _) = queries::publish_params(&state.store, &file) {
                publisher(params);
            }
        }

        Ok(())
    }

    /// Analyzes every outdated, non-deleted file. Returns the diagnostic
    /// payloads to publish once the lock is released.
    fn drain_outdated(&self, state: &mut EngineState) -> Vec<PublishDiagnosticsParams> {
        let mut published = Vec::new();

        // An analysis can surface new files (freshly observed includes), so
        // drain until the outdated set stays empty.
        for _ in 0..16 {
            let outdated = match state.store.files_outdated_and_not_deleted() {
                Ok(outdated) => outdated,
                Err(error) => {
                    tracing::error!("Failed to query outdated files: {error}");
                    return published;
                }
            };
            if outdated.is_empty() {
                break;
            }

            for file in outdated {
                if let Err(error) = self.analyze_file(state, &file, &mut published) {
                    tracing::error!("Failed to analyze `{}`: {error}", file.path);
                }
            }
        }

        published
    }

    fn analyze_file(
        &self,
        state: &mut EngineState,
        file: &FileRecord,
        published: &mut Vec<PublishDiagnosticsParams>,
    ) -> Result<(), WorkspaceError> {
        let mut file = file.clone();
        let disk_path = PathBuf::from(&file.path);

        let ignored = state.ignore.is_ignored(&disk_path);
        if file.is_ignored != ignored {
            file.is_ignored = ignored;
            state.store.update_file(&file)?;
            if ignored {
                state.store.delete_diagnostics_by_file(file.id)?;
            }
        }
        if ignored {
            state.store.clear_file_outdated(file.id)?;
            self.collect_publish(state, &file, published);
            return Ok(());
        }

        if !disk_path.exists() {
            // Editor-known but never written to disk: analyze from history.
            if state.store.latest_file_history(file.id)?.is_none() {
                self.delete_file(state, file)?;
                return Ok(());
            }
        }

        let mtime = modified_ms(&disk_path);
        let latest = state.store.latest_file_history(file.id)?;
        let content = match &latest {
            Some(history) if history.created_at >= mtime => history.content.clone(),
            _ => match std::fs::read_to_string(&disk_path) {
                Ok(text) => {
                    state.store.push_file_history(file.id, &text, mtime, true)?;
                    text
                }
                Err(error) => {
                    // Read failure after the existence check: gone.
                    tracing::warn!("Failed to read `{}`: {error}; treating as deleted", file.path);
                    self.delete_file(state, file)?;
                    return Ok(());
                }
            },
        };

        if file.last_changed != mtime && mtime != 0 {
            file.last_changed = mtime;
            state.store.update_file(&file)?;
        }

        let inputs = AnalyzerInputs {
            file: file.clone(),
            text: content,
            tooling_dir: self.tooling_dir.clone(),
            factory: Arc::clone(&self.factory),
            now: now_ms(),
        };
        let Some(mut analyzer) = self.registry.create(inputs) else {
            // Indexed but not analyzable (e.g. a non-canonical config file).
            state.store.clear_file_outdated(file.id)?;
            return Ok(());
        };

        tracing::info!("Analyzing `{}`", file.path);

        let outcome = match analyzer.analyze(&state.store) {
            Ok(()) => analyzer.commit(&mut state.store),
            Err(error) => Err(error),
        };
        if let Err(error) = outcome {
            tracing::error!("Failed to analyze `{}`: {error}", file.path);
            state.store.delete_references_by_file(file.id)?;
            state.store.insert_diagnostic(&DiagnosticRecord {
                file_id: file.id,
                source_file_id: file.id,
                severity: Severity::Error,
                code: "VV-ERR".to_string(),
                message: format!("Failed to analyze '{}': {error}", file.path),
                ..DiagnosticRecord::default()
            })?;
            // The next change to the file re-marks it; retrying the same
            // content would fail the same way.
            state.store.clear_file_outdated(file.id)?;
        }

        self.collect_publish(state, &file, published);

        Ok(())
    }

    fn collect_publish(&self, state: &EngineState, file: &FileRecord, published: &mut Vec<PublishDiagnosticsParams>) {
        let (params, additional) = queries::publish_params(&state.store, file);
        if let Some(params) = params {
            published.push(params);
        }

        for additional_id in additional {
            let Ok(Some(additional_file)) = state.store.file_by_id(additional_id) else {
                continue;
            };
            let (params, _) = queries::publish_params(&state.store, &additional_file);
            if let Some(params) = params {
                published.push(params);
            }
        }
    }

    fn publish_all(&self, published: Vec<PublishDiagnosticsParams>) {
        if let Some(publisher) = &self.publisher {
            for params in published {
                publisher(params);
            }
        }
    }

    // Editor queries. Each runs on its own store connection so it never
    // contends with an ongoing analysis.

    fn query<T>(&self, path: &Path, fallback: T, run: impl FnOnce(&Store, &FileRecord) -> T) -> T {
        let Ok((store, _)) = Store::open(&self.db_path) else {
            return fallback;
        };
        let Ok(Some(file)) = store.file_by_path(&normalize_path(path)) else {
            return fallback;
        };

        run(&store, &file)
    }

    #[must_use]
    pub fn references(&self, path: &Path, position: Position) -> Vec<Location> {
        self.query(path, Vec::new(), |store, file| queries::references(store, file, position))
    }

    #[must_use]
    pub fn hover(&self, path: &Path, position: Position) -> Option<Hover> {
        self.query(path, None, |store, file| queries::hover(store, file, position))
    }

    #[must_use]
    pub fn inlay_hints(&self, path: &Path, range: Range) -> Vec<InlayHint> {
        self.query(path, Vec::new(), |store, file| queries::inlay_hints(store, file, range))
    }

    #[must_use]
    pub fn code_actions(&self, path: &Path, range: Range) -> Vec<CodeActionOrCommand> {
        self.query(path, Vec::new(), |store, file| queries::code_actions(store, file, range))
    }

    /// Current publishable diagnostics for a path. The pull counterpart of
    /// the publisher callback.
    #[must_use]
    pub fn diagnostics_for(&self, path: &Path) -> Option<PublishDiagnosticsParams> {
        self.query(path, None, |store, file| queries::publish_params(store, file).0)
    }
}

fn is_marker(path: &Path) -> bool {
    path.file_name().is_some_and(|name| name.to_string_lossy() == MARKER_FILE_NAME)
}

/// Normalizes a path for storage: forward slashes throughout.
#[must_use]
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_millis() as i64).unwrap_or(0)
}

fn modified_ms(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

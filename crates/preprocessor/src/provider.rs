use std::path::Path;

use foldhash::HashMap;
use foldhash::HashMapExt;

/// Source of file contents for include resolution.
///
/// The workspace orchestrator backs this with the disk; tests back it with
/// an in-memory map.
pub trait FileProvider: Send + Sync {
    fn exists(&self, path: &str) -> bool;

    fn read(&self, path: &str) -> std::io::Result<String>;
}

/// Reads files from the file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFileProvider;

impl FileProvider for DiskFileProvider {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn read(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Serves file contents from an in-memory map, keyed on normalized paths.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileProvider {
    files: HashMap<String, String>,
}

impl MemoryFileProvider {
    #[must_use]
    pub fn new() -> Self {
        Self { files: HashMap::new() }
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl FileProvider for MemoryFileProvider {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read(&self, path: &str) -> std::io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, format!("no such file: {path}")))
    }
}

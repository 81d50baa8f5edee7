use sqfls_database::StoreError;

/// Errors escaping a single file's analysis.
///
/// These are confined to the file being analyzed: the orchestrator rolls
/// the file back to a `VV-ERR` diagnostic and continues with the next one.
#[derive(Debug)]
pub enum AnalysisError {
    Store(StoreError),
    Read(String, std::io::Error),
    ScriptDirectory(std::path::PathBuf, std::io::Error),
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::Store(error) => write!(f, "{error}"),
            AnalysisError::Read(path, error) => write!(f, "Failed to read `{path}`: {error}"),
            AnalysisError::ScriptDirectory(path, error) => {
                write!(f, "Failed to prepare `{}`: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AnalysisError::Store(error) => Some(error),
            AnalysisError::Read(_, error) | AnalysisError::ScriptDirectory(_, error) => Some(error),
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(error: StoreError) -> Self {
        AnalysisError::Store(error)
    }
}

use sqfls_analysis::AnalysisError;
use sqfls_database::StoreError;

/// Errors surfaced by the workspace orchestrator.
#[derive(Debug)]
pub enum WorkspaceError {
    Store(StoreError),
    Analysis(AnalysisError),
    CreateToolingDirectory(std::path::PathBuf, std::io::Error),
    WriteToolingFile(std::path::PathBuf, std::io::Error),
    WatcherInit(notify::Error),
    WatcherWatch(notify::Error),
    InvalidWorkspacePath(std::path::PathBuf),
}

impl std::fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkspaceError::Store(error) => write!(f, "{error}"),
            WorkspaceError::Analysis(error) => write!(f, "{error}"),
            WorkspaceError::CreateToolingDirectory(path, error) => {
                write!(f, "Failed to create `{}`: {error}", path.display())
            }
            WorkspaceError::WriteToolingFile(path, error) => {
                write!(f, "Failed to write `{}`: {error}", path.display())
            }
            WorkspaceError::WatcherInit(error) => write!(f, "Failed to initialize the file watcher: {error}"),
            WorkspaceError::WatcherWatch(error) => write!(f, "Failed to watch the workspace: {error}"),
            WorkspaceError::InvalidWorkspacePath(path) => {
                write!(f, "Not a usable workspace directory: `{}`", path.display())
            }
        }
    }
}

impl std::error::Error for WorkspaceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WorkspaceError::Store(error) => Some(error),
            WorkspaceError::Analysis(error) => Some(error),
            WorkspaceError::CreateToolingDirectory(_, error) | WorkspaceError::WriteToolingFile(_, error) => {
                Some(error)
            }
            WorkspaceError::WatcherInit(error) | WorkspaceError::WatcherWatch(error) => Some(error),
            WorkspaceError::InvalidWorkspacePath(_) => None,
        }
    }
}

impl From<StoreError> for WorkspaceError {
    fn from(error: StoreError) -> Self {
        WorkspaceError::Store(error)
    }
}

impl From<AnalysisError> for WorkspaceError {
    fn from(error: AnalysisError) -> Self {
        WorkspaceError::Analysis(error)
    }
}

/// Errors raised while preprocessing a file.
///
/// Every variant names the file and line the problem surfaced at, so the
/// analysis layer can turn it into a diagnostic on that location.
#[derive(Debug)]
pub enum PreprocessError {
    UnresolvedInclude { include: String, path: String, line: u32 },
    IncludeRead { include: String, path: String, line: u32, error: std::io::Error },
    IncludeDepthExceeded { include: String, path: String, line: u32 },
    MalformedDirective { directive: String, path: String, line: u32 },
    UnbalancedConditional { path: String, line: u32 },
}

impl PreprocessError {
    /// The file the error belongs to.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            PreprocessError::UnresolvedInclude { path, .. }
            | PreprocessError::IncludeRead { path, .. }
            | PreprocessError::IncludeDepthExceeded { path, .. }
            | PreprocessError::MalformedDirective { path, .. }
            | PreprocessError::UnbalancedConditional { path, .. } => path,
        }
    }

    /// The 1-based line the error surfaced at.
    #[must_use]
    pub const fn line(&self) -> u32 {
        match self {
            PreprocessError::UnresolvedInclude { line, .. }
            | PreprocessError::IncludeRead { line, .. }
            | PreprocessError::IncludeDepthExceeded { line, .. }
            | PreprocessError::MalformedDirective { line, .. }
            | PreprocessError::UnbalancedConditional { line, .. } => *line,
        }
    }
}

impl std::fmt::Display for PreprocessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessError::UnresolvedInclude { include, .. } => {
                write!(f, "Failed to resolve include `{include}`")
            }
            PreprocessError::IncludeRead { include, error, .. } => {
                write!(f, "Failed to read include `{include}`: {error}")
            }
            PreprocessError::IncludeDepthExceeded { include, .. } => {
                write!(f, "Include depth exceeded while including `{include}`")
            }
            PreprocessError::MalformedDirective { directive, .. } => {
                write!(f, "Malformed preprocessor directive `#{directive}`")
            }
            PreprocessError::UnbalancedConditional { .. } => {
                write!(f, "Unbalanced conditional directive")
            }
        }
    }
}

impl std::error::Error for PreprocessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PreprocessError::IncludeRead { error, .. } => Some(error),
            _ => None,
        }
    }
}

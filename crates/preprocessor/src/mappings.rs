//! Include-path mappings.
//!
//! A mapping associates a physical directory with a virtual prefix, the way
//! the engine's own file layer resolves `#include "\x\addon\file.hpp"` into
//! a directory on disk. Mappings come from workspace configuration and from
//! path-prefix marker files.

/// One physical-directory-to-virtual-prefix association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    /// Physical directory, normalized to forward slashes, no trailing slash.
    pub physical: String,
    /// Virtual prefix, normalized to backslashes, with a leading backslash.
    pub virtual_prefix: String,
    /// Whether the mapping came from workspace configuration rather than a
    /// marker file. Configuration updates replace only workspace mappings.
    pub workspace: bool,
}

impl PathMapping {
    #[must_use]
    pub fn new(physical: impl AsRef<str>, virtual_prefix: impl AsRef<str>, workspace: bool) -> Self {
        Self {
            physical: normalize_physical(physical.as_ref()),
            virtual_prefix: normalize_virtual(virtual_prefix.as_ref()),
            workspace,
        }
    }
}

/// Normalizes a physical path: forward slashes, no trailing slash.
#[must_use]
pub fn normalize_physical(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    normalized
}

/// Normalizes a virtual prefix: backslashes, one leading backslash, no
/// trailing backslash.
#[must_use]
pub fn normalize_virtual(prefix: &str) -> String {
    let trimmed = prefix.replace('/', "\\");
    let trimmed = trimmed.trim_matches('\\');

    format!("\\{trimmed}")
}

/// Resolves an include argument against the mappings and the including file.
///
/// Arguments starting with a backslash resolve through the mapping with the
/// longest matching virtual prefix (case-insensitive); everything else
/// resolves relative to the including file's directory. The result is a
/// normalized physical path, or `None` for an unmapped virtual path.
#[must_use]
pub fn resolve_include(argument: &str, including_path: &str, mappings: &[PathMapping]) -> Option<String> {
    let argument = argument.trim();

    if argument.starts_with('\\') || argument.starts_with('/') {
        let virtual_path = normalize_virtual(argument);
        let lowered = virtual_path.to_ascii_lowercase();

        let best = mappings
            .iter()
            .filter(|mapping| {
                let prefix = mapping.virtual_prefix.to_ascii_lowercase();
                lowered == prefix || lowered.starts_with(&format!("{prefix}\\"))
            })
            .max_by_key(|mapping| mapping.virtual_prefix.len())?;

        let remainder = &virtual_path[best.virtual_prefix.len()..];
        let remainder = remainder.trim_start_matches('\\').replace('\\', "/");

        return Some(normalize_segments(&format!("{}/{}", best.physical, remainder)));
    }

    let directory = match including_path.rfind('/') {
        Some(index) => &including_path[..index],
        None => ".",
    };
    let relative = argument.replace('\\', "/");

    Some(normalize_segments(&format!("{directory}/{relative}")))
}

/// Collapses `.` and `..` segments.
fn normalize_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

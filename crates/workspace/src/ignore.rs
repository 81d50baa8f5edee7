//! The `ls-ignore.txt` list.
//!
//! Newline-separated literal paths relative to the workspace; `#` starts a
//! comment; a listed path also covers everything beneath it. Not a glob
//! format.

use std::path::Path;
use std::path::PathBuf;

const TEMPLATE_HEADER: &str = "\
################################################################
### This file contains a list of paths to ignore changes of. ###
### The paths are relative to the workspace root.            ###
### The paths are separated by newlines.                     ###
### Note that this is not behaving like a .gitignore file,   ###
### and you cannot invert some paths by prefixing them with  ###
### a ! or use wildcards.                                    ###
### Any subfolder of a path is also ignored.                 ###
### Important: No leading or trailing whitespace is allowed  ###
###            on any line.                                  ###
### Changing anything in this file will have no effect until ###
### the language server is restarted.                        ###
### Keep in mind that already analyzed files will not be     ###
### re-analyzed OR removed from the database.                ###
################################################################
";

/// Ignored path prefixes, resolved against the workspace root.
#[derive(Debug, Clone, Default)]
pub struct IgnoreList {
    roots: Vec<PathBuf>,
}

impl IgnoreList {
    /// Loads the ignore list, writing the default template on first run.
    pub fn load_or_create(workspace: &Path, tooling_dir: &Path) -> std::io::Result<Self> {
        let list_path = tooling_dir.join("ls-ignore.txt");

        if !list_path.exists() {
            let tooling_relative = tooling_dir.strip_prefix(workspace).unwrap_or(tooling_dir);
            let mut template = String::from(TEMPLATE_HEADER);
            template.push_str(&tooling_relative.to_string_lossy().replace('\\', "/"));
            template.push('\n');
            for default in [".vscode", ".github", ".git", ".hemtt"] {
                template.push_str(default);
                template.push('\n');
            }
            std::fs::write(&list_path, template)?;
        }

        let mut roots = Vec::new();
        for line in std::fs::read_to_string(&list_path)?.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            roots.push(workspace.join(line));
        }

        Ok(Self { roots })
    }

    /// Whether a path is listed or sits beneath a listed path.
    #[must_use]
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_written_once_and_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        let tooling = workspace.join(".vscode").join("sqfvm-lsp");
        std::fs::create_dir_all(&tooling).unwrap();

        let list = IgnoreList::load_or_create(workspace, &tooling).unwrap();

        assert!(tooling.join("ls-ignore.txt").exists());
        assert!(list.is_ignored(&workspace.join(".git").join("config")));
        assert!(list.is_ignored(&tooling.join("sqlite3.db")));
        assert!(!list.is_ignored(&workspace.join("scripts").join("init.sqf")));
    }

    #[test]
    fn listed_subpaths_cover_their_trees() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        let tooling = workspace.join(".vscode").join("sqfvm-lsp");
        std::fs::create_dir_all(&tooling).unwrap();
        std::fs::write(tooling.join("ls-ignore.txt"), "# comment\nlegacy\n").unwrap();

        let list = IgnoreList::load_or_create(workspace, &tooling).unwrap();

        assert!(list.is_ignored(&workspace.join("legacy").join("old.sqf")));
        assert!(!list.is_ignored(&workspace.join("scripts").join("init.sqf")));
    }
}

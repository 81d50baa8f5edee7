//! Row types and their enumerations.

use serde::Deserialize;
use serde::Serialize;
use strum::Display;
use strum::EnumString;

/// The scope tag shared by all global variables.
pub const GLOBAL_SCOPE: &str = "missionNamespace";

/// Diagnostic severity, ordered from most to least severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Severity {
    Fatal = 0,
    #[default]
    Error = 1,
    Warning = 2,
    Info = 3,
    Verbose = 4,
    Trace = 5,
}

impl Severity {
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            0 => Severity::Fatal,
            1 => Severity::Error,
            2 => Severity::Warning,
            3 => Severity::Info,
            4 => Severity::Verbose,
            _ => Severity::Trace,
        }
    }
}

/// How a reference touches its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[strum(serialize_all = "lowercase")]
pub enum Access {
    #[default]
    Get = 1,
    Set = 2,
}

impl Access {
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            2 => Access::Set,
            _ => Access::Get,
        }
    }
}

/// Bitset of value types a reference may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TypeFlags(pub u16);

impl TypeFlags {
    pub const NONE: TypeFlags = TypeFlags(0);
    pub const CODE: TypeFlags = TypeFlags(0x0001);
    pub const SCALAR: TypeFlags = TypeFlags(0x0002);
    pub const BOOLEAN: TypeFlags = TypeFlags(0x0004);
    pub const OBJECT: TypeFlags = TypeFlags(0x0008);
    pub const HASHMAP: TypeFlags = TypeFlags(0x0010);
    pub const ARRAY: TypeFlags = TypeFlags(0x0020);
    pub const STRING: TypeFlags = TypeFlags(0x0040);
    pub const NIL: TypeFlags = TypeFlags(0x0080);
    pub const ANY: TypeFlags = TypeFlags(0xFFFF);

    #[must_use]
    pub const fn contains(self, other: TypeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_any(self) -> bool {
        self.0 == TypeFlags::ANY.0
    }

    /// The names of the set type bits, in canonical order. Empty for `NONE`
    /// and for `ANY` (callers render those specially or not at all).
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        if self.is_none() || self.is_any() {
            return Vec::new();
        }

        const LABELS: &[(TypeFlags, &str)] = &[
            (TypeFlags::CODE, "code"),
            (TypeFlags::SCALAR, "scalar"),
            (TypeFlags::BOOLEAN, "boolean"),
            (TypeFlags::OBJECT, "object"),
            (TypeFlags::HASHMAP, "hashmap"),
            (TypeFlags::ARRAY, "array"),
            (TypeFlags::STRING, "string"),
            (TypeFlags::NIL, "nil"),
        ];

        LABELS.iter().filter(|(flag, _)| self.contains(*flag)).map(|(_, name)| *name).collect()
    }
}

impl std::ops::BitOr for TypeFlags {
    type Output = TypeFlags;

    fn bitor(self, rhs: TypeFlags) -> TypeFlags {
        TypeFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for TypeFlags {
    fn bitor_assign(&mut self, rhs: TypeFlags) {
        self.0 |= rhs.0;
    }
}

/// Kind of a code action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[strum(serialize_all = "snake_case")]
pub enum CodeActionKind {
    #[default]
    Generic = 0,
    QuickFix = 1,
    Refactor = 2,
    Extract = 3,
    Inline = 4,
    Rewrite = 5,
    WholeFile = 6,
}

impl CodeActionKind {
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => CodeActionKind::QuickFix,
            2 => CodeActionKind::Refactor,
            3 => CodeActionKind::Extract,
            4 => CodeActionKind::Inline,
            5 => CodeActionKind::Rewrite,
            6 => CodeActionKind::WholeFile,
            _ => CodeActionKind::Generic,
        }
    }
}

/// Operation of a single code-action change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[strum(serialize_all = "snake_case")]
pub enum ChangeOperation {
    #[default]
    FileChange = 0,
    FileCreate = 1,
    FileDelete = 2,
    FileRename = 3,
}

impl ChangeOperation {
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        match value {
            1 => ChangeOperation::FileCreate,
            2 => ChangeOperation::FileDelete,
            3 => ChangeOperation::FileRename,
            _ => ChangeOperation::FileChange,
        }
    }
}

/// A workspace file. The unit of analysis.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileRecord {
    pub id: i64,
    /// Normalized workspace path, forward slashes.
    pub path: String,
    /// Unix timestamp (milliseconds) of the last observed change.
    pub last_changed: i64,
    pub is_outdated: bool,
    pub is_deleted: bool,
    pub is_ignored: bool,
}

/// One full-text snapshot of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHistoryRecord {
    pub id: i64,
    pub file_id: i64,
    pub content: String,
    /// Unix timestamp (milliseconds) the snapshot was recorded.
    pub created_at: i64,
    /// True when observed from disk, false when received from the editor.
    pub is_external: bool,
}

/// A variable. Privates carry their owning file; globals do not.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VariableRecord {
    pub id: i64,
    pub name: String,
    /// `missionNamespace` for globals, a hierarchical scope tag for privates.
    pub scope: String,
    pub file_id: Option<i64>,
}

/// A use of a variable at a concrete position.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceRecord {
    pub id: i64,
    /// The file the reference appears in.
    pub file_id: i64,
    pub variable_id: i64,
    /// The file whose analysis produced the reference.
    pub source_file_id: i64,
    pub access: Access,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
    pub types: TypeFlags,
    pub is_declaration: bool,
    pub is_magic: bool,
}

/// A reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticRecord {
    pub id: i64,
    pub file_id: i64,
    pub source_file_id: i64,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub content: String,
    pub is_suppressed: bool,
}

/// "While analyzing `source_file`, `including_file` textually included
/// `included_file`."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIncludeRecord {
    pub id: i64,
    pub included_file_id: i64,
    pub including_file_id: i64,
    pub source_file_id: i64,
}

/// A hover-able range with rendered markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverRecord {
    pub id: i64,
    pub file_id: i64,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub markdown: String,
}

/// A code action owned by a file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeActionRecord {
    pub id: i64,
    pub file_id: i64,
    pub kind: CodeActionKind,
    pub identifier: String,
    pub title: String,
}

/// One change of a code action.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeActionChangeRecord {
    pub id: i64,
    pub code_action_id: i64,
    pub operation: ChangeOperation,
    pub path: String,
    pub old_path: Option<String>,
    pub start_line: Option<u32>,
    pub start_column: Option<u32>,
    pub end_line: Option<u32>,
    pub end_column: Option<u32>,
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_flag_names_follow_canonical_order() {
        let types = TypeFlags::STRING | TypeFlags::SCALAR;

        assert_eq!(types.names(), vec!["scalar", "string"]);
    }

    #[test]
    fn any_and_none_have_no_names() {
        assert!(TypeFlags::ANY.names().is_empty());
        assert!(TypeFlags::NONE.names().is_empty());
    }

    #[test]
    fn severity_round_trips_through_strings() {
        assert_eq!("WARNING".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(Severity::Verbose.to_string(), "VERBOSE");
    }
}

//! Store operations.
//!
//! All row-level reads and writes live in [`StoreAccess`], default-implemented
//! against a raw connection so they are available both on the plain store and
//! inside a transaction.

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;

use crate::error::StoreError;
use crate::model::Access;
use crate::model::ChangeOperation;
use crate::model::CodeActionChangeRecord;
use crate::model::CodeActionKind;
use crate::model::CodeActionRecord;
use crate::model::DiagnosticRecord;
use crate::model::FileHistoryRecord;
use crate::model::FileIncludeRecord;
use crate::model::FileRecord;
use crate::model::GLOBAL_SCOPE;
use crate::model::HoverRecord;
use crate::model::ReferenceRecord;
use crate::model::Severity;
use crate::model::TypeFlags;
use crate::model::VariableRecord;

/// A file flag selectable in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFlag {
    Outdated,
    Deleted,
    Ignored,
}

impl FileFlag {
    const fn column(self) -> &'static str {
        match self {
            FileFlag::Outdated => "is_outdated",
            FileFlag::Deleted => "is_deleted",
            FileFlag::Ignored => "is_ignored",
        }
    }
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        last_changed: row.get(2)?,
        is_outdated: row.get(3)?,
        is_deleted: row.get(4)?,
        is_ignored: row.get(5)?,
    })
}

fn variable_from_row(row: &Row<'_>) -> rusqlite::Result<VariableRecord> {
    Ok(VariableRecord { id: row.get(0)?, name: row.get(1)?, scope: row.get(2)?, file_id: row.get(3)? })
}

fn reference_from_row(row: &Row<'_>) -> rusqlite::Result<ReferenceRecord> {
    Ok(ReferenceRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        variable_id: row.get(2)?,
        source_file_id: row.get(3)?,
        access: Access::from_i64(row.get(4)?),
        line: row.get(5)?,
        column: row.get(6)?,
        offset: row.get(7)?,
        length: row.get(8)?,
        types: TypeFlags(row.get::<_, i64>(9)? as u16),
        is_declaration: row.get(10)?,
        is_magic: row.get(11)?,
    })
}

fn diagnostic_from_row(row: &Row<'_>) -> rusqlite::Result<DiagnosticRecord> {
    Ok(DiagnosticRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        source_file_id: row.get(2)?,
        line: row.get(3)?,
        column: row.get(4)?,
        offset: row.get(5)?,
        length: row.get(6)?,
        severity: Severity::from_i64(row.get(7)?),
        code: row.get(8)?,
        message: row.get(9)?,
        content: row.get(10)?,
        is_suppressed: row.get(11)?,
    })
}

fn hover_from_row(row: &Row<'_>) -> rusqlite::Result<HoverRecord> {
    Ok(HoverRecord {
        id: row.get(0)?,
        file_id: row.get(1)?,
        start_line: row.get(2)?,
        start_column: row.get(3)?,
        end_line: row.get(4)?,
        end_column: row.get(5)?,
        markdown: row.get(6)?,
    })
}

const FILE_COLUMNS: &str = "id, path, last_changed, is_outdated, is_deleted, is_ignored";
const REFERENCE_COLUMNS: &str =
    "id, file_id, variable_id, source_file_id, access, line, col, byte_offset, length, types, is_declaration, is_magic";
const DIAGNOSTIC_COLUMNS: &str =
    "id, file_id, source_file_id, line, col, byte_offset, length, severity, code, message, content, is_suppressed";

/// Row-level store operations.
pub trait StoreAccess {
    fn connection(&self) -> &Connection;

    // Files

    fn file_by_path(&self, path: &str) -> Result<Option<FileRecord>, StoreError> {
        let record = self
            .connection()
            .query_row(&format!("SELECT {FILE_COLUMNS} FROM files WHERE path = ?1"), [path], file_from_row)
            .optional()?;

        Ok(record)
    }

    fn file_by_id(&self, id: i64) -> Result<Option<FileRecord>, StoreError> {
        let record = self
            .connection()
            .query_row(&format!("SELECT {FILE_COLUMNS} FROM files WHERE id = ?1"), [id], file_from_row)
            .optional()?;

        Ok(record)
    }

    /// Fetches the file at `path`, creating an outdated row when absent.
    fn ensure_file(&self, path: &str, now: i64) -> Result<FileRecord, StoreError> {
        if let Some(existing) = self.file_by_path(path)? {
            return Ok(existing);
        }

        self.connection().execute(
            "INSERT INTO files (path, last_changed, is_outdated, is_deleted, is_ignored) VALUES (?1, ?2, 1, 0, 0)",
            params![path, now],
        )?;
        let id = self.connection().last_insert_rowid();

        Ok(FileRecord {
            id,
            path: path.to_string(),
            last_changed: now,
            is_outdated: true,
            is_deleted: false,
            is_ignored: false,
        })
    }

    fn update_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        self.connection().execute(
            "UPDATE files SET path = ?2, last_changed = ?3, is_outdated = ?4, is_deleted = ?5, is_ignored = ?6
             WHERE id = ?1",
            params![file.id, file.path, file.last_changed, file.is_outdated, file.is_deleted, file.is_ignored],
        )?;

        Ok(())
    }

    fn files_with_flag(&self, flag: FileFlag) -> Result<Vec<FileRecord>, StoreError> {
        let mut statement = self
            .connection()
            .prepare(&format!("SELECT {FILE_COLUMNS} FROM files WHERE {} = 1 ORDER BY id", flag.column()))?;
        let files = statement.query_map([], file_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    fn files_outdated_and_not_deleted(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut statement = self.connection().prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE is_outdated = 1 AND is_deleted = 0 ORDER BY id"
        ))?;
        let files = statement.query_map([], file_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    fn files_under_path(&self, prefix: &str) -> Result<Vec<FileRecord>, StoreError> {
        let pattern = format!("{}%", prefix.trim_end_matches('/'));
        let mut statement =
            self.connection().prepare(&format!("SELECT {FILE_COLUMNS} FROM files WHERE path LIKE ?1"))?;
        let files = statement.query_map([pattern], file_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    fn mark_all_files_outdated(&self) -> Result<(), StoreError> {
        self.connection().execute("UPDATE files SET is_outdated = 1 WHERE is_deleted = 0", [])?;

        Ok(())
    }

    fn set_file_outdated(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("UPDATE files SET is_outdated = 1 WHERE id = ?1", [file_id])?;

        Ok(())
    }

    fn clear_file_outdated(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("UPDATE files SET is_outdated = 0 WHERE id = ?1", [file_id])?;

        Ok(())
    }

    /// Physically removes rows for files still flagged deleted. Dependent
    /// rows go with them through the cascade and explicit cleanup.
    fn purge_deleted_files(&self) -> Result<usize, StoreError> {
        let deleted = self.files_with_flag(FileFlag::Deleted)?;
        for file in &deleted {
            self.delete_file_owned_rows(file.id)?;
            self.connection().execute("DELETE FROM files WHERE id = ?1", [file.id])?;
        }

        Ok(deleted.len())
    }

    /// Removes every row a file owns: diagnostics, references, private
    /// variables, history, include edges, hovers, and code actions.
    fn delete_file_owned_rows(&self, file_id: i64) -> Result<(), StoreError> {
        let conn = self.connection();
        conn.execute("DELETE FROM diagnostics WHERE file_id = ?1 OR source_file_id = ?1", [file_id])?;
        conn.execute("DELETE FROM refs WHERE file_id = ?1 OR source_file_id = ?1", [file_id])?;
        conn.execute("DELETE FROM variables WHERE file_id = ?1", [file_id])?;
        conn.execute("DELETE FROM file_history WHERE file_id = ?1", [file_id])?;
        conn.execute(
            "DELETE FROM file_includes
             WHERE included_file_id = ?1 OR including_file_id = ?1 OR source_file_id = ?1",
            [file_id],
        )?;
        conn.execute("DELETE FROM hovers WHERE file_id = ?1", [file_id])?;
        conn.execute(
            "DELETE FROM code_action_changes WHERE code_action_id IN (SELECT id FROM code_actions WHERE file_id = ?1)",
            [file_id],
        )?;
        conn.execute("DELETE FROM code_actions WHERE file_id = ?1", [file_id])?;

        Ok(())
    }

    // File history

    fn push_file_history(&self, file_id: i64, content: &str, created_at: i64, is_external: bool) -> Result<(), StoreError> {
        self.connection().execute(
            "INSERT INTO file_history (file_id, content, created_at, is_external) VALUES (?1, ?2, ?3, ?4)",
            params![file_id, content, created_at, is_external],
        )?;

        Ok(())
    }

    fn latest_file_history(&self, file_id: i64) -> Result<Option<FileHistoryRecord>, StoreError> {
        let record = self
            .connection()
            .query_row(
                "SELECT id, file_id, content, created_at, is_external FROM file_history
                 WHERE file_id = ?1 ORDER BY created_at DESC, id DESC LIMIT 1",
                [file_id],
                |row| {
                    Ok(FileHistoryRecord {
                        id: row.get(0)?,
                        file_id: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                        is_external: row.get(4)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    // Variables

    fn insert_variable(&self, variable: &VariableRecord) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO variables (name, scope, file_id) VALUES (?1, ?2, ?3)",
            params![variable.name, variable.scope, variable.file_id],
        )?;

        Ok(self.connection().last_insert_rowid())
    }

    fn variable_by_id(&self, id: i64) -> Result<Option<VariableRecord>, StoreError> {
        let record = self
            .connection()
            .query_row("SELECT id, name, scope, file_id FROM variables WHERE id = ?1", [id], variable_from_row)
            .optional()?;

        Ok(record)
    }

    fn variable_by_scope_and_name(&self, scope: &str, name: &str) -> Result<Option<VariableRecord>, StoreError> {
        let record = self
            .connection()
            .query_row(
                "SELECT id, name, scope, file_id FROM variables WHERE scope = ?1 AND name = ?2 COLLATE NOCASE",
                params![scope, name],
                variable_from_row,
            )
            .optional()?;

        Ok(record)
    }

    fn variables_with_scope_prefix(&self, prefix: &str) -> Result<Vec<VariableRecord>, StoreError> {
        let pattern = format!("{prefix}%");
        let mut statement =
            self.connection().prepare("SELECT id, name, scope, file_id FROM variables WHERE scope LIKE ?1")?;
        let variables = statement.query_map([pattern], variable_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(variables)
    }

    fn delete_variable(&self, id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM refs WHERE variable_id = ?1", [id])?;
        self.connection().execute("DELETE FROM variables WHERE id = ?1", [id])?;

        Ok(())
    }

    /// Globals exist only as long as something references them.
    fn delete_orphan_globals(&self) -> Result<usize, StoreError> {
        let removed = self.connection().execute(
            "DELETE FROM variables
             WHERE scope = ?1 AND id NOT IN (SELECT DISTINCT variable_id FROM refs)",
            [GLOBAL_SCOPE],
        )?;

        Ok(removed)
    }

    /// Global variables whose last analysis was produced by `file_id`.
    fn global_variables_sourced_from(&self, file_id: i64) -> Result<Vec<VariableRecord>, StoreError> {
        let mut statement = self.connection().prepare(
            "SELECT DISTINCT v.id, v.name, v.scope, v.file_id FROM variables v
             JOIN refs r ON r.variable_id = v.id
             WHERE v.scope = ?1 AND r.source_file_id = ?2",
        )?;
        let variables =
            statement.query_map(params![GLOBAL_SCOPE, file_id], variable_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(variables)
    }

    // References

    fn insert_reference(&self, reference: &ReferenceRecord) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO refs (file_id, variable_id, source_file_id, access, line, col, byte_offset, length, types, is_declaration, is_magic)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                reference.file_id,
                reference.variable_id,
                reference.source_file_id,
                reference.access as i64,
                reference.line,
                reference.column,
                reference.offset,
                reference.length,
                reference.types.0 as i64,
                reference.is_declaration,
                reference.is_magic,
            ],
        )?;

        Ok(self.connection().last_insert_rowid())
    }

    fn delete_references_by_source(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM refs WHERE source_file_id = ?1", [file_id])?;

        Ok(())
    }

    fn delete_references_by_file(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM refs WHERE file_id = ?1", [file_id])?;

        Ok(())
    }

    fn references_of_variable(&self, variable_id: i64) -> Result<Vec<ReferenceRecord>, StoreError> {
        let mut statement = self
            .connection()
            .prepare(&format!("SELECT {REFERENCE_COLUMNS} FROM refs WHERE variable_id = ?1 ORDER BY id"))?;
        let references = statement.query_map([variable_id], reference_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(references)
    }

    fn references_at_line(&self, file_id: i64, line: u32) -> Result<Vec<ReferenceRecord>, StoreError> {
        let mut statement = self.connection().prepare(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM refs WHERE file_id = ?1 AND line = ?2 ORDER BY id"
        ))?;
        let references =
            statement.query_map(params![file_id, line], reference_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(references)
    }

    fn references_in_line_range(&self, file_id: i64, start_line: u32, end_line: u32) -> Result<Vec<ReferenceRecord>, StoreError> {
        let mut statement = self.connection().prepare(&format!(
            "SELECT {REFERENCE_COLUMNS} FROM refs WHERE file_id = ?1 AND line >= ?2 AND line <= ?3 ORDER BY id"
        ))?;
        let references = statement
            .query_map(params![file_id, start_line, end_line], reference_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(references)
    }

    /// Distinct files holding a reference to the variable, excluding one.
    fn files_referencing_variable(&self, variable_id: i64, excluded_file_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut statement = self
            .connection()
            .prepare("SELECT DISTINCT file_id FROM refs WHERE variable_id = ?1 AND file_id != ?2")?;
        let files = statement
            .query_map(params![variable_id, excluded_file_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(files)
    }

    // Diagnostics

    fn insert_diagnostic(&self, diagnostic: &DiagnosticRecord) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO diagnostics (file_id, source_file_id, line, col, byte_offset, length, severity, code, message, content, is_suppressed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                diagnostic.file_id,
                diagnostic.source_file_id,
                diagnostic.line,
                diagnostic.column,
                diagnostic.offset,
                diagnostic.length,
                diagnostic.severity as i64,
                diagnostic.code,
                diagnostic.message,
                diagnostic.content,
                diagnostic.is_suppressed,
            ],
        )?;

        Ok(self.connection().last_insert_rowid())
    }

    fn delete_diagnostics_by_source(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM diagnostics WHERE source_file_id = ?1", [file_id])?;

        Ok(())
    }

    fn delete_diagnostics_by_file(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM diagnostics WHERE file_id = ?1", [file_id])?;

        Ok(())
    }

    /// Diagnostics to publish for a file: everything unsuppressed that
    /// either sits in the file or was produced by its analysis.
    fn diagnostics_to_publish(&self, file_id: i64) -> Result<Vec<DiagnosticRecord>, StoreError> {
        let mut statement = self.connection().prepare(&format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics
             WHERE (file_id = ?1 OR source_file_id = ?1) AND is_suppressed = 0 ORDER BY id"
        ))?;
        let diagnostics = statement.query_map([file_id], diagnostic_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(diagnostics)
    }

    fn diagnostics_by_source(&self, file_id: i64) -> Result<Vec<DiagnosticRecord>, StoreError> {
        let mut statement = self.connection().prepare(&format!(
            "SELECT {DIAGNOSTIC_COLUMNS} FROM diagnostics WHERE source_file_id = ?1 ORDER BY id"
        ))?;
        let diagnostics = statement.query_map([file_id], diagnostic_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(diagnostics)
    }

    // Include edges

    fn insert_file_include(&self, include: &FileIncludeRecord) -> Result<(), StoreError> {
        self.connection().execute(
            "INSERT INTO file_includes (included_file_id, including_file_id, source_file_id) VALUES (?1, ?2, ?3)",
            params![include.included_file_id, include.including_file_id, include.source_file_id],
        )?;

        Ok(())
    }

    fn delete_includes_by_source(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM file_includes WHERE source_file_id = ?1", [file_id])?;

        Ok(())
    }

    /// Files that textually include the given file.
    fn includers_of(&self, included_file_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut statement = self
            .connection()
            .prepare("SELECT DISTINCT including_file_id FROM file_includes WHERE included_file_id = ?1")?;
        let includers =
            statement.query_map([included_file_id], |row| row.get::<_, i64>(0))?.collect::<Result<Vec<_>, _>>()?;

        Ok(includers)
    }

    // Hovers

    fn insert_hover(&self, hover: &HoverRecord) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO hovers (file_id, start_line, start_col, end_line, end_col, markdown)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![hover.file_id, hover.start_line, hover.start_column, hover.end_line, hover.end_column, hover.markdown],
        )?;

        Ok(self.connection().last_insert_rowid())
    }

    fn delete_hovers_by_file(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute("DELETE FROM hovers WHERE file_id = ?1", [file_id])?;

        Ok(())
    }

    fn hovers_at(&self, file_id: i64, line: u32, column: u32) -> Result<Vec<HoverRecord>, StoreError> {
        let mut statement = self.connection().prepare(
            "SELECT id, file_id, start_line, start_col, end_line, end_col, markdown FROM hovers
             WHERE file_id = ?1
               AND (start_line < ?2 OR (start_line = ?2 AND start_col <= ?3))
               AND (end_line > ?2 OR (end_line = ?2 AND end_col >= ?3))
             ORDER BY id",
        )?;
        let hovers =
            statement.query_map(params![file_id, line, column], hover_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(hovers)
    }

    fn hovers_by_file(&self, file_id: i64) -> Result<Vec<HoverRecord>, StoreError> {
        let mut statement = self.connection().prepare(
            "SELECT id, file_id, start_line, start_col, end_line, end_col, markdown FROM hovers
             WHERE file_id = ?1 ORDER BY id",
        )?;
        let hovers = statement.query_map([file_id], hover_from_row)?.collect::<Result<Vec<_>, _>>()?;

        Ok(hovers)
    }

    // Code actions

    fn insert_code_action(&self, action: &CodeActionRecord) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO code_actions (file_id, kind, identifier, title) VALUES (?1, ?2, ?3, ?4)",
            params![action.file_id, action.kind as i64, action.identifier, action.title],
        )?;

        Ok(self.connection().last_insert_rowid())
    }

    fn insert_code_action_change(&self, change: &CodeActionChangeRecord) -> Result<i64, StoreError> {
        self.connection().execute(
            "INSERT INTO code_action_changes (code_action_id, operation, path, old_path, start_line, start_col, end_line, end_col, content)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                change.code_action_id,
                change.operation as i64,
                change.path,
                change.old_path,
                change.start_line,
                change.start_column,
                change.end_line,
                change.end_column,
                change.content,
            ],
        )?;

        Ok(self.connection().last_insert_rowid())
    }

    fn delete_code_actions_by_file(&self, file_id: i64) -> Result<(), StoreError> {
        self.connection().execute(
            "DELETE FROM code_action_changes WHERE code_action_id IN (SELECT id FROM code_actions WHERE file_id = ?1)",
            [file_id],
        )?;
        self.connection().execute("DELETE FROM code_actions WHERE file_id = ?1", [file_id])?;

        Ok(())
    }

    fn code_actions_by_file(&self, file_id: i64) -> Result<Vec<CodeActionRecord>, StoreError> {
        let mut statement = self.connection().prepare(
            "SELECT id, file_id, kind, identifier, title FROM code_actions WHERE file_id = ?1 ORDER BY id",
        )?;
        let actions = statement
            .query_map([file_id], |row| {
                Ok(CodeActionRecord {
                    id: row.get(0)?,
                    file_id: row.get(1)?,
                    kind: CodeActionKind::from_i64(row.get(2)?),
                    identifier: row.get(3)?,
                    title: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(actions)
    }

    fn changes_of_code_action(&self, code_action_id: i64) -> Result<Vec<CodeActionChangeRecord>, StoreError> {
        let mut statement = self.connection().prepare(
            "SELECT id, code_action_id, operation, path, old_path, start_line, start_col, end_line, end_col, content
             FROM code_action_changes WHERE code_action_id = ?1 ORDER BY id",
        )?;
        let changes = statement
            .query_map([code_action_id], |row| {
                Ok(CodeActionChangeRecord {
                    id: row.get(0)?,
                    code_action_id: row.get(1)?,
                    operation: ChangeOperation::from_i64(row.get(2)?),
                    path: row.get(3)?,
                    old_path: row.get(4)?,
                    start_line: row.get(5)?,
                    start_column: row.get(6)?,
                    end_line: row.get(7)?,
                    end_column: row.get(8)?,
                    content: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(changes)
    }
}

//! Persistent relational store for the SQF language server.
//!
//! The store holds the cross-file index: files and their content history,
//! variables and references, diagnostics, preprocessor include edges, hover
//! spans, and code actions. It is derived state — everything can be rebuilt
//! by re-analyzing the workspace — kept transactional so editor queries
//! observe either the pre-commit or post-commit state of a file, never a
//! mix.

use std::path::Path;

use rusqlite::Connection;

pub mod error;
pub mod model;
pub mod ops;
pub mod schema;

pub use error::StoreError;
pub use model::GLOBAL_SCOPE;
pub use ops::FileFlag;
pub use ops::StoreAccess;
pub use schema::MigrationReport;
pub use schema::MigrationStatus;

/// A handle to the on-disk (or in-memory) store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (creating if necessary) the store at the given path and brings
    /// the schema up to date.
    pub fn open(path: &Path) -> Result<(Self, MigrationReport), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| StoreError::CreateDirectory(parent.to_path_buf(), error))?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory store. Used by tests.
    pub fn open_in_memory() -> Result<(Self, MigrationReport), StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<(Self, MigrationReport), StoreError> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let report = schema::migrate(&conn)?;

        Ok((Self { conn }, report))
    }

    /// Starts a transaction. All multi-row mutations of the commit
    /// coordinator run inside one.
    pub fn transaction(&mut self) -> Result<StoreTransaction<'_>, StoreError> {
        Ok(StoreTransaction { tx: self.conn.transaction()? })
    }
}

impl StoreAccess for Store {
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// An open transaction over the store. Rolls back on drop unless committed.
pub struct StoreTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
}

impl StoreTransaction<'_> {
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;

        Ok(())
    }

    pub fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback()?;

        Ok(())
    }
}

impl StoreAccess for StoreTransaction<'_> {
    fn connection(&self) -> &Connection {
        &self.tx
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::model::Access;
    use crate::model::DiagnosticRecord;
    use crate::model::ReferenceRecord;
    use crate::model::Severity;
    use crate::model::TypeFlags;
    use crate::model::VariableRecord;

    use super::*;

    fn store() -> Store {
        Store::open_in_memory().unwrap().0
    }

    fn reference(file_id: i64, variable_id: i64, access: Access, line: u32) -> ReferenceRecord {
        ReferenceRecord {
            file_id,
            variable_id,
            source_file_id: file_id,
            access,
            line,
            types: TypeFlags::ANY,
            ..ReferenceRecord::default()
        }
    }

    #[test]
    fn ensure_file_is_idempotent_per_path() {
        let store = store();

        let first = store.ensure_file("scripts/init.sqf", 100).unwrap();
        let second = store.ensure_file("scripts/init.sqf", 200).unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_outdated);
        assert_eq!(store.files_with_flag(FileFlag::Outdated).unwrap().len(), 1);
    }

    #[test]
    fn latest_history_wins_by_timestamp() {
        let store = store();
        let file = store.ensure_file("a.sqf", 0).unwrap();

        store.push_file_history(file.id, "old", 10, true).unwrap();
        store.push_file_history(file.id, "new", 20, false).unwrap();

        let latest = store.latest_file_history(file.id).unwrap().unwrap();
        assert_eq!(latest.content, "new");
        assert!(!latest.is_external);
    }

    #[test]
    fn global_lookup_is_case_insensitive() {
        let store = store();
        store
            .insert_variable(&VariableRecord {
                name: "MyGlobal".to_string(),
                scope: GLOBAL_SCOPE.to_string(),
                ..VariableRecord::default()
            })
            .unwrap();

        let found = store.variable_by_scope_and_name(GLOBAL_SCOPE, "myglobal").unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn orphan_globals_are_removed_when_unreferenced() {
        let store = store();
        let file = store.ensure_file("a.sqf", 0).unwrap();

        let used = store
            .insert_variable(&VariableRecord {
                name: "used".to_string(),
                scope: GLOBAL_SCOPE.to_string(),
                ..VariableRecord::default()
            })
            .unwrap();
        store
            .insert_variable(&VariableRecord {
                name: "orphan".to_string(),
                scope: GLOBAL_SCOPE.to_string(),
                ..VariableRecord::default()
            })
            .unwrap();
        store.insert_reference(&reference(file.id, used, Access::Set, 1)).unwrap();

        let removed = store.delete_orphan_globals().unwrap();

        assert_eq!(removed, 1);
        assert!(store.variable_by_scope_and_name(GLOBAL_SCOPE, "used").unwrap().is_some());
        assert!(store.variable_by_scope_and_name(GLOBAL_SCOPE, "orphan").unwrap().is_none());
    }

    #[test]
    fn transaction_rollback_discards_changes() {
        let mut store = store();
        let file = store.ensure_file("a.sqf", 0).unwrap();

        let tx = store.transaction().unwrap();
        tx.insert_diagnostic(&DiagnosticRecord {
            file_id: file.id,
            source_file_id: file.id,
            severity: Severity::Warning,
            code: "VV-001".to_string(),
            ..DiagnosticRecord::default()
        })
        .unwrap();
        tx.rollback().unwrap();

        assert!(store.diagnostics_to_publish(file.id).unwrap().is_empty());
    }

    #[test]
    fn publish_query_skips_suppressed_diagnostics() {
        let store = store();
        let file = store.ensure_file("a.sqf", 0).unwrap();

        store
            .insert_diagnostic(&DiagnosticRecord {
                file_id: file.id,
                source_file_id: file.id,
                code: "VV-001".to_string(),
                is_suppressed: true,
                ..DiagnosticRecord::default()
            })
            .unwrap();
        store
            .insert_diagnostic(&DiagnosticRecord {
                file_id: file.id,
                source_file_id: file.id,
                code: "VV-003".to_string(),
                ..DiagnosticRecord::default()
            })
            .unwrap();

        let published = store.diagnostics_to_publish(file.id).unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].code, "VV-003");
    }

    #[test]
    fn deleting_a_variable_cascades_to_references() {
        let store = store();
        let file = store.ensure_file("a.sqf", 0).unwrap();
        let variable = store
            .insert_variable(&VariableRecord {
                name: "_x".to_string(),
                scope: format!("scope@{}://", file.id),
                file_id: Some(file.id),
                ..VariableRecord::default()
            })
            .unwrap();
        store.insert_reference(&reference(file.id, variable, Access::Set, 3)).unwrap();

        store.delete_variable(variable).unwrap();

        assert!(store.references_at_line(file.id, 3).unwrap().is_empty());
    }

    #[test]
    fn purge_removes_deleted_files_and_their_rows() {
        let store = store();
        let mut file = store.ensure_file("gone.sqf", 0).unwrap();
        store.push_file_history(file.id, "x = 1;", 5, true).unwrap();
        file.is_deleted = true;
        store.update_file(&file).unwrap();

        let purged = store.purge_deleted_files().unwrap();

        assert_eq!(purged, 1);
        assert!(store.file_by_path("gone.sqf").unwrap().is_none());
        assert!(store.latest_file_history(file.id).unwrap().is_none());
    }

    #[test]
    fn opening_on_disk_store_reports_created_then_in_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("sqlite3.db");

        let (_, report) = Store::open(&path).unwrap();
        assert!(report.entries.iter().all(|(_, status)| *status == MigrationStatus::Created));

        let (_, report) = Store::open(&path).unwrap();
        assert!(report.entries.iter().all(|(_, status)| *status == MigrationStatus::InSync));
    }
}

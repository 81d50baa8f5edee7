//! Schema creation and migration.
//!
//! Each table is declared as an ordered column list; migration compares the
//! declaration against the live database and reports, per table, whether it
//! was created, already in sync, extended with new columns, or dropped and
//! recreated. The report is surfaced to the orchestrator at startup.

use rusqlite::Connection;

use crate::error::StoreError;

/// Outcome of migrating one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStatus {
    Created,
    InSync,
    AddedColumns,
    Recreated,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MigrationStatus::Created => "created",
            MigrationStatus::InSync => "in sync",
            MigrationStatus::AddedColumns => "added columns",
            MigrationStatus::Recreated => "recreated",
        };

        write!(f, "{label}")
    }
}

/// Per-table migration outcomes.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub entries: Vec<(&'static str, MigrationStatus)>,
}

impl std::fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schema migration report:")?;
        for (table, status) in &self.entries {
            writeln!(f, "  {table}: {status}")?;
        }

        Ok(())
    }
}

struct TableSchema {
    name: &'static str,
    columns: &'static [(&'static str, &'static str)],
}

const TABLES: &[TableSchema] = &[
    TableSchema {
        name: "files",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("path", "TEXT NOT NULL UNIQUE"),
            ("last_changed", "INTEGER NOT NULL DEFAULT 0"),
            ("is_outdated", "INTEGER NOT NULL DEFAULT 0"),
            ("is_deleted", "INTEGER NOT NULL DEFAULT 0"),
            ("is_ignored", "INTEGER NOT NULL DEFAULT 0"),
        ],
    },
    TableSchema {
        name: "file_history",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("file_id", "INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE"),
            ("content", "TEXT NOT NULL DEFAULT ''"),
            ("created_at", "INTEGER NOT NULL DEFAULT 0"),
            ("is_external", "INTEGER NOT NULL DEFAULT 0"),
        ],
    },
    TableSchema {
        name: "variables",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("name", "TEXT NOT NULL DEFAULT ''"),
            ("scope", "TEXT NOT NULL DEFAULT ''"),
            ("file_id", "INTEGER REFERENCES files(id) ON DELETE CASCADE"),
        ],
    },
    TableSchema {
        name: "refs",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("variable_id", "INTEGER NOT NULL REFERENCES variables(id) ON DELETE CASCADE"),
            ("source_file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("access", "INTEGER NOT NULL DEFAULT 1"),
            ("line", "INTEGER NOT NULL DEFAULT 0"),
            ("col", "INTEGER NOT NULL DEFAULT 0"),
            ("byte_offset", "INTEGER NOT NULL DEFAULT 0"),
            ("length", "INTEGER NOT NULL DEFAULT 0"),
            ("types", "INTEGER NOT NULL DEFAULT 0"),
            ("is_declaration", "INTEGER NOT NULL DEFAULT 0"),
            ("is_magic", "INTEGER NOT NULL DEFAULT 0"),
        ],
    },
    TableSchema {
        name: "diagnostics",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("source_file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("line", "INTEGER NOT NULL DEFAULT 0"),
            ("col", "INTEGER NOT NULL DEFAULT 0"),
            ("byte_offset", "INTEGER NOT NULL DEFAULT 0"),
            ("length", "INTEGER NOT NULL DEFAULT 0"),
            ("severity", "INTEGER NOT NULL DEFAULT 1"),
            ("code", "TEXT NOT NULL DEFAULT ''"),
            ("message", "TEXT NOT NULL DEFAULT ''"),
            ("content", "TEXT NOT NULL DEFAULT ''"),
            ("is_suppressed", "INTEGER NOT NULL DEFAULT 0"),
        ],
    },
    TableSchema {
        name: "file_includes",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("included_file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("including_file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("source_file_id", "INTEGER NOT NULL DEFAULT 0"),
        ],
    },
    TableSchema {
        name: "hovers",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("start_line", "INTEGER NOT NULL DEFAULT 0"),
            ("start_col", "INTEGER NOT NULL DEFAULT 0"),
            ("end_line", "INTEGER NOT NULL DEFAULT 0"),
            ("end_col", "INTEGER NOT NULL DEFAULT 0"),
            ("markdown", "TEXT NOT NULL DEFAULT ''"),
        ],
    },
    TableSchema {
        name: "code_actions",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("file_id", "INTEGER NOT NULL DEFAULT 0"),
            ("kind", "INTEGER NOT NULL DEFAULT 0"),
            ("identifier", "TEXT NOT NULL DEFAULT ''"),
            ("title", "TEXT NOT NULL DEFAULT ''"),
        ],
    },
    TableSchema {
        name: "code_action_changes",
        columns: &[
            ("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
            ("code_action_id", "INTEGER NOT NULL REFERENCES code_actions(id) ON DELETE CASCADE"),
            ("operation", "INTEGER NOT NULL DEFAULT 0"),
            ("path", "TEXT NOT NULL DEFAULT ''"),
            ("old_path", "TEXT"),
            ("start_line", "INTEGER"),
            ("start_col", "INTEGER"),
            ("end_line", "INTEGER"),
            ("end_col", "INTEGER"),
            ("content", "TEXT"),
        ],
    },
];

const INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_refs_variable ON refs(variable_id);
    CREATE INDEX IF NOT EXISTS idx_refs_source ON refs(source_file_id);
    CREATE INDEX IF NOT EXISTS idx_refs_file_line ON refs(file_id, line);
    CREATE INDEX IF NOT EXISTS idx_diagnostics_file ON diagnostics(file_id);
    CREATE INDEX IF NOT EXISTS idx_diagnostics_source ON diagnostics(source_file_id);
    CREATE INDEX IF NOT EXISTS idx_includes_source ON file_includes(source_file_id);
    CREATE INDEX IF NOT EXISTS idx_includes_included ON file_includes(included_file_id);
    CREATE INDEX IF NOT EXISTS idx_variables_scope ON variables(scope);
    CREATE INDEX IF NOT EXISTS idx_history_file ON file_history(file_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_hovers_file ON hovers(file_id);
    CREATE INDEX IF NOT EXISTS idx_actions_file ON code_actions(file_id);
";

fn create_statement(table: &TableSchema) -> String {
    let columns: Vec<String> =
        table.columns.iter().map(|(name, declaration)| format!("{name} {declaration}")).collect();

    format!("CREATE TABLE {} ({})", table.name, columns.join(", "))
}

/// Creates or migrates the schema, returning the per-table report.
pub fn migrate(conn: &Connection) -> Result<MigrationReport, StoreError> {
    let mut report = MigrationReport::default();

    for table in TABLES {
        let status = migrate_table(conn, table)?;
        report.entries.push((table.name, status));
    }

    conn.execute_batch(INDEXES)?;

    Ok(report)
}

fn migrate_table(conn: &Connection, table: &TableSchema) -> Result<MigrationStatus, StoreError> {
    let exists: bool = conn
        .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1", [table.name], |row| {
            row.get::<_, i64>(0)
        })?
        > 0;

    if !exists {
        conn.execute_batch(&create_statement(table))?;
        return Ok(MigrationStatus::Created);
    }

    let mut statement = conn.prepare(&format!("PRAGMA table_info({})", table.name))?;
    let live_columns: Vec<String> =
        statement.query_map([], |row| row.get::<_, String>(1))?.collect::<Result<_, _>>()?;
    drop(statement);

    let wanted: Vec<&str> = table.columns.iter().map(|(name, _)| *name).collect();
    let unknown: Vec<&String> = live_columns.iter().filter(|column| !wanted.contains(&column.as_str())).collect();
    let missing: Vec<&(&str, &str)> =
        table.columns.iter().filter(|(name, _)| !live_columns.iter().any(|column| column == name)).collect();

    if !unknown.is_empty() {
        // A column we no longer know about: rebuild the table. The store is
        // derived state, so dropping it only costs a re-analysis.
        conn.execute_batch(&format!("DROP TABLE {}", table.name))?;
        conn.execute_batch(&create_statement(table))?;
        return Ok(MigrationStatus::Recreated);
    }

    if missing.is_empty() {
        return Ok(MigrationStatus::InSync);
    }

    for (name, declaration) in missing {
        conn.execute_batch(&format!("ALTER TABLE {} ADD COLUMN {name} {declaration}", table.name))?;
    }

    Ok(MigrationStatus::AddedColumns)
}

//! SQLite schema definition
//!
//! Table names are configurable, so the DDL is generated per table. Callers
//! must pass names that passed [`crate::config::is_sql_identifier`].

/// DDL for an index table (active or shadow). Both generations share the
/// exact same shape so the shadow can be renamed into place.
pub fn index_table_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY NOT NULL,
    locator TEXT NOT NULL CHECK (length(locator) > 0),
    locator_hash TEXT NOT NULL UNIQUE CHECK (length(locator_hash) = 64)
);
"#
    )
}

/// DDL for the single-slot rebuild job table, seeded with the idle record
pub fn job_table_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    version INTEGER NOT NULL,
    active INTEGER NOT NULL,
    total_chunks INTEGER NOT NULL,
    pending_json TEXT NOT NULL,
    generation TEXT,
    started_at TEXT,
    updated_at TEXT NOT NULL,
    last_error TEXT
);

INSERT OR IGNORE INTO {table} (slot, version, active, total_chunks, pending_json, updated_at)
VALUES (0, 0, 0, 0, '[]', strftime('%Y-%m-%dT%H:%M:%SZ', 'now'));
"#
    )
}

/// Name of the shadow table built during a rebuild
pub fn shadow_table_name(table: &str) -> String {
    format!("{table}_shadow")
}

/// Name the active table briefly carries while being swapped out
pub fn retired_table_name(table: &str) -> String {
    format!("{table}_retired")
}

/// Name of the rebuild job table belonging to an index table
pub fn job_table_name(table: &str) -> String {
    format!("{table}_job")
}

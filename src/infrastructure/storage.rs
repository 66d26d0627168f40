use crate::infrastructure::error::TrackerError;
use rusqlite::Connection;
use std::path::Path;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Columns added after the first release, per table. Older files get them
/// through `ALTER TABLE` on open.
const ADDED_COLUMNS: [(&str, &[(&str, &str)]); 3] = [
    ("phase", &[("start_date", "TEXT"), ("end_date", "TEXT")]),
    ("week", &[("start_date", "TEXT"), ("end_date", "TEXT")]),
    ("day_plan", &[("notes", "TEXT"), ("scheduled_date", "TEXT")]),
];

/// Creates missing tables, adds missing columns and rewrites legacy status
/// spellings in place.
pub fn initialize_database(path: &Path) -> Result<(), TrackerError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    for (table, columns) in ADDED_COLUMNS {
        ensure_columns(&connection, table, columns)?;
    }
    tracing::debug!(path = %path.display(), "database schema applied");
    Ok(())
}

fn ensure_columns(
    connection: &Connection,
    table: &str,
    columns: &[(&str, &str)],
) -> Result<(), TrackerError> {
    let existing = {
        let mut statement = connection.prepare(&format!("PRAGMA table_info('{table}')"))?;
        statement
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?
    };
    for &(name, sql_type) in columns {
        if !existing.iter().any(|column| column == name) {
            connection.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {name} {sql_type}"))?;
            tracing::info!(table, column = name, "added missing column");
        }
    }
    Ok(())
}

//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.
//! Each named collection of the store is one table; secondary indexes back
//! the scans the repository relies on.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: conversations and messages
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        id               TEXT PRIMARY KEY,
        title            TEXT NOT NULL,
        date             DATETIME NOT NULL,
        source           JSON
    );

    -- rowid doubles as insertion order, the tiebreaker for equal timestamps
    CREATE TABLE IF NOT EXISTS messages (
        id               TEXT PRIMARY KEY,
        conversation_id  TEXT NOT NULL,
        role             TEXT NOT NULL,
        kind             TEXT NOT NULL,
        content          TEXT NOT NULL,
        timestamp        DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversations_date ON conversations(date DESC);
    CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
    "#,
    // Version 2: log records and settings (additive)
    r#"
    CREATE TABLE IF NOT EXISTS logs (
        id               TEXT PRIMARY KEY,
        path             TEXT NOT NULL,
        filename         TEXT NOT NULL,
        format           TEXT,
        timestamp        DATETIME NOT NULL,
        conversation_id  TEXT
    );

    CREATE TABLE IF NOT EXISTS settings (
        id               TEXT PRIMARY KEY,
        value            JSON NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_logs_path ON logs(path);
    CREATE INDEX IF NOT EXISTS idx_logs_conversation ON logs(conversation_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)
                .map_err(crate::error::Error::storage("run_migrations"))?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])
                .map_err(crate::error::Error::storage("run_migrations"))?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    conn.query_row("PRAGMA user_version", [], |r| r.get(0))
        .map_err(crate::error::Error::storage("get_schema_version"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["conversations", "messages", "logs", "settings"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_upgrade_preserves_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();

        // Start a database at version 1 with data in it
        conn.execute_batch(MIGRATIONS[0]).unwrap();
        conn.execute("PRAGMA user_version = 1", []).unwrap();
        conn.execute(
            "INSERT INTO conversations (id, title, date) VALUES ('c1', 'kept', '2024-03-05T00:00:00+00:00')",
            [],
        )
        .unwrap();

        // Upgrading to the current version must not touch it
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let title: String = conn
            .query_row("SELECT title FROM conversations WHERE id='c1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(title, "kept");
    }

    #[test]
    fn test_indexes_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let exists: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_messages_conversation'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(exists, 1);
    }
}

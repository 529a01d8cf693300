//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order.  A
//! `schema_migrations` table tracks which versions have been applied.

use ims_core::{Error, Result};
use rusqlite::Connection;

/// V1: image records plus the tombstones that keep deleted ids from coming back.
const V1_INITIAL: &str = r#"
CREATE TABLE images (
    id           TEXT PRIMARY KEY,
    content_type TEXT NOT NULL,
    size_bytes   INTEGER NOT NULL CHECK (size_bytes >= 0),
    created_at   TEXT NOT NULL
);

CREATE INDEX idx_images_created ON images(created_at, id);

CREATE TABLE image_tombstones (
    id         TEXT PRIMARY KEY,
    deleted_at TEXT NOT NULL
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Run all pending migrations on `conn`.
///
/// Creates the `schema_migrations` tracking table if it does not exist,
/// then applies each outstanding migration inside a transaction.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::metadata(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(Error::metadata)?;

        if already {
            continue;
        }

        let tx = conn.unchecked_transaction().map_err(Error::metadata)?;

        tx.execute_batch(sql)
            .map_err(|e| Error::metadata(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(Error::metadata)?;

        tx.commit().map_err(Error::metadata)?;
        tracing::debug!(version, "Applied metadata migration");
    }

    Ok(())
}

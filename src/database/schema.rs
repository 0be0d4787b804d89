/*!
 * Checkpoint database schema.
 *
 * Two tables: `runs` records every pipeline run, `unit_translations` holds
 * the succeeded translation of each unit keyed by document hash, target
 * language and (page, anchor).
 */

use anyhow::{Context, Result, bail};
use log::{debug, info};
use rusqlite::Connection;

/// Stored in SQLite's `user_version` header field
pub const SCHEMA_VERSION: i32 = 1;

/// Create the checkpoint tables on a fresh database; refuse databases written
/// by a newer build
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    match schema_version(conn)? {
        0 => {
            info!("Creating checkpoint tables (schema v{})", SCHEMA_VERSION);
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn.execute_batch(CHECKPOINT_TABLES)
                .context("Failed to create checkpoint tables")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }
        SCHEMA_VERSION => debug!("Checkpoint schema v{} already present", SCHEMA_VERSION),
        found => bail!(
            "Checkpoint store uses schema v{} but this build understands v{}; point checkpoint.path elsewhere",
            found,
            SCHEMA_VERSION
        ),
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("Failed to read checkpoint schema version")
}

const CHECKPOINT_TABLES: &str = r#"
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            document_hash TEXT NOT NULL,
            source_path TEXT NOT NULL,
            source_language TEXT NOT NULL,
            target_language TEXT NOT NULL,
            pages TEXT NOT NULL,
            total_units INTEGER NOT NULL,
            succeeded_units INTEGER DEFAULT 0,
            failed_units INTEGER DEFAULT 0,
            restored_units INTEGER DEFAULT 0,
            status TEXT DEFAULT 'running',
            started_at TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_runs_document ON runs(document_hash, target_language);

        CREATE TABLE IF NOT EXISTS unit_translations (
            document_hash TEXT NOT NULL,
            target_language TEXT NOT NULL,
            page INTEGER NOT NULL,
            anchor TEXT NOT NULL,
            source_text TEXT NOT NULL,
            translated_text TEXT NOT NULL,
            run_id TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (document_hash, target_language, page, anchor)
        );
"#;

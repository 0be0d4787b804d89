/*!
 * Checkpoint repository.
 *
 * High-level operations over the checkpoint database: recording runs and
 * saving or restoring per-unit translations.
 */

use anyhow::Result;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};

use super::connection::DatabaseConnection;
use super::models::{RunRecord, RunStatus, UnitTranslationRecord, now_timestamp};

/// Repository for checkpoint operations
#[derive(Debug, Clone)]
pub struct Repository {
    db: DatabaseConnection,
}

impl Repository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Repository on the default database location
    pub fn new_default() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_default()?))
    }

    /// Repository on an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::new(DatabaseConnection::new_in_memory()?))
    }

    // =========================================================================
    // Run Operations
    // =========================================================================

    /// Record the start of a run
    pub async fn create_run(&self, run: &RunRecord) -> Result<()> {
        let run = run.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO runs (
                        id, document_hash, source_path, source_language, target_language, pages,
                        total_units, succeeded_units, failed_units, restored_units, status,
                        started_at, finished_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                    "#,
                    params![
                        run.id,
                        run.document_hash,
                        run.source_path,
                        run.source_language,
                        run.target_language,
                        run.pages,
                        run.total_units,
                        run.succeeded_units,
                        run.failed_units,
                        run.restored_units,
                        run.status.to_string(),
                        run.started_at,
                        run.finished_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Record the outcome of a run
    pub async fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        succeeded: i64,
        failed: i64,
        restored: i64,
    ) -> Result<()> {
        let run_id = run_id.to_string();

        self.db
            .execute_async(move |conn| {
                let updated = conn.execute(
                    r#"
                    UPDATE runs
                    SET status = ?2, succeeded_units = ?3, failed_units = ?4, restored_units = ?5, finished_at = ?6
                    WHERE id = ?1
                    "#,
                    params![run_id, status.to_string(), succeeded, failed, restored, now_timestamp()],
                )?;
                if updated == 0 {
                    return Err(anyhow::anyhow!("Unknown run: {}", run_id));
                }
                Ok(())
            })
            .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let run_id = run_id.to_string();

        self.db
            .execute_async(move |conn| {
                let run = conn
                    .query_row(
                        &format!("{} WHERE id = ?1", Self::RUN_COLUMNS),
                        [run_id],
                        Self::map_run,
                    )
                    .optional()?;
                Ok(run)
            })
            .await
    }

    /// Runs of a document into a target language, newest first
    pub async fn list_runs(&self, document_hash: &str, target_language: &str) -> Result<Vec<RunRecord>> {
        let document_hash = document_hash.to_string();
        let target_language = target_language.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE document_hash = ?1 AND target_language = ?2 ORDER BY started_at DESC, rowid DESC",
                    Self::RUN_COLUMNS
                ))?;
                let runs = stmt
                    .query_map(params![document_hash, target_language], Self::map_run)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(runs)
            })
            .await
    }

    const RUN_COLUMNS: &'static str = r#"
        SELECT id, document_hash, source_path, source_language, target_language, pages,
               total_units, succeeded_units, failed_units, restored_units, status,
               started_at, finished_at
        FROM runs"#;

    fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            document_hash: row.get(1)?,
            source_path: row.get(2)?,
            source_language: row.get(3)?,
            target_language: row.get(4)?,
            pages: row.get(5)?,
            total_units: row.get(6)?,
            succeeded_units: row.get(7)?,
            failed_units: row.get(8)?,
            restored_units: row.get(9)?,
            status: row.get::<_, String>(10)?.parse().unwrap_or(RunStatus::Failed),
            started_at: row.get(11)?,
            finished_at: row.get(12)?,
        })
    }

    // =========================================================================
    // Unit Translation Operations
    // =========================================================================

    /// Insert or replace a batch of unit translations in one transaction
    pub async fn save_translations(&self, records: Vec<UnitTranslationRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        self.db
            .transaction_async(move |tx| {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT OR REPLACE INTO unit_translations (
                        document_hash, target_language, page, anchor, source_text,
                        translated_text, run_id, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.document_hash,
                        record.target_language,
                        record.page,
                        record.anchor,
                        record.source_text,
                        record.translated_text,
                        record.run_id,
                        record.updated_at,
                    ])?;
                }
                debug!("Checkpointed {} unit translations", records.len());
                Ok(records.len())
            })
            .await
    }

    /// Every saved translation of a document into `target_language`
    pub async fn load_translations(
        &self,
        document_hash: &str,
        target_language: &str,
    ) -> Result<Vec<UnitTranslationRecord>> {
        let document_hash = document_hash.to_string();
        let target_language = target_language.to_string();

        self.db
            .execute_async(move |conn| Self::load_translations_sync(conn, &document_hash, &target_language))
            .await
    }

    fn load_translations_sync(
        conn: &Connection,
        document_hash: &str,
        target_language: &str,
    ) -> Result<Vec<UnitTranslationRecord>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT document_hash, target_language, page, anchor, source_text,
                   translated_text, run_id, updated_at
            FROM unit_translations
            WHERE document_hash = ?1 AND target_language = ?2
            ORDER BY page, anchor
            "#,
        )?;

        let records = stmt
            .query_map(params![document_hash, target_language], |row| {
                Ok(UnitTranslationRecord {
                    document_hash: row.get(0)?,
                    target_language: row.get(1)?,
                    page: row.get(2)?,
                    anchor: row.get(3)?,
                    source_text: row.get(4)?,
                    translated_text: row.get(5)?,
                    run_id: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Forget every saved translation of a document into `target_language`
    pub async fn clear_translations(&self, document_hash: &str, target_language: &str) -> Result<usize> {
        let document_hash = document_hash.to_string();
        let target_language = target_language.to_string();

        self.db
            .execute_async(move |conn| {
                let removed = conn.execute(
                    "DELETE FROM unit_translations WHERE document_hash = ?1 AND target_language = ?2",
                    params![document_hash, target_language],
                )?;
                Ok(removed)
            })
            .await
    }
}

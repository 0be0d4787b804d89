/*!
 * Tests for the on-disk checkpoint store
 */

use anyhow::Result;
use pdfdual::database::models::now_timestamp;
use pdfdual::database::{DatabaseConnection, Repository, RunRecord, RunStatus, UnitTranslationRecord};

use crate::common;

fn record(page: i64, anchor: &str) -> UnitTranslationRecord {
    UnitTranslationRecord {
        document_hash: "doc".to_string(),
        target_language: "zh".to_string(),
        page,
        anchor: anchor.to_string(),
        source_text: format!("source {}", anchor),
        translated_text: format!("译文 {}", anchor),
        run_id: "run".to_string(),
        updated_at: now_timestamp(),
    }
}

#[test]
fn test_saveTranslations_shouldSurviveReopeningDatabase() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("nested").join("checkpoints.db");

    let run = RunRecord::start("doc", "doc.json", "en", "zh", "1-", 2);
    tokio_test::block_on(async {
        let repository = Repository::new(DatabaseConnection::new(&path)?);
        repository.create_run(&run).await?;
        repository.save_translations(vec![record(1, "b0"), record(2, "b0")]).await?;
        repository.finish_run(&run.id, RunStatus::Completed, 2, 0, 0).await
    })?;

    let (runs, records) = tokio_test::block_on(async {
        let repository = Repository::new(DatabaseConnection::new(&path)?);
        let runs = repository.list_runs("doc", "zh").await?;
        let records = repository.load_translations("doc", "zh").await?;
        anyhow::Ok((runs, records))
    })?;

    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].translated_text, "译文 b0");
    assert_eq!(records[1].page, 2);
    Ok(())
}

/*!
 * Controller runs on extracted documents stored on disk
 */

use anyhow::Result;

use pdfdual::app_controller::Controller;
use pdfdual::database::Repository;
use pdfdual::database::DatabaseConnection;
use pdfdual::errors::ProviderError;
use pdfdual::providers::mock::{MockProvider, MockRequest};

use crate::common;

fn reject_page_two(request: &MockRequest) -> Option<ProviderError> {
    request
        .text
        .ends_with("page 2")
        .then(|| ProviderError::AuthenticationError("key revoked".to_string()))
}

#[tokio::test]
async fn test_run_withDocumentOnDisk_shouldWriteOutputsNextToIt() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::write_document(
        temp_dir.path(),
        "thesis.json",
        &common::sample_document("thesis.pdf", 3, 2),
    )?;
    let provider = MockProvider::working();
    let controller = Controller::with_translator(common::test_config(temp_dir.path()), common::mock_translator(&provider))?;

    let result = controller.run(input.clone(), Controller::default_output_dir(&input)).await?;

    assert_eq!((result.total_units, result.succeeded), (6, 6));
    assert!(temp_dir.path().join("thesis.fr.mono.txt").is_file());
    assert!(temp_dir.path().join("thesis.fr.dual.txt").is_file());
    assert!(temp_dir.path().join("thesis.fr.result.json").is_file());

    let report = result.to_string();
    assert!(report.contains("Dual: "));
    assert!(report.contains("6 succeeded"));
    Ok(())
}

#[tokio::test]
async fn test_run_afterPartialRun_shouldResumeOnlyFailedUnits() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::write_document(
        temp_dir.path(),
        "thesis.json",
        &common::sample_document("thesis.pdf", 3, 1),
    )?;
    let out_dir = temp_dir.path().join("out");

    let rejecting = MockProvider::working().with_failure_rule(reject_page_two);
    let first = Controller::with_translator(common::test_config(temp_dir.path()), common::mock_translator(&rejecting))?
        .run(input.clone(), out_dir.clone())
        .await?;
    assert_eq!((first.succeeded, first.failed), (2, 1));

    let working = MockProvider::working();
    let second = Controller::with_translator(common::test_config(temp_dir.path()), common::mock_translator(&working))?
        .run(input.clone(), out_dir.clone())
        .await?;

    assert_eq!((second.succeeded, second.failed, second.restored), (3, 0, 2));
    assert_eq!(working.request_count(), 1);

    let repository = Repository::new(DatabaseConnection::new(temp_dir.path().join("checkpoints.db"))?);
    let document = pdfdual::ExtractedDocument::load(&input)?;
    let runs = repository.list_runs(&document.content_hash(), "fr").await?;
    assert_eq!(runs.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_run_withResumeDisabled_shouldTranslateAgain() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::write_document(
        temp_dir.path(),
        "thesis.json",
        &common::sample_document("thesis.pdf", 2, 1),
    )?;

    let provider = MockProvider::working();
    for resume in [true, false] {
        Controller::with_translator(common::test_config(temp_dir.path()), common::mock_translator(&provider))?
            .with_resume(resume)
            .run(input.clone(), temp_dir.path().to_path_buf())
            .await?;
    }

    assert_eq!(provider.request_count(), 4);
    Ok(())
}

#[tokio::test]
async fn test_runFolder_shouldTranslateEveryDocumentAndSkipOwnOutputs() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input_dir = temp_dir.path().join("papers");
    std::fs::create_dir_all(&input_dir)?;
    common::write_document(&input_dir, "a.json", &common::sample_document("a.pdf", 2, 1))?;
    common::write_document(&input_dir, "b.json", &common::sample_document("b.pdf", 1, 1))?;
    common::create_test_file(&input_dir, "broken.json", "not json")?;
    common::create_test_file(&input_dir, "old.fr.result.json", "{}")?;

    let mut config = common::test_config(temp_dir.path());
    config.checkpoint.enabled = false;
    let provider = MockProvider::working();
    let controller = Controller::with_translator(config, common::mock_translator(&provider))?;

    let summary = controller.run_folder(input_dir.clone(), None).await?;

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors[0].0.ends_with("broken.json"));
    assert_eq!(provider.request_count(), 3);
    assert!(input_dir.join("a.fr.mono.txt").is_file());
    assert!(input_dir.join("b.fr.dual.txt").is_file());
    Ok(())
}

#[tokio::test]
async fn test_runFolder_withRejectedCredentials_shouldStopBeforeAnyDocument() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input_dir = temp_dir.path().join("papers");
    std::fs::create_dir_all(&input_dir)?;
    common::write_document(&input_dir, "a.json", &common::sample_document("a.pdf", 2, 1))?;
    common::write_document(&input_dir, "b.json", &common::sample_document("b.pdf", 1, 1))?;

    let mut config = common::test_config(temp_dir.path());
    config.checkpoint.enabled = false;
    let provider = MockProvider::unauthorized();
    let controller = Controller::with_translator(config, common::mock_translator(&provider))?;

    let error = controller.run_folder(input_dir.clone(), None).await.unwrap_err();

    assert!(format!("{:#}", error).contains("Translation engine check failed"));
    assert_eq!(provider.request_count(), 0);
    assert!(!input_dir.join("a.fr.mono.txt").exists());
    assert!(!input_dir.join("b.fr.mono.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_run_withBadPageRange_shouldFailBeforeDispatch() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::write_document(
        temp_dir.path(),
        "thesis.json",
        &common::sample_document("thesis.pdf", 2, 1),
    )?;
    let mut config = common::test_config(temp_dir.path());
    config.pdf.pages = Some("1-5".to_string());
    let provider = MockProvider::working();
    let controller = Controller::with_translator(config, common::mock_translator(&provider))?;

    let error = controller.run(input, temp_dir.path().join("out")).await.unwrap_err();

    assert!(format!("{:#}", error).contains("1-5"));
    assert_eq!(provider.request_count(), 0);
    assert!(!temp_dir.path().join("out").exists());
    Ok(())
}

/*!
 * End-to-end pipeline runs against the mock engine
 */

use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

use pdfdual::PipelineError;
use pdfdual::errors::ProviderError;
use pdfdual::pipeline::{CancellationToken, Layout, OutputVariant, PageSelector, Stage, TranslationResult, WatermarkMode};
use pdfdual::providers::mock::{MockProvider, MockRequest};

use crate::common;

fn reject_pages_three_and_four(request: &MockRequest) -> Option<ProviderError> {
    (request.text.ends_with("page 3") || request.text.ends_with("page 4"))
        .then(|| ProviderError::InvalidRequest("content policy".to_string()))
}

#[tokio::test(start_paused = true)]
async fn test_translate_withQpsTwo_shouldNeverExceedTwoRequestsPerSecond() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::working();
    let document = common::sample_document("paper.pdf", 9, 1);

    let started = Instant::now();
    let result = common::mock_pipeline(&provider, common::pipeline_config(2))
        .translate(&document, temp_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.succeeded, 9);
    assert_eq!(provider.request_count(), 9);
    assert!(provider.max_requests_in_window(Duration::from_secs(1)) <= 2);
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_translate_withTransientOutage_shouldRetryAndSucceed() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::flaky(2);
    let document = common::sample_document("paper.pdf", 3, 1);

    let result = common::mock_pipeline(&provider, common::pipeline_config(10))
        .translate(&document, temp_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((result.succeeded, result.failed), (3, 0));
    assert_eq!(provider.request_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_translate_withWatermarkBoth_shouldWriteFourVariants() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::working();
    let mut config = common::pipeline_config(10);
    config.output.watermark_mode = WatermarkMode::Both;
    let document = common::sample_document("paper.pdf", 2, 2);

    let result = common::mock_pipeline(&provider, config)
        .translate(&document, temp_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    for name in [
        "paper.fr.mono.txt",
        "paper.fr.dual.txt",
        "paper.no_watermark.fr.mono.txt",
        "paper.no_watermark.fr.dual.txt",
    ] {
        assert!(temp_dir.path().join(name).is_file(), "{} missing", name);
    }
    assert_eq!(result.produced_paths().len(), 4);

    let marked = std::fs::read_to_string(result.path_for(OutputVariant::new(Layout::Dual, true)).unwrap()).unwrap();
    let clean = std::fs::read_to_string(result.path_for(OutputVariant::new(Layout::Dual, false)).unwrap()).unwrap();
    assert!(marked.contains("Machine translation en -> fr"));
    assert!(!clean.contains("Machine translation"));
    assert!(clean.contains("Paragraph 2 of page 2\n[TRANSLATED to fr] Paragraph 2 of page 2"));
}

#[tokio::test(start_paused = true)]
async fn test_translate_withOnePartRejected_shouldFailWholeRunWithoutOutputs() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::working().with_failure_rule(reject_pages_three_and_four);
    let mut config = common::pipeline_config(10);
    config.max_pages_per_part = Some(2);
    let document = common::sample_document("paper.pdf", 6, 1);

    let error = common::mock_pipeline(&provider, config)
        .translate(&document, temp_dir.path(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PipelineError::SystemicFailure { part: 1, first_page: 3, last_page: 4, .. }
    ));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_translate_withPartlyRejectedPart_shouldFallBackPerUnit() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::working().with_failure_rule(reject_pages_three_and_four);
    let mut config = common::pipeline_config(10);
    config.max_pages_per_part = Some(3);
    let document = common::sample_document("paper.pdf", 6, 1);

    let result = common::mock_pipeline(&provider, config)
        .translate(&document, temp_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!((result.succeeded, result.failed), (4, 2));
    let failed_pages: Vec<usize> = result.failed_units.iter().map(|f| f.page).collect();
    assert_eq!(failed_pages, vec![3, 4]);
    assert_eq!(provider.request_count(), 6);

    let mono = std::fs::read_to_string(result.mono_path.as_ref().unwrap()).unwrap();
    let page_three = mono.find("[untranslated] Paragraph 1 of page 3").unwrap();
    let page_five = mono.find("[TRANSLATED to fr] Paragraph 1 of page 5").unwrap();
    assert!(page_three < page_five);
}

#[tokio::test(start_paused = true)]
async fn test_translate_withPageSelection_shouldWriteOnlySelectedPagesAndResultFile() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::working();
    let mut config = common::pipeline_config(10);
    config.pages = Some(PageSelector::parse("-2,5").unwrap());
    config.output.dual = false;
    let document = common::sample_document("paper.pdf", 6, 1);

    let result = common::mock_pipeline(&provider, config)
        .translate(&document, temp_dir.path(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.pages, vec![1, 2, 5]);
    assert!(result.dual_path.is_none());

    let saved: TranslationResult = serde_json::from_str(
        &std::fs::read_to_string(temp_dir.path().join("paper.fr.result.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved.pages, vec![1, 2, 5]);
    assert_eq!(saved.succeeded, 3);
    assert_eq!(saved.mono_path, result.mono_path);
}

#[tokio::test(start_paused = true)]
async fn test_progress_withSlowEngine_shouldReachCompleteMonotonically() {
    common::init_logging();
    let temp_dir = common::create_temp_dir().unwrap();
    let provider = MockProvider::slow(300);
    let document = common::sample_document("paper.pdf", 4, 2);

    let mut run = common::mock_pipeline(&provider, common::pipeline_config(4))
        .start(&document, temp_dir.path(), CancellationToken::new())
        .unwrap();
    let snapshots: Vec<_> = run.take_progress().unwrap().collect().await;
    let result = run.wait().await.unwrap();

    assert!(!snapshots.is_empty());
    assert!(snapshots.windows(2).all(|w| w[0].overall_progress <= w[1].overall_progress));
    let last = snapshots.last().unwrap();
    assert_eq!(last.stage, Stage::Assembling);
    assert_eq!(last.succeeded, 8);
    assert_eq!(result.succeeded, 8);
}

/*!
 * Common test utilities for the pdfdual test suite
 */

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use pdfdual::app_config::Config;
use pdfdual::pipeline::{DispatchConfig, PipelineConfig, RetryPolicy, TranslationPipeline};
use pdfdual::providers::mock::MockProvider;
use pdfdual::{ExtractedDocument, TextBlock, TranslationService, Translator};

/// Route library logs through env_logger; repeated calls are no-ops
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Document with `blocks_per_page` blocks on every page.
///
/// Block text is `"Paragraph <n> of page <p>"`, long enough to be sent to the
/// engine under the default minimum length.
pub fn sample_document(source: &str, pages: usize, blocks_per_page: usize) -> ExtractedDocument {
    let blocks = (1..=pages)
        .flat_map(|page| {
            (1..=blocks_per_page).map(move |n| TextBlock {
                page,
                anchor: format!("p{}-b{}", page, n),
                text: format!("Paragraph {} of page {}", n, page),
            })
        })
        .collect();
    ExtractedDocument::new(source, pages, blocks)
}

/// Writes `document` as JSON into `dir`
pub fn write_document(dir: &Path, filename: &str, document: &ExtractedDocument) -> Result<PathBuf> {
    let content = serde_json::to_string_pretty(document)?;
    create_test_file(dir, filename, &content)
}

/// Pipeline config translating en -> fr without backoff jitter
pub fn pipeline_config(qps: u32) -> PipelineConfig {
    PipelineConfig {
        dispatch: DispatchConfig {
            qps,
            retry: RetryPolicy::default().without_jitter(),
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            ..DispatchConfig::default()
        },
        ..PipelineConfig::default()
    }
}

/// Translator backed by `provider`; clones share the request counters
pub fn mock_translator(provider: &MockProvider) -> Arc<dyn Translator> {
    Arc::new(TranslationService::new(provider.clone()))
}

pub fn mock_pipeline(provider: &MockProvider, config: PipelineConfig) -> TranslationPipeline {
    TranslationPipeline::new(mock_translator(provider), config).expect("valid pipeline config")
}

/// Valid application config with its checkpoint database inside `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.source_language = "en".to_string();
    config.target_language = "fr".to_string();
    config.translation.openai_api_key = "sk-test".to_string();
    config.translation.qps = 50;
    config.translation.retry_backoff_ms = 10;
    config.checkpoint.path = Some(dir.join("checkpoints.db"));
    config
}

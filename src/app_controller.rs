use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::{Config, TranslationEngine};
use crate::database::{DatabaseConnection, Repository};
use crate::document::ExtractedDocument;
use crate::file_utils::FileManager;
use crate::pipeline::{CancellationToken, ProgressSnapshot, TranslationPipeline, TranslationResult};
use crate::providers::openai::OpenAI;
use crate::translation::{TranslationCache, TranslationService, Translator};

// @module: Application controller for document translation

/// Outcome of translating every document in a folder
#[derive(Debug, Default)]
pub struct FolderSummary {
    pub results: Vec<TranslationResult>,
    pub errors: Vec<(PathBuf, String)>,
}

impl FolderSummary {
    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    /// Documents that produced outputs but fell back on some units
    pub fn partial(&self) -> usize {
        self.results.iter().filter(|r| r.is_partial()).count()
    }
}

/// Main application controller for document translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Engine shared by every run of this controller
    translator: Arc<dyn Translator>,
    // @field: Checkpoint store, if enabled
    checkpoint: Option<Repository>,
    resume: bool,
}

impl Controller {
    // @method: Create a controller talking to the configured engine
    pub fn with_config(config: Config) -> Result<Self> {
        let translator = Self::build_translator(&config)?;
        Self::with_translator(config, translator)
    }

    /// Create a controller around an existing translator
    pub fn with_translator(config: Config, translator: Arc<dyn Translator>) -> Result<Self> {
        let checkpoint = Self::open_checkpoint(&config)?;
        Ok(Self {
            config,
            translator,
            checkpoint,
            resume: true,
        })
    }

    /// Restore checkpointed units before dispatching (default on)
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn build_translator(config: &Config) -> Result<Arc<dyn Translator>> {
        let t = &config.translation;
        match t.engine {
            TranslationEngine::OpenAI => {
                let provider = OpenAI::new(
                    t.openai_api_key.clone(),
                    t.openai_base_url.clone(),
                    t.openai_model.clone(),
                    Duration::from_secs(t.timeout_secs),
                )?
                .with_temperature(t.temperature);
                debug!("Using {} engine with model {}", t.engine.display_name(), provider.model());
                let service = TranslationService::new(provider).with_cache(TranslationCache::new(t.enable_cache));
                Ok(Arc::new(service))
            }
        }
    }

    fn open_checkpoint(config: &Config) -> Result<Option<Repository>> {
        if !config.checkpoint.enabled {
            return Ok(None);
        }
        let connection = match &config.checkpoint.path {
            Some(path) => DatabaseConnection::new(path)?,
            None => DatabaseConnection::new_default()?,
        };
        debug!("Checkpoint database: {:?}", connection.path());
        Ok(Some(Repository::new(connection)))
    }

    fn pipeline(&self) -> Result<TranslationPipeline> {
        let mut pipeline_config = self.config.pipeline_config()?;
        pipeline_config.resume = self.resume;

        let pipeline = TranslationPipeline::new(Arc::clone(&self.translator), pipeline_config)?;
        Ok(match &self.checkpoint {
            Some(repository) => pipeline.with_checkpoint(repository.clone()),
            None => pipeline,
        })
    }

    /// Translate one extracted document into `output_dir`
    pub async fn run(&self, input_file: PathBuf, output_dir: PathBuf) -> Result<TranslationResult> {
        let multi_progress = MultiProgress::new();
        self.run_with_progress(input_file, output_dir, &multi_progress).await
    }

    /// Run the pipeline with a progress bar, cancelling on Ctrl-C
    async fn run_with_progress(
        &self,
        input_file: PathBuf,
        output_dir: PathBuf,
        multi_progress: &MultiProgress,
    ) -> Result<TranslationResult> {
        let start_time = std::time::Instant::now();

        if !FileManager::file_exists(&input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }

        let document = ExtractedDocument::load(&input_file)?;
        info!(
            "Translating {:?} ({} pages) from {} to {}",
            document.source, document.page_count, self.config.source_language, self.config.target_language
        );

        let cancel = CancellationToken::new();
        let mut run = self.pipeline()?.start(&document, &output_dir, cancel.clone())?;

        let signal_cancel = cancel.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping in-flight requests and writing partial outputs");
                signal_cancel.cancel();
            }
        });

        if let Some(mut progress) = run.take_progress() {
            let progress_bar = multi_progress.add(ProgressBar::new(0));
            let template_result = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} units ({percent}%) {msg} {eta}")
                .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            progress_bar.set_style(template_result.progress_chars("█▓▒░"));

            while let Some(snapshot) = progress.next().await {
                Self::update_progress_bar(&progress_bar, &snapshot);
            }
            progress_bar.finish_and_clear();
        }

        let outcome = run.wait().await;
        signal_task.abort();
        let result = outcome.with_context(|| format!("Failed to translate {:?}", input_file))?;

        for failure in &result.failed_units {
            error!(
                "Unit {} on page {} kept its original text ({}: {})",
                failure.anchor, failure.page, failure.kind, failure.message
            );
        }
        if result.is_partial() {
            warn!("{} of {} units fell back to the original text", result.failed, result.total_units);
        }
        info!(
            "Finished {:?} in {}",
            input_file,
            Self::format_duration(start_time.elapsed())
        );

        Ok(result)
    }

    fn update_progress_bar(progress_bar: &ProgressBar, snapshot: &ProgressSnapshot) {
        progress_bar.set_length(snapshot.total as u64);
        progress_bar.set_position((snapshot.succeeded + snapshot.failed) as u64);
        if snapshot.failed > 0 {
            progress_bar.set_message(format!("{} ({} failed)", snapshot.stage, snapshot.failed));
        } else {
            progress_bar.set_message(snapshot.stage.to_string());
        }
    }

    // Format duration in a human-readable format (HH:MM:SS)
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }

    /// Translate every extracted document found under `input_dir`.
    ///
    /// Outputs go to `output_dir`, or next to each document when `None`. A
    /// document that fails does not stop the others.
    pub async fn run_folder(&self, input_dir: PathBuf, output_dir: Option<PathBuf>) -> Result<FolderSummary> {
        let start_time = std::time::Instant::now();

        if !FileManager::dir_exists(&input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let documents = FileManager::find_extracted_documents(&input_dir)?;
        if documents.is_empty() {
            return Err(anyhow!("No extracted documents found in directory: {:?}", input_dir));
        }

        // Fail once up front instead of once per document
        self.translator
            .check_connection()
            .await
            .context("Translation engine check failed")?;
        debug!("Translation engine reachable, processing {} documents", documents.len());

        let multi_progress = MultiProgress::new();
        let folder_pb = multi_progress.add(ProgressBar::new(documents.len() as u64));
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        folder_pb.set_style(template_result.progress_chars("█▓▒░"));

        let mut summary = FolderSummary::default();
        for document in &documents {
            let file_name = document
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            folder_pb.set_message(format!("Processing: {}", file_name));

            let target_dir = match (&output_dir, document.parent()) {
                (Some(dir), _) => dir.clone(),
                (None, Some(parent)) => parent.to_path_buf(),
                (None, None) => input_dir.clone(),
            };

            match self.run_with_progress(document.clone(), target_dir, &multi_progress).await {
                Ok(result) => summary.results.push(result),
                Err(e) => {
                    error!("Error processing file {}: {:#}", file_name, e);
                    summary.errors.push((document.clone(), format!("{:#}", e)));
                }
            }
            folder_pb.inc(1);
        }

        folder_pb.finish_with_message("Folder processing complete");
        info!(
            "Folder processing completed in {}: {} translated ({} partial), {} errors",
            Self::format_duration(start_time.elapsed()),
            summary.succeeded(),
            summary.partial(),
            summary.errors.len()
        );

        Ok(summary)
    }

    /// Default output directory for a single document: next to it
    pub fn default_output_dir(input_file: &Path) -> PathBuf {
        input_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

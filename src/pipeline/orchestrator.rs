/*!
 * Pipeline orchestrator.
 *
 * Wires the four stages together for one extracted document:
 *
 * 1. Segmenting: the page selection is resolved and split into parts. Range
 *    errors surface synchronously from `TranslationPipeline::start`.
 * 2. Translating: units with a checkpointed translation are restored, the
 *    rest go through the dispatcher. Every ticket transition feeds the
 *    progress aggregator and the ledger; engine translations are saved to the
 *    checkpoint store as they arrive.
 * 3. Assembling: the ledger is merged back into page order and the output
 *    variants are written.
 *
 * The run itself executes on a spawned task. `PipelineRun` hands out the
 * progress stream and the final `TranslationResult`.
 */

use futures::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::assembler::{Assembler, OutputOptions, OutputTarget, RunMetrics, TranslationResult};
use super::dispatcher::{DispatchConfig, DispatchTicket, Dispatcher, TicketOrigin, TicketState};
use super::memory::PeakMemorySampler;
use super::progress::{ProgressAggregator, ProgressStream, Stage};
use super::segmenter::{PageSelector, Part, segment};
use crate::database::{Repository, RunRecord, RunStatus, UnitTranslationRecord};
use crate::database::models::now_timestamp;
use crate::document::{ExtractedDocument, TranslationUnit, UnitKey};
use crate::errors::PipelineError;
use crate::translation::Translator;

/// Immutable configuration of a pipeline, validated once at construction
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Rate limit, retry policy, languages and prompt
    pub dispatch: DispatchConfig,
    /// Page selection; `None` selects every page
    pub pages: Option<PageSelector>,
    /// Pages per part; `None` or `<= 0` means a single part
    pub max_pages_per_part: Option<i64>,
    pub output: OutputOptions,
    pub auto_extract_glossary: bool,
    /// Restore checkpointed translations before dispatching
    pub resume: bool,
    /// Resident memory sampling interval during dispatch
    pub memory_sample_interval: Duration,
    /// Succeeded units buffered before a checkpoint write
    pub checkpoint_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            pages: None,
            max_pages_per_part: None,
            output: OutputOptions::default(),
            auto_extract_glossary: false,
            resume: true,
            memory_sample_interval: Duration::from_secs(1),
            checkpoint_batch_size: 16,
        }
    }
}

impl PipelineConfig {
    /// Reject unusable settings before anything is dispatched
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.dispatch.qps == 0 {
            return Err(PipelineError::InvalidOptions("qps must be greater than zero".to_string()));
        }
        if self.dispatch.source_language.trim().is_empty() || self.dispatch.target_language.trim().is_empty() {
            return Err(PipelineError::InvalidOptions(
                "source and target language are required".to_string(),
            ));
        }
        if self.memory_sample_interval.is_zero() {
            return Err(PipelineError::InvalidOptions(
                "memory sample interval must be greater than zero".to_string(),
            ));
        }
        self.output.validate()
    }
}

/// Translates extracted documents
#[derive(Clone)]
pub struct TranslationPipeline {
    dispatcher: Dispatcher,
    config: Arc<PipelineConfig>,
    checkpoint: Option<Repository>,
}

impl TranslationPipeline {
    pub fn new(translator: Arc<dyn Translator>, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            dispatcher: Dispatcher::new(translator, config.dispatch.clone()),
            config: Arc::new(config),
            checkpoint: None,
        })
    }

    /// Persist and restore unit translations through `repository`
    pub fn with_checkpoint(mut self, repository: Repository) -> Self {
        self.checkpoint = Some(repository);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start translating `document` into `output_dir`.
    ///
    /// Segmentation runs before this returns, so a bad page selection fails
    /// here without anything being dispatched. Must be called within a tokio
    /// runtime.
    pub fn start(
        &self,
        document: &ExtractedDocument,
        output_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<PipelineRun, PipelineError> {
        let started = Instant::now();
        let units = document.units();
        let parts = segment(
            &units,
            document.page_count,
            self.config.pages.as_ref(),
            self.config.max_pages_per_part,
        )?;

        let total: usize = parts.iter().map(|p| p.units.len()).sum();
        info!(
            "Segmented {:?}: {} pages selected in {} parts, {} units",
            document.source,
            parts.iter().map(|p| p.pages.len()).sum::<usize>(),
            parts.len(),
            total
        );

        let mut aggregator = ProgressAggregator::new(total);
        aggregator.set_stage_progress(1.0);
        let progress = aggregator.subscribe();

        let dispatch = &self.config.dispatch;
        let target = OutputTarget::new(
            output_dir,
            &document.source,
            dispatch.source_language.clone(),
            dispatch.target_language.clone(),
        );
        let assembler =
            Assembler::new(self.config.output, target)?.with_glossary(self.config.auto_extract_glossary);

        let run = PipelineTask {
            dispatcher: self.dispatcher.clone(),
            config: Arc::clone(&self.config),
            checkpoint: self.checkpoint.clone(),
            document_hash: document.content_hash(),
            source: document.source.clone(),
            parts,
            aggregator,
            assembler,
            cancel: cancel.clone(),
            started,
        };

        Ok(PipelineRun {
            progress: Some(progress),
            cancel,
            handle: tokio::spawn(run.execute()),
        })
    }

    /// Translate `document` and wait for the result
    pub async fn translate(
        &self,
        document: &ExtractedDocument,
        output_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Result<TranslationResult, PipelineError> {
        self.start(document, output_dir, cancel)?.wait().await
    }
}

/// Handle on a running pipeline
pub struct PipelineRun {
    progress: Option<ProgressStream>,
    cancel: CancellationToken,
    handle: JoinHandle<Result<TranslationResult, PipelineError>>,
}

impl PipelineRun {
    /// Progress snapshots of this run. Available once.
    pub fn take_progress(&mut self) -> Option<ProgressStream> {
        self.progress.take()
    }

    /// Ask the run to stop dispatching
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the final result
    pub async fn wait(self) -> Result<TranslationResult, PipelineError> {
        self.handle
            .await
            .map_err(|e| PipelineError::Dispatch(format!("pipeline task failed: {}", e)))?
    }
}

struct PipelineTask {
    dispatcher: Dispatcher,
    config: Arc<PipelineConfig>,
    checkpoint: Option<Repository>,
    document_hash: String,
    source: PathBuf,
    parts: Vec<Part>,
    aggregator: ProgressAggregator,
    assembler: Assembler,
    cancel: CancellationToken,
    started: Instant,
}

fn checkpoint_error(error: anyhow::Error) -> PipelineError {
    PipelineError::Checkpoint(format!("{:#}", error))
}

impl PipelineTask {
    async fn execute(mut self) -> Result<TranslationResult, PipelineError> {
        let units: Vec<TranslationUnit> = self.parts.iter().flat_map(|p| p.units.iter().cloned()).collect();
        let run = self.begin_run(units.len()).await?;

        let outcome = self.run(&units, run.as_ref()).await;

        if let (Some(repository), Some(run)) = (&self.checkpoint, &run) {
            let (status, succeeded, failed, restored) = match &outcome {
                Ok(result) if result.is_partial() => (RunStatus::Partial, result.succeeded, result.failed, result.restored),
                Ok(result) => (RunStatus::Completed, result.succeeded, result.failed, result.restored),
                Err(_) => (RunStatus::Failed, 0, 0, 0),
            };
            if let Err(e) = repository
                .finish_run(&run.id, status, succeeded as i64, failed as i64, restored as i64)
                .await
            {
                warn!("Could not record run outcome: {:#}", e);
            }
        }

        outcome
    }

    async fn begin_run(&self, total_units: usize) -> Result<Option<RunRecord>, PipelineError> {
        let Some(repository) = &self.checkpoint else {
            return Ok(None);
        };
        let pages = self
            .config
            .pages
            .as_ref()
            .map(|p| p.expression().to_string())
            .unwrap_or_else(|| "all".to_string());
        let run = RunRecord::start(
            self.document_hash.clone(),
            self.source.to_string_lossy(),
            self.config.dispatch.source_language.clone(),
            self.config.dispatch.target_language.clone(),
            pages,
            total_units as i64,
        );
        repository.create_run(&run).await.map_err(checkpoint_error)?;
        debug!("Started run {}", run.id);
        Ok(Some(run))
    }

    /// Checkpointed translations whose source text still matches the unit
    async fn restore(&self, units: &[TranslationUnit]) -> Result<HashMap<UnitKey, DispatchTicket>, PipelineError> {
        let repository = match &self.checkpoint {
            Some(repository) if self.config.resume => repository,
            _ => return Ok(HashMap::new()),
        };

        let saved = repository
            .load_translations(&self.document_hash, &self.config.dispatch.target_language)
            .await
            .map_err(checkpoint_error)?;
        let saved: HashMap<(usize, &str), &UnitTranslationRecord> = saved
            .iter()
            .filter_map(|r| usize::try_from(r.page).ok().map(|page| ((page, r.anchor.as_str()), r)))
            .collect();

        let restored: HashMap<UnitKey, DispatchTicket> = units
            .iter()
            .filter_map(|unit| {
                saved
                    .get(&(unit.page(), unit.anchor()))
                    .filter(|record| record.source_text == unit.text())
                    .map(|record| (unit.key().clone(), DispatchTicket::restored(unit, record.translated_text.clone())))
            })
            .collect();

        if !restored.is_empty() {
            info!("Resuming: {} of {} units restored from checkpoint", restored.len(), units.len());
        }
        Ok(restored)
    }

    async fn save(&self, batch: &mut Vec<UnitTranslationRecord>) {
        let Some(repository) = &self.checkpoint else {
            batch.clear();
            return;
        };
        if batch.is_empty() {
            return;
        }
        if let Err(e) = repository.save_translations(std::mem::take(batch)).await {
            warn!("Could not checkpoint translations: {:#}", e);
        }
    }

    async fn run(
        &mut self,
        units: &[TranslationUnit],
        run: Option<&RunRecord>,
    ) -> Result<TranslationResult, PipelineError> {
        let by_key: HashMap<&UnitKey, &TranslationUnit> = units.iter().map(|u| (u.key(), u)).collect();
        let mut ledger = self.restore(units).await?;

        self.aggregator.set_stage(Stage::Translating);
        let mut restored: Vec<&DispatchTicket> = ledger.values().collect();
        restored.sort_by_key(|t| t.order);
        for ticket in restored {
            self.aggregator.observe(ticket);
        }

        let pending: Vec<TranslationUnit> = units.iter().filter(|u| !ledger.contains_key(u.key())).cloned().collect();
        let sampler = PeakMemorySampler::start(self.config.memory_sample_interval);
        let mut stream = self.dispatcher.dispatch(pending, self.cancel.clone());
        let mut batch: Vec<UnitTranslationRecord> = Vec::new();

        while let Some(ticket) = stream.next().await {
            self.aggregator.observe(&ticket);

            if ticket.state == TicketState::Succeeded && ticket.origin == TicketOrigin::Engine {
                if let (Some(unit), Some(output), Some(run)) = (by_key.get(&ticket.key), &ticket.output, run) {
                    batch.push(UnitTranslationRecord {
                        document_hash: self.document_hash.clone(),
                        target_language: self.config.dispatch.target_language.clone(),
                        page: unit.page() as i64,
                        anchor: unit.anchor().to_string(),
                        source_text: unit.text().to_string(),
                        translated_text: output.clone(),
                        run_id: run.id.clone(),
                        updated_at: now_timestamp(),
                    });
                }
                if batch.len() >= self.config.checkpoint_batch_size.max(1) {
                    self.save(&mut batch).await;
                }
            }

            ledger.insert(ticket.key.clone(), ticket);
        }
        self.save(&mut batch).await;
        let peak_memory_usage = sampler.stop();

        if self.cancel.is_cancelled() {
            warn!("Run cancelled, assembling what was translated");
        }

        self.aggregator.set_stage(Stage::Assembling);
        let metrics = RunMetrics {
            total_seconds: self.started.elapsed().as_secs_f64(),
            peak_memory_usage,
        };
        let mut result = self.assembler.assemble(&self.source, &self.parts, &ledger, metrics)?;
        result.total_seconds = self.started.elapsed().as_secs_f64();
        self.aggregator.set_stage_progress(1.0);

        write_result_file(&mut result, &self.assembler.target().result_path());
        info!(
            "Finished {:?} in {:.2}s: {} succeeded, {} failed",
            self.source, result.total_seconds, result.succeeded, result.failed
        );
        Ok(result)
    }
}

fn write_result_file(result: &mut TranslationResult, path: &Path) {
    if let Err(e) = result.save(path) {
        warn!("Could not write result summary: {:#}", e);
        result.output_failures.push(super::assembler::OutputFailure {
            output: "result".to_string(),
            error: format!("{:#}", e),
        });
    }
}

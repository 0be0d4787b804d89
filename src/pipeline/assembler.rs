/*!
 * Result assembly.
 *
 * Merges the terminal tickets of every part back into page order, checks that
 * nothing is missing, writes the requested output variants and builds the
 * final `TranslationResult`.
 *
 * Output variants are independent: a variant that cannot be written is
 * recorded in `TranslationResult::output_failures` and the others are still
 * produced. Missing tickets and systemic engine failures abort assembly
 * before any file is written.
 */

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::dispatcher::{DispatchTicket, TicketOrigin, TicketState};
use super::render::{RenderContext, render_variant};
use super::segmenter::Part;
use crate::document::UnitKey;
use crate::errors::PipelineError;
use crate::file_utils::FileManager;

/// Longest source text, in characters, that is considered a glossary term
pub const GLOSSARY_MAX_TERM_CHARS: usize = 48;

/// Which watermark variants to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkMode {
    #[default]
    Watermarked,
    NoWatermark,
    Both,
}

impl WatermarkMode {
    pub fn includes_watermarked(self) -> bool {
        matches!(self, Self::Watermarked | Self::Both)
    }

    pub fn includes_no_watermark(self) -> bool {
        matches!(self, Self::NoWatermark | Self::Both)
    }
}

impl fmt::Display for WatermarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Watermarked => "watermarked",
            Self::NoWatermark => "no_watermark",
            Self::Both => "both",
        };
        f.write_str(name)
    }
}

impl FromStr for WatermarkMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "watermarked" => Ok(Self::Watermarked),
            "no_watermark" => Ok(Self::NoWatermark),
            "both" => Ok(Self::Both),
            other => Err(PipelineError::InvalidOptions(format!(
                "unknown watermark mode '{}' (expected watermarked, no_watermark or both)",
                other
            ))),
        }
    }
}

/// Page layout of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Translation only
    Mono,
    /// Original and translation interleaved
    Dual,
}

/// One concrete output file kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputVariant {
    pub layout: Layout,
    pub watermarked: bool,
}

impl OutputVariant {
    pub fn new(layout: Layout, watermarked: bool) -> Self {
        Self { layout, watermarked }
    }

    /// Stable identifier used in logs and result files
    pub fn name(&self) -> &'static str {
        match (self.layout, self.watermarked) {
            (Layout::Mono, true) => "mono",
            (Layout::Dual, true) => "dual",
            (Layout::Mono, false) => "no_watermark_mono",
            (Layout::Dual, false) => "no_watermark_dual",
        }
    }
}

impl fmt::Display for OutputVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which outputs the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputOptions {
    pub dual: bool,
    pub mono: bool,
    pub watermark_mode: WatermarkMode,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dual: true,
            mono: true,
            watermark_mode: WatermarkMode::default(),
        }
    }
}

impl OutputOptions {
    /// Reject option sets that would produce no output
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.dual && !self.mono {
            return Err(PipelineError::InvalidOptions(
                "both dual and mono output are disabled, nothing to produce".to_string(),
            ));
        }
        Ok(())
    }

    /// Requested variants in a fixed order
    pub fn variants(&self) -> Vec<OutputVariant> {
        let mut variants = Vec::with_capacity(4);
        for watermarked in [true, false] {
            let wanted = if watermarked {
                self.watermark_mode.includes_watermarked()
            } else {
                self.watermark_mode.includes_no_watermark()
            };
            if !wanted {
                continue;
            }
            if self.dual {
                variants.push(OutputVariant::new(Layout::Dual, watermarked));
            }
            if self.mono {
                variants.push(OutputVariant::new(Layout::Mono, watermarked));
            }
        }
        variants
    }
}

/// Where and under which name outputs are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub output_dir: PathBuf,
    /// File stem of the source document
    pub stem: String,
    pub source_language: String,
    pub target_language: String,
}

impl OutputTarget {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        source: &Path,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            stem: FileManager::document_stem(source),
            source_language: source_language.into(),
            target_language: target_language.into(),
        }
    }

    /// `<stem>.<lang>.<layout>.txt`, with `.no_watermark` after the stem when unmarked
    pub fn variant_path(&self, variant: OutputVariant) -> PathBuf {
        let layout = match variant.layout {
            Layout::Mono => "mono",
            Layout::Dual => "dual",
        };
        let stem = if variant.watermarked {
            self.stem.clone()
        } else {
            format!("{}.no_watermark", self.stem)
        };
        FileManager::generate_output_path(&stem, &self.output_dir, &self.target_language, &format!("{}.txt", layout))
    }

    pub fn glossary_path(&self) -> PathBuf {
        FileManager::generate_output_path(&self.stem, &self.output_dir, &self.target_language, "glossary.json")
    }

    pub fn result_path(&self) -> PathBuf {
        FileManager::generate_output_path(&self.stem, &self.output_dir, &self.target_language, "result.json")
    }
}

/// How a unit's output text came about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Translated,
    Passthrough,
    Restored,
    /// Translation failed; `text` holds the original
    Untranslated { reason: String },
}

/// One unit placed in the final document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledUnit {
    pub key: UnitKey,
    pub order: usize,
    pub source: String,
    pub text: String,
    pub status: UnitStatus,
}

/// One selected page with its units in reading order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPage {
    pub page: usize,
    pub units: Vec<AssembledUnit>,
}

/// The selected pages in ascending order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    pub pages: Vec<AssembledPage>,
}

impl AssembledDocument {
    pub fn units(&self) -> impl Iterator<Item = &AssembledUnit> {
        self.pages.iter().flat_map(|p| p.units.iter())
    }
}

/// A unit that ended in `failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub page: usize,
    pub anchor: String,
    /// `retries_exhausted`, `non_transient` or `cancelled`
    pub kind: String,
    pub message: String,
}

/// An output that could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFailure {
    pub output: String,
    pub error: String,
}

/// Final record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub source: PathBuf,
    pub mono_path: Option<PathBuf>,
    pub dual_path: Option<PathBuf>,
    pub no_watermark_mono_path: Option<PathBuf>,
    pub no_watermark_dual_path: Option<PathBuf>,
    pub glossary_path: Option<PathBuf>,
    pub total_seconds: f64,
    /// Peak resident memory in bytes, 0 when unavailable
    pub peak_memory_usage: u64,
    pub pages: Vec<usize>,
    pub total_units: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Succeeded units that were never sent (shorter than `min_text_length`)
    pub passthrough: usize,
    /// Succeeded units restored from a checkpoint
    pub restored: usize,
    pub failed_units: Vec<FailedUnit>,
    pub output_failures: Vec<OutputFailure>,
}

impl TranslationResult {
    pub fn path_for(&self, variant: OutputVariant) -> Option<&Path> {
        let path = match (variant.layout, variant.watermarked) {
            (Layout::Mono, true) => &self.mono_path,
            (Layout::Dual, true) => &self.dual_path,
            (Layout::Mono, false) => &self.no_watermark_mono_path,
            (Layout::Dual, false) => &self.no_watermark_dual_path,
        };
        path.as_deref()
    }

    fn path_slot(&mut self, variant: OutputVariant) -> &mut Option<PathBuf> {
        match (variant.layout, variant.watermarked) {
            (Layout::Mono, true) => &mut self.mono_path,
            (Layout::Dual, true) => &mut self.dual_path,
            (Layout::Mono, false) => &mut self.no_watermark_mono_path,
            (Layout::Dual, false) => &mut self.no_watermark_dual_path,
        }
    }

    /// Every produced file with a human readable label
    pub fn produced_paths(&self) -> Vec<(&'static str, &Path)> {
        [
            ("Dual", &self.dual_path),
            ("Mono", &self.mono_path),
            ("No-watermark dual", &self.no_watermark_dual_path),
            ("No-watermark mono", &self.no_watermark_mono_path),
            ("Glossary", &self.glossary_path),
        ]
        .into_iter()
        .filter_map(|(label, path)| path.as_deref().map(|p| (label, p)))
        .collect()
    }

    /// Some units fell back to their original text
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }

    /// Write the result as pretty JSON
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        FileManager::write_to_file(path, &json)
    }
}

impl fmt::Display for TranslationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Translation result for {}", self.source.display())?;
        for (label, path) in self.produced_paths() {
            writeln!(f, "  {}: {}", label, path.display())?;
        }
        writeln!(f, "  Time: {:.2}s", self.total_seconds)?;
        writeln!(f, "  Peak memory: {:.1} MiB", self.peak_memory_usage as f64 / (1024.0 * 1024.0))?;
        write!(
            f,
            "  Units: {} total, {} succeeded ({} passed through, {} resumed), {} failed",
            self.total_units, self.succeeded, self.passthrough, self.restored, self.failed
        )?;
        for failure in &self.output_failures {
            write!(f, "\n  Could not write {}: {}", failure.output, failure.error)?;
        }
        Ok(())
    }
}

/// Timing and memory figures measured by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunMetrics {
    pub total_seconds: f64,
    pub peak_memory_usage: u64,
}

/// Merge terminal tickets back into page order.
///
/// Every unit of every part must have a terminal ticket; a missing one, or a
/// succeeded ticket without output, is an `IncompleteAssembly` error.
pub fn merge(parts: &[Part], tickets: &HashMap<UnitKey, DispatchTicket>) -> Result<AssembledDocument, PipelineError> {
    let mut pages: BTreeMap<usize, Vec<AssembledUnit>> = BTreeMap::new();

    for part in parts {
        for page in &part.pages {
            pages.entry(*page).or_default();
        }
        for unit in &part.units {
            let incomplete = || PipelineError::IncompleteAssembly {
                page: unit.page(),
                anchor: unit.anchor().to_string(),
            };
            let ticket = tickets.get(unit.key()).ok_or_else(incomplete)?;

            let (text, status) = match ticket.state {
                TicketState::Succeeded => {
                    let output = ticket.output.clone().ok_or_else(incomplete)?;
                    let status = match ticket.origin {
                        TicketOrigin::Engine => UnitStatus::Translated,
                        TicketOrigin::Passthrough => UnitStatus::Passthrough,
                        TicketOrigin::Checkpoint => UnitStatus::Restored,
                    };
                    (output, status)
                }
                TicketState::Failed => {
                    let reason = ticket
                        .failure
                        .as_ref()
                        .map(|f| f.to_string())
                        .unwrap_or_else(|| "unknown failure".to_string());
                    warn!("Unit {} falls back to original text: {}", unit.key(), reason);
                    (unit.text().to_string(), UnitStatus::Untranslated { reason })
                }
                TicketState::Pending | TicketState::InFlight => return Err(incomplete()),
            };

            pages.entry(unit.page()).or_default().push(AssembledUnit {
                key: unit.key().clone(),
                order: unit.order(),
                source: unit.text().to_string(),
                text,
                status,
            });
        }
    }

    let pages = pages
        .into_iter()
        .map(|(page, mut units)| {
            units.sort_by_key(|u| u.order);
            AssembledPage { page, units }
        })
        .collect();

    Ok(AssembledDocument { pages })
}

/// Fail the run when a part looks systemically broken.
///
/// A part is broken when at least one of its units was sent to the engine
/// and every sent unit failed with a non-transient error. A lone rejected
/// unit only counts when the engine translated nothing else in the run; one
/// refused paragraph next to accepted ones is a per-unit failure.
pub fn check_systemic_failure(
    parts: &[Part],
    tickets: &HashMap<UnitKey, DispatchTicket>,
) -> Result<(), PipelineError> {
    let engine_succeeded = tickets
        .values()
        .any(|t| t.state == TicketState::Succeeded && t.origin == TicketOrigin::Engine);

    for part in parts {
        let sent: Vec<&DispatchTicket> = part
            .units
            .iter()
            .filter_map(|u| tickets.get(u.key()))
            .filter(|t| t.was_sent())
            .collect();

        if sent.is_empty() || (sent.len() == 1 && engine_succeeded) {
            continue;
        }

        let all_rejected = sent.iter().all(|t| {
            t.state == TicketState::Failed && t.failure.as_ref().is_some_and(|f| f.is_non_transient())
        });
        if all_rejected {
            let reason = sent
                .last()
                .and_then(|t| t.failure.as_ref())
                .map(|f| f.to_string())
                .unwrap_or_default();
            error!(
                "Every translated unit of part {} (pages {}-{}) was rejected: {}",
                part.index,
                part.first_page(),
                part.last_page(),
                reason
            );
            return Err(PipelineError::SystemicFailure {
                part: part.index,
                first_page: part.first_page(),
                last_page: part.last_page(),
                reason,
            });
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct GlossaryEntry<'a> {
    source: &'a str,
    target: &'a str,
}

/// Short translated units as source/target term pairs, sorted by source
pub fn extract_glossary(document: &AssembledDocument) -> BTreeMap<String, String> {
    document
        .units()
        .filter(|u| u.status == UnitStatus::Translated || u.status == UnitStatus::Restored)
        .filter(|u| u.source.chars().count() <= GLOSSARY_MAX_TERM_CHARS)
        .filter(|u| !u.source.contains('\n') && u.source.trim() != u.text.trim())
        .map(|u| (u.source.trim().to_string(), u.text.trim().to_string()))
        .collect()
}

/// Writes outputs and builds the final result
#[derive(Debug, Clone)]
pub struct Assembler {
    options: OutputOptions,
    target: OutputTarget,
    auto_extract_glossary: bool,
}

impl Assembler {
    pub fn new(options: OutputOptions, target: OutputTarget) -> Result<Self, PipelineError> {
        options.validate()?;
        Ok(Self {
            options,
            target,
            auto_extract_glossary: false,
        })
    }

    pub fn with_glossary(mut self, enabled: bool) -> Self {
        self.auto_extract_glossary = enabled;
        self
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    /// Assemble the run.
    ///
    /// Fails without writing anything if a ticket is missing or a part failed
    /// systemically. Per-output write errors are recorded in the result.
    pub fn assemble(
        &self,
        source: &Path,
        parts: &[Part],
        tickets: &HashMap<UnitKey, DispatchTicket>,
        metrics: RunMetrics,
    ) -> Result<TranslationResult, PipelineError> {
        let document = merge(parts, tickets)?;
        check_systemic_failure(parts, tickets)?;

        let mut result = TranslationResult {
            source: source.to_path_buf(),
            mono_path: None,
            dual_path: None,
            no_watermark_mono_path: None,
            no_watermark_dual_path: None,
            glossary_path: None,
            total_seconds: metrics.total_seconds,
            peak_memory_usage: metrics.peak_memory_usage,
            pages: document.pages.iter().map(|p| p.page).collect(),
            total_units: 0,
            succeeded: 0,
            failed: 0,
            passthrough: 0,
            restored: 0,
            failed_units: Vec::new(),
            output_failures: Vec::new(),
        };

        for unit in document.units() {
            result.total_units += 1;
            match &unit.status {
                UnitStatus::Untranslated { reason } => {
                    result.failed += 1;
                    let kind = tickets
                        .get(&unit.key)
                        .and_then(|t| t.failure.as_ref())
                        .map(|f| f.kind())
                        .unwrap_or("unknown");
                    result.failed_units.push(FailedUnit {
                        page: unit.key.page,
                        anchor: unit.key.anchor.clone(),
                        kind: kind.to_string(),
                        message: reason.clone(),
                    });
                }
                UnitStatus::Passthrough => {
                    result.succeeded += 1;
                    result.passthrough += 1;
                }
                UnitStatus::Restored => {
                    result.succeeded += 1;
                    result.restored += 1;
                }
                UnitStatus::Translated => result.succeeded += 1,
            }
        }

        let ctx = RenderContext {
            source_language: &self.target.source_language,
            target_language: &self.target.target_language,
        };

        for variant in self.options.variants() {
            let path = self.target.variant_path(variant);
            let content = render_variant(&document, variant, &ctx);
            match FileManager::write_to_file(&path, &content) {
                Ok(()) => {
                    debug!("Wrote {} output to {:?}", variant, path);
                    *result.path_slot(variant) = Some(path);
                }
                Err(e) => {
                    error!("Failed to write {} output: {:#}", variant, e);
                    result.output_failures.push(OutputFailure {
                        output: variant.name().to_string(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        if self.auto_extract_glossary {
            self.write_glossary(&document, &mut result);
        }

        info!(
            "Assembled {} pages: {} units succeeded, {} failed",
            result.pages.len(),
            result.succeeded,
            result.failed
        );
        Ok(result)
    }

    fn write_glossary(&self, document: &AssembledDocument, result: &mut TranslationResult) {
        let terms = extract_glossary(document);
        if terms.is_empty() {
            debug!("No glossary terms found");
            return;
        }

        let entries: Vec<GlossaryEntry<'_>> = terms
            .iter()
            .map(|(source, target)| GlossaryEntry {
                source: source.as_str(),
                target: target.as_str(),
            })
            .collect();
        let path = self.target.glossary_path();
        let written = serde_json::to_string_pretty(&entries)
            .map_err(anyhow::Error::from)
            .and_then(|json| FileManager::write_to_file(&path, &json));

        match written {
            Ok(()) => result.glossary_path = Some(path),
            Err(e) => result.output_failures.push(OutputFailure {
                output: "glossary".to_string(),
                error: format!("{:#}", e),
            }),
        }
    }
}

/*!
 * # pdfdual - bilingual document translation
 *
 * A Rust library for translating extracted documents page by page through an
 * LLM engine and writing monolingual and bilingual outputs.
 *
 * ## Features
 *
 * - Page range selection ("1-3,7,10-") and splitting into parts
 * - One shared token bucket for every engine request (qps)
 * - Retry with exponential backoff for transient engine errors
 * - Coalescing progress stream for terminal or GUI observers
 * - Page-order reassembly with per-unit fallback to the original text
 * - Mono, dual and no-watermark output variants
 * - SQLite checkpoints so interrupted runs resume where they stopped
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `document`: Extracted document model and translation units
 * - `pipeline`: The translation pipeline:
 *   - `pipeline::segmenter`: Page selection and parts
 *   - `pipeline::dispatcher`: Rate-limited, retrying engine dispatch
 *   - `pipeline::progress`: Progress aggregation
 *   - `pipeline::assembler`: Output assembly and the translation result
 *   - `pipeline::orchestrator`: Wiring of the stages
 * - `translation`: The `Translator` seam, cache and output cleaning
 * - `providers`: Engine clients (`openai`, `mock`)
 * - `database`: Checkpoint store
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod database;
pub mod document;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod pipeline;
pub mod providers;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use document::{ExtractedDocument, TextBlock, TranslationUnit, UnitKey};
pub use errors::{AppError, PipelineError, ProviderError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use pipeline::{CancellationToken, PipelineConfig, TranslationPipeline, TranslationResult};
pub use translation::{TranslationService, Translator};

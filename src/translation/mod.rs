/*!
 * Translation of individual text units.
 *
 * - `core`: the `Translator` seam and the provider-backed `TranslationService`
 * - `cache`: in-memory translation cache
 * - `formatting`: cleanup of raw engine output
 */

pub use self::cache::TranslationCache;
pub use self::core::{DEFAULT_SYSTEM_PROMPT, TranslationService, Translator, render_system_prompt};
pub use self::formatting::clean_llm_output;

pub mod cache;
pub mod core;
pub mod formatting;

/*!
 * Core translation service implementation.
 *
 * `Translator` is the seam the dispatcher calls: one text in, one
 * translation out, with errors classified as transient or not.
 * `TranslationService` implements it on top of any `Provider`, adding the
 * cache and output cleanup. The cancellation token passed to `translate`
 * belongs to that one request and is handed on to the provider.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::cache::TranslationCache;
use super::formatting::{clean_llm_output, truncate_for_log};
use crate::errors::ProviderError;
use crate::language_utils;
use crate::providers::Provider;

/// Placeholder replaced by the source language name in system prompts
pub const SOURCE_LANGUAGE_PLACEHOLDER: &str = "{source_language}";

/// Placeholder replaced by the target language name in system prompts
pub const TARGET_LANGUAGE_PLACEHOLDER: &str = "{target_language}";

/// Prompt used when the configuration does not supply one
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional translator for academic and technical documents. \
Translate the user's text from {source_language} to {target_language}. \
Keep formulas, citations, numbers and placeholders unchanged. \
Reply with the translation only.";

/// Fill the language placeholders of a system prompt template.
///
/// Codes that are not known ISO 639 languages are inserted as written.
pub fn render_system_prompt(template: &str, source_language: &str, target_language: &str) -> String {
    let name = |code: &str| language_utils::get_language_name(code).unwrap_or_else(|_| code.to_string());
    template
        .replace(SOURCE_LANGUAGE_PLACEHOLDER, &name(source_language))
        .replace(TARGET_LANGUAGE_PLACEHOLDER, &name(target_language))
}

/// A single text translation call
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source_lang` to `target_lang` under `system_prompt`.
    ///
    /// Returns `ProviderError::Cancelled` if `cancel` fires before an answer arrives.
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError>;

    /// Check that the engine is reachable and accepts our credentials
    async fn check_connection(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Translation service: provider + cache + output cleanup
#[derive(Debug)]
pub struct TranslationService<P: Provider> {
    provider: P,
    cache: TranslationCache,
}

impl<P: Provider> TranslationService<P> {
    /// Create a service with a fresh cache
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cache: TranslationCache::new(true),
        }
    }

    /// Use an existing cache
    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }
}

#[async_trait]
impl<P: Provider> Translator for TranslationService<P> {
    async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        if let Some(cached) = self.cache.get(text, source_lang, target_lang, system_prompt) {
            return Ok(cached);
        }

        let request = self.provider.build_request(text, source_lang, target_lang, system_prompt);
        let response = self.provider.complete(request, cancel).await?;
        let translated = clean_llm_output(&P::extract_text(&response));

        if translated.is_empty() {
            warn!("Engine returned an empty translation for '{}'", truncate_for_log(text, 40));
            return Err(ProviderError::ParseError("empty translation".to_string()));
        }

        debug!("Translated '{}' -> '{}'", truncate_for_log(text, 30), truncate_for_log(&translated, 30));
        self.cache.store(text, source_lang, target_lang, system_prompt, &translated);
        Ok(translated)
    }

    async fn check_connection(&self) -> Result<(), ProviderError> {
        self.provider.test_connection().await
    }
}

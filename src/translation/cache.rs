/*!
 * Translation caching.
 *
 * Documents repeat themselves (running headers, figure labels, reference
 * markers). The cache keeps one engine answer per text, language pair and
 * system prompt for the lifetime of a service. The prompt is keyed by its
 * SHA-256 digest.
 */

use log::debug;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::formatting::truncate_for_log;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    source_text: String,
    source_language: String,
    target_language: String,
    prompt_digest: [u8; 32],
}

impl CacheKey {
    fn new(source_text: &str, source_language: &str, target_language: &str, system_prompt: &str) -> Self {
        Self {
            source_text: source_text.to_string(),
            source_language: source_language.to_lowercase(),
            target_language: target_language.to_lowercase(),
            prompt_digest: Sha256::digest(system_prompt.as_bytes()).into(),
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared translation cache; clones see the same entries
#[derive(Debug, Clone)]
pub struct TranslationCache {
    entries: Arc<RwLock<HashMap<CacheKey, String>>>,
    hits: Arc<AtomicUsize>,
    misses: Arc<AtomicUsize>,
    enabled: bool,
}

impl TranslationCache {
    /// Create a new translation cache
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            hits: Arc::new(AtomicUsize::new(0)),
            misses: Arc::new(AtomicUsize::new(0)),
            enabled,
        }
    }

    /// Look up a translation made under the same system prompt
    pub fn get(
        &self,
        source_text: &str,
        source_language: &str,
        target_language: &str,
        system_prompt: &str,
    ) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let key = CacheKey::new(source_text, source_language, target_language, system_prompt);
        let found = self.entries.read().get(&key).cloned();
        match &found {
            Some(_) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for '{}' ({} -> {})", truncate_for_log(source_text, 30), source_language, target_language);
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        found
    }

    /// Store a translation
    pub fn store(
        &self,
        source_text: &str,
        source_language: &str,
        target_language: &str,
        system_prompt: &str,
        translation: &str,
    ) {
        if !self.enabled {
            return;
        }
        let key = CacheKey::new(source_text, source_language, target_language, system_prompt);
        self.entries.write().insert(key, translation.to_string());
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.read().len(),
        }
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        self.entries.write().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("Translation cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new(true)
    }
}

/*!
 * Extracted-text document model.
 *
 * The layout analysis collaborator turns a PDF into a page-indexed list of
 * text blocks, each tied to a position anchor (block id or bounding box).
 * This module loads that view and turns it into `TranslationUnit`s.
 *
 * On disk the view is JSON:
 *
 * ```json
 * {
 *   "source": "paper.pdf",
 *   "page_count": 12,
 *   "blocks": [
 *     { "page": 1, "anchor": "p1-b0", "text": "Abstract" },
 *     { "page": 1, "anchor": "p1-b1", "text": "We study ..." }
 *   ]
 * }
 * ```
 */

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::file_utils::FileManager;

/// One block of extracted text as produced by the layout collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    /// 1-based page index
    pub page: usize,
    /// Position anchor, unique within its page
    pub anchor: String,
    /// Extracted text
    pub text: String,
}

/// Page-indexed extracted-text view of a parsed document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Original document the text was extracted from
    #[serde(default)]
    pub source: PathBuf,
    /// Number of pages in the original document, including pages without text
    pub page_count: usize,
    /// Text blocks in reading order
    #[serde(default)]
    pub blocks: Vec<TextBlock>,
}

impl ExtractedDocument {
    /// Create a document from blocks
    pub fn new(source: impl Into<PathBuf>, page_count: usize, blocks: Vec<TextBlock>) -> Self {
        Self {
            source: source.into(),
            page_count,
            blocks,
        }
    }

    /// Load a document from its JSON representation on disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = FileManager::read_to_string(path)?;
        let mut document: ExtractedDocument = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse extracted document: {:?}", path))?;

        if document.source.as_os_str().is_empty() {
            document.source = path.to_path_buf();
        }

        document.validate()?;
        Ok(document)
    }

    /// Check page bounds and anchor uniqueness
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for block in &self.blocks {
            if block.page == 0 || block.page > self.page_count {
                return Err(anyhow!(
                    "Block '{}' references page {} outside 1..={}",
                    block.anchor, block.page, self.page_count
                ));
            }
            if block.anchor.trim().is_empty() {
                return Err(anyhow!("Block on page {} has an empty anchor", block.page));
            }
            if !seen.insert((block.page, block.anchor.as_str())) {
                return Err(anyhow!(
                    "Duplicate anchor '{}' on page {}",
                    block.anchor, block.page
                ));
            }
        }
        Ok(())
    }

    /// Stable content hash used to key checkpoints
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.page_count.to_le_bytes());
        for block in &self.blocks {
            hasher.update(block.page.to_le_bytes());
            hasher.update(block.anchor.as_bytes());
            hasher.update([0u8]);
            hasher.update(block.text.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Build translation units for every block, in reading order
    pub fn units(&self) -> Vec<TranslationUnit> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(order, block)| TranslationUnit::new(block.page, block.anchor.clone(), order, block.text.clone()))
            .collect()
    }
}

/// Key identifying a unit within a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    /// 1-based page index
    pub page: usize,
    /// Position anchor
    pub anchor: String,
}

impl UnitKey {
    pub fn new(page: usize, anchor: impl Into<String>) -> Self {
        Self {
            page,
            anchor: anchor.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}#{}", self.page, self.anchor)
    }
}

/// One atomic piece of text tied to a page and a position anchor.
///
/// Immutable once created; clones share the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    key: UnitKey,
    order: usize,
    text: Arc<str>,
}

impl TranslationUnit {
    /// Create a unit. `order` is the reading-order position within the document.
    pub fn new(page: usize, anchor: impl Into<String>, order: usize, text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self {
            key: UnitKey::new(page, anchor),
            order,
            text: Arc::from(text),
        }
    }

    pub fn key(&self) -> &UnitKey {
        &self.key
    }

    pub fn page(&self) -> usize {
        self.key.page
    }

    pub fn anchor(&self) -> &str {
        &self.key.anchor
    }

    /// Reading-order position within the document
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Shared handle to the text, for moving into spawned requests
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// Length in characters, not bytes
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

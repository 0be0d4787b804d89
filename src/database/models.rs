/*!
 * Checkpoint records.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a pipeline run as stored in the checkpoint database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is dispatching or assembling
    Running,
    /// Every unit succeeded
    Completed,
    /// Outputs were written but some units fell back to their original text
    Partial,
    /// The run aborted before writing outputs
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid run status: {}", s)),
        }
    }
}

/// One pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub document_hash: String,
    pub source_path: String,
    pub source_language: String,
    pub target_language: String,
    /// Page selection expression, `all` when unrestricted
    pub pages: String,
    pub total_units: i64,
    pub succeeded_units: i64,
    pub failed_units: i64,
    pub restored_units: i64,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl RunRecord {
    /// New running record with a fresh id and the current time
    pub fn start(
        document_hash: impl Into<String>,
        source_path: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        pages: impl Into<String>,
        total_units: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_hash: document_hash.into(),
            source_path: source_path.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            pages: pages.into(),
            total_units,
            succeeded_units: 0,
            failed_units: 0,
            restored_units: 0,
            status: RunStatus::Running,
            started_at: now_timestamp(),
            finished_at: None,
        }
    }
}

/// Persisted translation of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTranslationRecord {
    pub document_hash: String,
    pub target_language: String,
    pub page: i64,
    pub anchor: String,
    /// Source text at the time of translation
    pub source_text: String,
    pub translated_text: String,
    pub run_id: String,
    pub updated_at: String,
}

/// RFC 3339 timestamp for the current instant
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

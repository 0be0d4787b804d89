use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::file_utils::FileManager;
use crate::language_utils;
use crate::pipeline::{
    DispatchConfig, OutputOptions, PageSelector, PipelineConfig, RetryPolicy, WatermarkMode,
};
use crate::translation::{DEFAULT_SYSTEM_PROMPT, render_system_prompt};

// Application configuration module
// This module handles the application configuration including loading,
// validating and saving configuration settings.

/// Placeholder written into example configs in place of a real key
pub const API_KEY_PLACEHOLDER: &str = "your-api-key-here";

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Source language code (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation engine config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Output selection
    #[serde(default)]
    pub pdf: PdfConfig,

    /// Checkpoint store
    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    /// Forces debug logging
    #[serde(default)]
    pub debug: bool,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation engine type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationEngine {
    // @engine: OpenAI-compatible chat completions
    #[default]
    OpenAI,
}

impl TranslationEngine {
    // @returns: Capitalized engine name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
        }
    }
}

impl std::fmt::Display for TranslationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for TranslationEngine {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            _ => Err(anyhow!("unsupported translation engine: {}", s)),
        }
    }
}

/// Translation engine and dispatch settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslationConfig {
    /// Engine to use
    #[serde(default, deserialize_with = "deserialize_engine")]
    pub engine: TranslationEngine,

    /// API key for the engine
    #[serde(default)]
    pub openai_api_key: String,

    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// Model name
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Temperature parameter for text generation (0.0 to 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum requests per second
    #[serde(default = "default_qps")]
    pub qps: u32,

    /// Units shorter than this many characters are not sent
    #[serde(default = "default_min_text_length")]
    pub min_text_length: usize,

    /// System prompt template
    /// Placeholders: {source_language}, {target_language}
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_system_prompt: Option<String>,

    /// Retries after the first attempt for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Multiplier applied to the delay for each further retry
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound on a single retry delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How long in-flight requests may finish after cancellation
    #[serde(default = "default_cancel_grace_period_ms")]
    pub cancel_grace_period_ms: u64,

    /// In-memory translation cache
    #[serde(default = "default_true")]
    pub enable_cache: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            engine: TranslationEngine::default(),
            openai_api_key: String::new(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            qps: default_qps(),
            min_text_length: default_min_text_length(),
            custom_system_prompt: None,
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            backoff_factor: default_backoff_factor(),
            max_backoff_ms: default_max_backoff_ms(),
            cancel_grace_period_ms: default_cancel_grace_period_ms(),
            enable_cache: true,
        }
    }
}

/// Output selection
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PdfConfig {
    /// Skip the dual (original + translation) output
    #[serde(default)]
    pub no_dual: bool,

    /// Skip the translation-only output
    #[serde(default)]
    pub no_mono: bool,

    /// Which watermark variants to write
    #[serde(default)]
    pub watermark_output_mode: WatermarkMode,

    /// Page selection such as "1-3,7,10-"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<String>,

    /// Pages per part; unset or <= 0 means one part
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages_per_part: Option<i64>,

    /// Write short translated units as a glossary
    #[serde(default)]
    pub auto_extract_glossary: bool,
}

/// Checkpoint store settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CheckpointConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Database file; defaults to the user data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { enabled: true, path: None }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn deserialize_engine<'de, D>(deserializer: D) -> std::result::Result<TranslationEngine, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.3
}

fn default_qps() -> u32 {
    4
}

fn default_min_text_length() -> usize {
    5
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_cancel_grace_period_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            pdf: PdfConfig::default(),
            checkpoint: CheckpointConfig::default(),
            debug: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            return Err(anyhow!(
                "Config file not found at {:?}. Run with --create-config to write an example.",
                path
            ));
        }
        let content = FileManager::read_to_string(path)?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        FileManager::write_to_file(path, &json)
    }

    /// Example configuration with a placeholder API key
    pub fn example() -> Self {
        let mut config = Self::default();
        config.translation.openai_api_key = API_KEY_PLACEHOLDER.to_string();
        config.translation.custom_system_prompt = Some(DEFAULT_SYSTEM_PROMPT.to_string());
        config
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        language_utils::validate_language_code(&self.source_language)
            .with_context(|| format!("Invalid source language: {}", self.source_language))?;
        language_utils::validate_language_code(&self.target_language)
            .with_context(|| format!("Invalid target language: {}", self.target_language))?;

        let api_key = self.translation.openai_api_key.trim();
        if api_key.is_empty() || api_key == API_KEY_PLACEHOLDER {
            return Err(anyhow!("API key is required for the {} engine", self.translation.engine.display_name()));
        }
        url::Url::parse(&self.translation.openai_base_url)
            .with_context(|| format!("Invalid base URL: {}", self.translation.openai_base_url))?;

        if self.translation.qps == 0 {
            return Err(anyhow!("qps must be greater than zero"));
        }
        if self.translation.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be greater than zero"));
        }
        if !(0.0..=2.0).contains(&self.translation.temperature) {
            return Err(anyhow!("temperature must be between 0.0 and 2.0"));
        }
        if self.translation.backoff_factor < 1.0 {
            return Err(anyhow!("backoff_factor must be at least 1.0"));
        }

        self.page_selector()?;
        self.output_options().validate()?;

        Ok(())
    }

    /// Parsed page selection, if any
    pub fn page_selector(&self) -> Result<Option<PageSelector>> {
        match self.pdf.pages.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(expression) => Ok(Some(PageSelector::parse(expression)?)),
        }
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            dual: !self.pdf.no_dual,
            mono: !self.pdf.no_mono,
            watermark_mode: self.pdf.watermark_output_mode,
        }
    }

    /// Rendered system prompt for the configured languages
    pub fn system_prompt(&self) -> String {
        let template = self
            .translation
            .custom_system_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_SYSTEM_PROMPT);
        render_system_prompt(template, &self.source_language, &self.target_language)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        let t = &self.translation;
        DispatchConfig {
            qps: t.qps,
            min_text_length: t.min_text_length,
            retry: RetryPolicy {
                max_retries: t.retry_count,
                base_delay: Duration::from_millis(t.retry_backoff_ms),
                factor: t.backoff_factor,
                max_delay: Duration::from_millis(t.max_backoff_ms),
                ..RetryPolicy::default()
            },
            cancel_grace_period: Duration::from_millis(t.cancel_grace_period_ms),
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            system_prompt: self.system_prompt(),
        }
    }

    /// Immutable pipeline configuration built from this config
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            dispatch: self.dispatch_config(),
            pages: self.page_selector()?,
            max_pages_per_part: self.pdf.max_pages_per_part,
            output: self.output_options(),
            auto_extract_glossary: self.pdf.auto_extract_glossary,
            ..PipelineConfig::default()
        })
    }

    /// Effective log level; `debug` wins over `log_level`
    pub fn effective_log_level(&self) -> LogLevel {
        if self.debug && self.log_level != LogLevel::Trace {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.translation.openai_api_key = "sk-test".to_string();
        config
    }

    #[test]
    fn test_deserialize_withEmptyObject_shouldUseDefaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.translation.qps, 4);
        assert_eq!(config.translation.openai_base_url, "https://api.openai.com/v1");
        assert!(config.checkpoint.enabled);
    }

    #[test]
    fn test_deserialize_withUnknownEngine_shouldFail() {
        let error = serde_json::from_str::<Config>(r#"{"translation": {"engine": "babelfish"}}"#).unwrap_err();
        assert!(error.to_string().contains("unsupported translation engine"));
    }

    #[test]
    fn test_validate_withPlaceholderKey_shouldFail() {
        let error = Config::example().validate().unwrap_err();
        assert!(error.to_string().contains("API key is required"));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_withBadPages_shouldFail() {
        let mut config = valid();
        config.pdf.pages = Some("1,x-3".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_withNoOutputs_shouldFail() {
        let mut config = valid();
        config.pdf.no_dual = true;
        config.pdf.no_mono = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_withZeroQpsOrBadLanguage_shouldFail() {
        let mut config = valid();
        config.translation.qps = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.target_language = "zz-top".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatchConfig_shouldCarryRetrySettings() {
        let mut config = valid();
        config.translation.retry_count = 5;
        config.translation.retry_backoff_ms = 250;
        config.translation.max_backoff_ms = 4000;
        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.retry.max_retries, 5);
        assert_eq!(dispatch.retry.base_delay, Duration::from_millis(250));
        assert_eq!(dispatch.retry.max_delay, Duration::from_secs(4));
        assert!(dispatch.system_prompt.contains("English"));
        assert!(!dispatch.system_prompt.contains("{target_language}"));
    }

    #[test]
    fn test_effectiveLogLevel_withDebugFlag_shouldForceDebug() {
        let mut config = valid();
        config.debug = true;
        assert_eq!(config.effective_log_level(), LogLevel::Debug);
    }

    #[test]
    fn test_saveAndLoad_shouldPreserveConfig() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/config.json");
        let mut config = valid();
        config.pdf.pages = Some("2-4".to_string());
        config.pdf.watermark_output_mode = WatermarkMode::Both;
        config.save(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), config);
        assert!(Config::from_file(dir.path().join("missing.json")).is_err());
    }
}

/*!
 * Error types for the pdfdual application.
 *
 * This module contains custom error types for the different layers of the
 * application, using the thiserror crate for ergonomic error definitions:
 *
 * - `ProviderError`: a single translation engine call
 * - `PipelineError`: segmentation, assembly and run-level failures
 * - `AppError`: everything surfaced by the binary
 */

use thiserror::Error;

/// Errors that can occur when calling a translation engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The engine rejected the request as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request observed the cancellation signal and stopped
    #[error("Request cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Whether the failure is worth retrying.
    ///
    /// Network trouble, timeouts, rate limiting, server-side errors and
    /// unparseable responses are transient. Authentication failures,
    /// malformed requests and other 4xx responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::ConnectionError(_)
            | Self::Timeout(_)
            | Self::RateLimitExceeded(_) => true,
            Self::ApiError { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || *status_code >= 500
            }
            Self::AuthenticationError(_) | Self::InvalidRequest(_) | Self::Cancelled => false,
        }
    }

    /// Map an HTTP error status to the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            400 | 404 | 422 => Self::InvalidRequest(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }
}

/// Errors raised by the translation pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A page range expression could not be parsed
    #[error("Invalid page range token '{token}': {reason}")]
    InvalidRange {
        /// The offending token of the expression
        token: String,
        /// What is wrong with it
        reason: String,
    },

    /// Output options or pipeline tunables are unusable
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// A unit reached assembly without a terminal ticket
    #[error("Incomplete assembly: unit at page {page}, anchor '{anchor}' has no terminal ticket")]
    IncompleteAssembly {
        /// 1-based page index of the unit
        page: usize,
        /// Position anchor of the unit
        anchor: String,
    },

    /// Every translated unit of a part failed without a chance of recovery
    #[error("Translation failed for part {part} (pages {first_page}-{last_page}): {reason}")]
    SystemicFailure {
        /// 0-based index of the part
        part: usize,
        /// First page of the part
        first_page: usize,
        /// Last page of the part
        last_page: usize,
        /// Last error observed in the part
        reason: String,
    },

    /// The dispatcher task stopped unexpectedly
    #[error("Dispatcher stopped: {0}")]
    Dispatch(String),

    /// Checkpoint store failure
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl PipelineError {
    /// Shorthand used by the page range parser
    pub fn invalid_range(token: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            token: token.into(),
            reason: reason.into(),
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Process exit code: 2 for bad input or configuration, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Pipeline(PipelineError::InvalidRange { .. } | PipelineError::InvalidOptions(_)) => 2,
            _ => 1,
        }
    }
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        let error = match error.downcast::<AppError>() {
            Ok(app) => return app,
            Err(error) => error,
        };
        match error.downcast::<PipelineError>() {
            Ok(pipeline) => Self::Pipeline(pipeline),
            Err(error) => match error.downcast::<ProviderError>() {
                Ok(provider) => Self::Provider(provider),
                Err(error) => Self::Unknown(format!("{:#}", error)),
            },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

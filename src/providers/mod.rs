/*!
 * Provider implementations for translation engines.
 *
 * - `openai`: OpenAI-compatible chat completions endpoint
 * - `mock`: deterministic in-process engine used by tests and dry runs
 *
 * A provider performs exactly one request per call. Retry, backoff and rate
 * limiting belong to the dispatcher, which needs every attempt to pass
 * through its token bucket. Each call receives the request's cancellation
 * token and answers `ProviderError::Cancelled` once it observes it.
 */

use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;

/// Common trait for all translation engines
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably behind `TranslationService`.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Build the request translating `text` under `system_prompt`
    fn build_request(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        system_prompt: &str,
    ) -> Self::Request;

    /// Complete a request using this provider
    ///
    /// # Arguments
    /// * `request` - The request to complete
    /// * `cancel` - Stop and return `ProviderError::Cancelled` once this is cancelled
    ///
    /// # Returns
    /// * `Result<Self::Response, ProviderError>` - The response from the provider or an error
    async fn complete(
        &self,
        request: Self::Request,
        cancel: &CancellationToken,
    ) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

pub mod mock;
pub mod openai;

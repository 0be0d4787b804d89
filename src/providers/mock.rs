/*!
 * Deterministic translation engine for tests and benchmarks.
 *
 * Successful answers are `"[TRANSLATED to <lang>] <text>"`. Failures are
 * driven by a `MockBehavior` (outages, bad credentials, latency) and an
 * optional per-request rule that rejects chosen units. Every behavior except
 * `Unresponsive` answers `ProviderError::Cancelled` once the request's token
 * is cancelled.
 *
 * Every request is timestamped on the tokio clock so rate-limit tests can
 * inspect exactly when the engine was called.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::providers::Provider;

/// What the engine was asked
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    Working,
    /// Every `fail_every`-th request answers 503
    Intermittent { fail_every: usize },
    /// Every request answers 500
    Failing,
    /// Every request is rejected as unauthenticated (non-transient)
    Unauthorized,
    /// The first `failures` requests answer 503
    Flaky { failures: usize },
    /// Succeeds with an empty body
    Empty,
    /// Succeeds after sleeping on the tokio clock
    Slow { delay_ms: u64 },
    /// Like `Slow`, but never looks at the cancellation token
    Unresponsive { delay_ms: u64 },
}

/// Clones share the request counter and call log, so a test can keep one
/// handle while the pipeline owns another.
#[derive(Debug, Clone)]
pub struct MockProvider {
    behavior: MockBehavior,
    request_count: Arc<AtomicUsize>,
    call_times: Arc<Mutex<Vec<Instant>>>,
    custom_response: Option<fn(&MockRequest) -> String>,
    /// Checked before `behavior`
    failure_rule: Option<fn(&MockRequest) -> Option<ProviderError>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            call_times: Arc::new(Mutex::new(Vec::new())),
            custom_response: None,
            failure_rule: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent { fail_every: fail_every.max(1) })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn unauthorized() -> Self {
        Self::new(MockBehavior::Unauthorized)
    }

    pub fn flaky(failures: usize) -> Self {
        Self::new(MockBehavior::Flaky { failures })
    }

    pub fn empty() -> Self {
        Self::new(MockBehavior::Empty)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn unresponsive(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Unresponsive { delay_ms })
    }

    /// Replace the default `[TRANSLATED to ..]` answer
    pub fn with_custom_response(mut self, generator: fn(&MockRequest) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Fail selected requests with the error returned by `rule`
    pub fn with_failure_rule(mut self, rule: fn(&MockRequest) -> Option<ProviderError>) -> Self {
        self.failure_rule = Some(rule);
        self
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Arrival times of all requests received so far
    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().clone()
    }

    /// Largest number of requests seen in any window of length `window`
    pub fn max_requests_in_window(&self, window: Duration) -> usize {
        let mut times = self.call_times();
        times.sort();
        times
            .iter()
            .enumerate()
            .map(|(i, start)| {
                times[i..]
                    .iter()
                    .take_while(|t| t.duration_since(*start) < window)
                    .count()
            })
            .max()
            .unwrap_or(0)
    }

    fn translated(&self, request: &MockRequest) -> MockResponse {
        let text = match self.custom_response {
            Some(generator) => generator(request),
            None => format!("[TRANSLATED to {}] {}", request.target_language, request.text),
        };
        MockResponse { text }
    }
}

fn unavailable(message: String) -> ProviderError {
    ProviderError::ApiError {
        message,
        status_code: 503,
    }
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    fn build_request(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
        system_prompt: &str,
    ) -> Self::Request {
        MockRequest {
            text: text.to_string(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    async fn complete(
        &self,
        request: Self::Request,
        cancel: &CancellationToken,
    ) -> Result<Self::Response, ProviderError> {
        let unresponsive = matches!(self.behavior, MockBehavior::Unresponsive { .. });
        if cancel.is_cancelled() && !unresponsive {
            return Err(ProviderError::Cancelled);
        }

        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());

        if let Some(error) = self.failure_rule.and_then(|rule| rule(&request)) {
            return Err(error);
        }

        match self.behavior {
            MockBehavior::Working => Ok(self.translated(&request)),

            MockBehavior::Intermittent { fail_every } if (count + 1) % fail_every == 0 => {
                Err(unavailable(format!("intermittent failure on request #{}", count + 1)))
            }
            MockBehavior::Flaky { failures } if count < failures => {
                Err(unavailable(format!("outage on request #{}", count + 1)))
            }
            MockBehavior::Intermittent { .. } | MockBehavior::Flaky { .. } => Ok(self.translated(&request)),

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError(
                "Simulated invalid API key".to_string(),
            )),

            MockBehavior::Empty => Ok(MockResponse { text: String::new() }),

            MockBehavior::Slow { delay_ms } => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => Ok(self.translated(&request)),
                }
            }

            MockBehavior::Unresponsive { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(self.translated(&request))
            }
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Unauthorized => Err(ProviderError::AuthenticationError(
                "Simulated invalid API key".to_string(),
            )),
            MockBehavior::Failing => Err(ProviderError::ConnectionError("Simulated outage".to_string())),
            _ => Ok(()),
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(provider: &MockProvider, text: &str) -> MockRequest {
        provider.build_request(text, "en", "fr", "translate")
    }

    async fn complete_now(provider: &MockProvider, text: &str) -> Result<MockResponse, ProviderError> {
        provider.complete(request(provider, text), &CancellationToken::new()).await
    }

    #[tokio::test]
    async fn test_workingProvider_shouldReturnTranslatedText() {
        let provider = MockProvider::working();
        let response = complete_now(&provider, "Hello world").await.unwrap();
        assert_eq!(response.text, "[TRANSLATED to fr] Hello world");
    }

    #[tokio::test]
    async fn test_unauthorizedProvider_shouldReturnNonTransientError() {
        let provider = MockProvider::unauthorized();
        let error = complete_now(&provider, "Hello").await.unwrap_err();
        assert!(!error.is_transient());
        assert!(provider.test_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_intermittentProvider_shouldFailPeriodically() {
        let provider = MockProvider::intermittent(3);

        assert!(complete_now(&provider, "a").await.is_ok());
        assert!(complete_now(&provider, "b").await.is_ok());
        let error = complete_now(&provider, "c").await.unwrap_err();
        assert!(error.is_transient());
        assert!(complete_now(&provider, "d").await.is_ok());
    }

    #[tokio::test]
    async fn test_flakyProvider_shouldRecoverAfterFailures() {
        let provider = MockProvider::flaky(2);
        assert!(complete_now(&provider, "a").await.is_err());
        assert!(complete_now(&provider, "a").await.is_err());
        assert!(complete_now(&provider, "a").await.is_ok());
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn test_failureRule_shouldOverrideBehavior() {
        let provider = MockProvider::working().with_failure_rule(|req| {
            req.text
                .contains("secret")
                .then(|| ProviderError::InvalidRequest("rejected".to_string()))
        });

        assert!(complete_now(&provider, "public").await.is_ok());
        assert_eq!(
            complete_now(&provider, "top secret").await.unwrap_err(),
            ProviderError::InvalidRequest("rejected".to_string())
        );
    }

    #[tokio::test]
    async fn test_customResponseGenerator_shouldBeUsed() {
        let provider = MockProvider::working().with_custom_response(|req| {
            format!("CUSTOM: {} -> {}", req.source_language, req.target_language)
        });

        let response = complete_now(&provider, "Test").await.unwrap();
        assert_eq!(response.text, "CUSTOM: en -> fr");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clonedProvider_shouldShareCallLog() {
        let provider = MockProvider::working();
        let cloned = provider.clone();

        complete_now(&provider, "a").await.unwrap();
        tokio::time::advance(Duration::from_millis(1500)).await;
        complete_now(&cloned, "b").await.unwrap();

        assert_eq!(provider.call_times().len(), 2);
        assert_eq!(provider.max_requests_in_window(Duration::from_secs(1)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slowProvider_whenCancelled_shouldStopEarly() {
        let provider = MockProvider::slow(10_000);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let error = provider.complete(request(&provider, "a"), &cancel).await.unwrap_err();

        assert_eq!(error, ProviderError::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsiveProvider_shouldIgnoreCancellation() {
        let provider = MockProvider::unresponsive(1_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(provider.complete(request(&provider, "a"), &cancel).await.is_ok());
    }
}

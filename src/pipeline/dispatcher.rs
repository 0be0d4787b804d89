/*!
 * Rate-limited dispatcher.
 *
 * `Dispatcher::dispatch` spawns a single coordination task that owns every
 * ticket, the token bucket and the retry schedule. Engine calls run as
 * futures polled by that task, so ticket state is only ever mutated in one
 * place. Every state transition is published on an unbounded channel and
 * surfaces to the caller as a `TicketStream`.
 *
 * Unit lifecycle:
 *
 * ```text
 * pending -> in_flight -> succeeded
 *               |  ^
 *               v  |   (transient error, retries left: backoff)
 *             pending
 *               |
 *               v
 *             failed   (non-transient error, retries exhausted, cancelled)
 * ```
 *
 * Each request gets a child of the run's `CancellationToken`. Cancelling the
 * run stops new submissions and asks in-flight requests to stop; requests
 * that have not answered by the end of the grace period are abandoned.
 */

use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::FutureExt;
use log::{debug, error, info, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::rate_limit::TokenBucket;
use crate::document::{TranslationUnit, UnitKey};
use crate::errors::ProviderError;
use crate::translation::Translator;

/// Retry bound and exponential backoff schedule for transient failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied for every further retry
    pub factor: f64,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Random extra delay, as a fraction of the computed delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Same schedule without the random component
    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(64) as i32;
        let max = self.max_delay.as_secs_f64();
        let delay = (self.base_delay.as_secs_f64() * self.factor.max(1.0).powi(exponent)).min(max);
        let jitter = if self.jitter > 0.0 {
            delay * rand::rng().random_range(0.0..=self.jitter)
        } else {
            0.0
        };
        Duration::from_secs_f64((delay + jitter).min(max))
    }
}

/// Tunables for one dispatch run
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum engine requests in any one-second window
    pub qps: u32,
    /// Units shorter than this (in characters) are passed through untranslated
    pub min_text_length: usize,
    pub retry: RetryPolicy,
    /// How long in-flight requests have to answer after cancellation
    pub cancel_grace_period: Duration,
    pub source_language: String,
    pub target_language: String,
    /// Fully rendered system prompt
    pub system_prompt: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            qps: 4,
            min_text_length: 5,
            retry: RetryPolicy::default(),
            cancel_grace_period: Duration::from_secs(5),
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            system_prompt: String::new(),
        }
    }
}

/// Lifecycle state of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl TicketState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for TicketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Where a succeeded ticket's output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketOrigin {
    /// Sent to the translation engine
    Engine,
    /// Shorter than `min_text_length`, output is the input
    Passthrough,
    /// Restored from a checkpoint of an earlier run
    Checkpoint,
}

/// Why a ticket ended in `failed`
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Transient errors until the retry bound was reached
    RetriesExhausted { attempts: u32, last_error: ProviderError },
    /// The engine rejected the request; not retried
    NonTransient(ProviderError),
    /// Cancelled before a result arrived
    Cancelled,
}

impl FailureReason {
    /// Machine-readable kind, as written to result files
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::NonTransient(_) => "non_transient",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_non_transient(&self) -> bool {
        matches!(self, Self::NonTransient(_))
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetriesExhausted { attempts, last_error } => {
                write!(f, "gave up after {} attempts: {}", attempts, last_error)
            }
            Self::NonTransient(error) => write!(f, "{}", error),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Per-unit tracking record through the dispatch lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchTicket {
    pub key: UnitKey,
    /// Reading-order position of the unit
    pub order: usize,
    pub state: TicketState,
    /// Engine requests made so far
    pub attempts: u32,
    /// When the first request was sent
    pub sent_at: Option<Instant>,
    /// Translated (or passed-through) text once succeeded
    pub output: Option<String>,
    pub failure: Option<FailureReason>,
    pub origin: TicketOrigin,
}

impl DispatchTicket {
    /// Fresh ticket for a unit about to be dispatched
    pub fn pending(unit: &TranslationUnit) -> Self {
        Self {
            key: unit.key().clone(),
            order: unit.order(),
            state: TicketState::Pending,
            attempts: 0,
            sent_at: None,
            output: None,
            failure: None,
            origin: TicketOrigin::Engine,
        }
    }

    /// Succeeded ticket carrying a translation from an earlier run
    pub fn restored(unit: &TranslationUnit, translation: impl Into<String>) -> Self {
        Self {
            state: TicketState::Succeeded,
            output: Some(translation.into()),
            origin: TicketOrigin::Checkpoint,
            ..Self::pending(unit)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Retries made after the first attempt
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    /// Whether the unit was actually sent to the engine
    pub fn was_sent(&self) -> bool {
        self.attempts > 0
    }
}

/// Stream of ticket transitions produced by a running dispatch.
///
/// Ends once every unit has reached a terminal state. Dropping the stream
/// stops the dispatch.
pub struct TicketStream {
    receiver: mpsc::UnboundedReceiver<DispatchTicket>,
    handle: JoinHandle<()>,
}

impl Stream for TicketStream {
    type Item = DispatchTicket;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for TicketStream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Issues translation requests under the configured rate limit
#[derive(Clone)]
pub struct Dispatcher {
    translator: Arc<dyn Translator>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(translator: Arc<dyn Translator>, config: DispatchConfig) -> Self {
        Self { translator, config }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Start dispatching `units`. Must be called within a tokio runtime.
    pub fn dispatch(&self, units: Vec<TranslationUnit>, cancel: CancellationToken) -> TicketStream {
        let (sender, receiver) = mpsc::unbounded();
        let coordinator = Coordinator {
            translator: Arc::clone(&self.translator),
            source_language: Arc::from(self.config.source_language.as_str()),
            target_language: Arc::from(self.config.target_language.as_str()),
            system_prompt: Arc::from(self.config.system_prompt.as_str()),
            config: self.config.clone(),
            tickets: units.iter().map(DispatchTicket::pending).collect(),
            units,
            events: sender,
            cancel,
        };
        let handle = tokio::spawn(coordinator.run());
        TicketStream { receiver, handle }
    }
}

type Attempt = BoxFuture<'static, (usize, Result<String, ProviderError>)>;

/// What to do with a unit after an attempt settled
enum Settled {
    Done,
    RetryAfter(Duration),
}

struct Coordinator {
    translator: Arc<dyn Translator>,
    source_language: Arc<str>,
    target_language: Arc<str>,
    system_prompt: Arc<str>,
    config: DispatchConfig,
    units: Vec<TranslationUnit>,
    tickets: Vec<DispatchTicket>,
    events: mpsc::UnboundedSender<DispatchTicket>,
    cancel: CancellationToken,
}

impl Coordinator {
    fn emit(&self, index: usize) {
        let ticket = &self.tickets[index];
        debug!("Ticket {} -> {} (attempt {})", ticket.key, ticket.state, ticket.attempts);
        // receiver gone means nobody is listening; keep going until aborted
        let _ = self.events.unbounded_send(ticket.clone());
    }

    fn fail(&mut self, index: usize, reason: FailureReason) {
        let ticket = &mut self.tickets[index];
        ticket.state = TicketState::Failed;
        ticket.failure = Some(reason);
        self.emit(index);
    }

    fn submit(&mut self, index: usize) -> Attempt {
        let ticket = &mut self.tickets[index];
        ticket.state = TicketState::InFlight;
        ticket.attempts += 1;
        ticket.sent_at.get_or_insert_with(Instant::now);
        self.emit(index);

        let translator = Arc::clone(&self.translator);
        let text = self.units[index].shared_text();
        let source = Arc::clone(&self.source_language);
        let target = Arc::clone(&self.target_language);
        let prompt = Arc::clone(&self.system_prompt);
        let request_cancel = self.cancel.child_token();
        async move {
            let result = translator
                .translate(&text, &source, &target, &prompt, &request_cancel)
                .await;
            (index, result)
        }
        .boxed()
    }

    fn settle(&mut self, index: usize, result: Result<String, ProviderError>, allow_retry: bool) -> Settled {
        match result {
            Ok(output) => {
                let ticket = &mut self.tickets[index];
                ticket.state = TicketState::Succeeded;
                ticket.output = Some(output);
                self.emit(index);
                Settled::Done
            }
            Err(ProviderError::Cancelled) => {
                debug!("Unit {} stopped on cancellation", self.tickets[index].key);
                self.fail(index, FailureReason::Cancelled);
                Settled::Done
            }
            Err(err) if !err.is_transient() => {
                error!("Unit {} failed: {}", self.tickets[index].key, err);
                self.fail(index, FailureReason::NonTransient(err));
                Settled::Done
            }
            Err(err) => {
                let ticket = &self.tickets[index];
                let attempts = ticket.attempts;
                if ticket.retries() >= self.config.retry.max_retries {
                    error!("Unit {} failed after {} attempts: {}", ticket.key, attempts, err);
                    self.fail(index, FailureReason::RetriesExhausted { attempts, last_error: err });
                    Settled::Done
                } else if !allow_retry {
                    self.fail(index, FailureReason::Cancelled);
                    Settled::Done
                } else {
                    let delay = self.config.retry.backoff(attempts);
                    warn!(
                        "Unit {} attempt {} failed ({}), retrying in {:.1}s",
                        ticket.key, attempts, err, delay.as_secs_f64()
                    );
                    self.tickets[index].state = TicketState::Pending;
                    self.emit(index);
                    Settled::RetryAfter(delay)
                }
            }
        }
    }

    async fn run(mut self) {
        let mut bucket = TokenBucket::new(self.config.qps);
        let mut ready: VecDeque<usize> = VecDeque::new();

        for index in 0..self.units.len() {
            self.emit(index);
            if self.units[index].text_len() < self.config.min_text_length {
                let ticket = &mut self.tickets[index];
                ticket.state = TicketState::Succeeded;
                ticket.output = Some(self.units[index].text().to_string());
                ticket.origin = TicketOrigin::Passthrough;
                self.emit(index);
            } else {
                ready.push_back(index);
            }
        }

        info!(
            "Dispatching {} units at {} qps ({} passed through)",
            ready.len(),
            bucket.capacity(),
            self.units.len() - ready.len()
        );

        let mut in_flight: FuturesUnordered<Attempt> = FuturesUnordered::new();
        let mut in_flight_ids: HashSet<usize> = HashSet::new();
        let mut backoffs: FuturesUnordered<BoxFuture<'static, usize>> = FuturesUnordered::new();
        let mut backing_off: HashSet<usize> = HashSet::new();
        let cancel = self.cancel.clone();

        loop {
            if ready.is_empty() && in_flight.is_empty() && backoffs.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let mut queued: Vec<usize> = ready.drain(..).chain(backing_off.drain()).collect();
                    queued.sort_unstable();
                    drop(backoffs);
                    self.shutdown(queued, in_flight, in_flight_ids).await;
                    return;
                }

                Some((index, result)) = in_flight.next(), if !in_flight.is_empty() => {
                    in_flight_ids.remove(&index);
                    if let Settled::RetryAfter(delay) = self.settle(index, result, true) {
                        backing_off.insert(index);
                        backoffs.push(tokio::time::sleep(delay).map(move |_| index).boxed());
                    }
                }

                Some(index) = backoffs.next(), if !backoffs.is_empty() => {
                    backing_off.remove(&index);
                    ready.push_back(index);
                }

                _ = bucket.acquire(), if !ready.is_empty() => {
                    if let Some(index) = ready.pop_front() {
                        in_flight_ids.insert(index);
                        in_flight.push(self.submit(index));
                    }
                }
            }
        }

        debug!("Dispatch finished");
    }

    async fn shutdown(
        &mut self,
        queued: Vec<usize>,
        mut in_flight: FuturesUnordered<Attempt>,
        mut in_flight_ids: HashSet<usize>,
    ) {
        info!(
            "Cancellation requested: {} units not submitted, {} in flight asked to stop",
            queued.len(),
            in_flight_ids.len()
        );

        for index in queued {
            self.fail(index, FailureReason::Cancelled);
        }

        let grace = tokio::time::sleep(self.config.cancel_grace_period);
        tokio::pin!(grace);

        while !in_flight.is_empty() {
            tokio::select! {
                Some((index, result)) = in_flight.next() => {
                    in_flight_ids.remove(&index);
                    self.settle(index, result, false);
                }
                _ = &mut grace => {
                    warn!("Grace period over, abandoning {} unresponsive requests", in_flight_ids.len());
                    break;
                }
            }
        }

        let mut abandoned: Vec<usize> = in_flight_ids.into_iter().collect();
        abandoned.sort_unstable();
        for index in abandoned {
            self.fail(index, FailureReason::Cancelled);
        }
    }
}

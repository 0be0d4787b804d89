/*!
 * Progress aggregation.
 *
 * `ProgressAggregator` folds ticket transitions into counters and publishes a
 * `ProgressSnapshot` on every change. Publication goes through a
 * `tokio::sync::watch` channel: it holds only the latest snapshot, so a slow
 * observer skips intermediate states instead of slowing the dispatcher down.
 */

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::watch;

use super::dispatcher::{DispatchTicket, TicketState};
use crate::document::UnitKey;

/// Pipeline phase, set by the orchestrator at phase boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Segmenting,
    Translating,
    Assembling,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Segmenting => "segmenting",
            Self::Translating => "translating",
            Self::Assembling => "assembling",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: Stage,
    /// Progress within the current stage, in `[0, 1]`
    pub stage_progress: f64,
    /// `(succeeded + failed) / total`, in `[0, 1]`
    pub overall_progress: f64,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_flight: usize,
}

impl ProgressSnapshot {
    pub fn pending(&self) -> usize {
        self.total - self.succeeded - self.failed - self.in_flight
    }
}

/// Lazy sequence of snapshots; ends when the aggregator is dropped
pub type ProgressStream = std::pin::Pin<Box<dyn Stream<Item = ProgressSnapshot> + Send>>;

/// Folds ticket transitions into progress snapshots
#[derive(Debug)]
pub struct ProgressAggregator {
    total: usize,
    succeeded: usize,
    failed: usize,
    in_flight: usize,
    stage: Stage,
    stage_progress: f64,
    states: HashMap<UnitKey, TicketState>,
    sender: watch::Sender<ProgressSnapshot>,
}

impl ProgressAggregator {
    /// Aggregator for a run of `total` units, starting in `Segmenting`
    pub fn new(total: usize) -> Self {
        let initial = ProgressSnapshot {
            stage: Stage::Segmenting,
            stage_progress: 0.0,
            overall_progress: if total == 0 { 1.0 } else { 0.0 },
            total,
            succeeded: 0,
            failed: 0,
            in_flight: 0,
        };
        let (sender, _) = watch::channel(initial);
        Self {
            total,
            succeeded: 0,
            failed: 0,
            in_flight: 0,
            stage: Stage::Segmenting,
            stage_progress: 0.0,
            states: HashMap::with_capacity(total),
            sender,
        }
    }

    /// Subscribe to snapshots.
    ///
    /// The stream first yields the current snapshot, then the latest one
    /// after each change it has not seen yet. It cannot be restarted.
    pub fn subscribe(&self) -> ProgressStream {
        let receiver = self.sender.subscribe();
        Box::pin(stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let snapshot = receiver.borrow_and_update().clone();
            Some((snapshot, (receiver, false)))
        }))
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        let overall_progress = if self.total == 0 {
            1.0
        } else {
            (self.succeeded + self.failed) as f64 / self.total as f64
        };
        let stage_progress = match self.stage {
            Stage::Translating => overall_progress,
            _ => self.stage_progress,
        };
        ProgressSnapshot {
            stage: self.stage,
            stage_progress,
            overall_progress,
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            in_flight: self.in_flight,
        }
    }

    fn publish(&self) {
        self.sender.send_replace(self.snapshot());
    }

    /// Enter a new stage
    pub fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.stage_progress = 0.0;
        self.publish();
    }

    /// Report progress inside a stage that is not driven by tickets
    pub fn set_stage_progress(&mut self, progress: f64) {
        self.stage_progress = progress.clamp(0.0, 1.0).max(self.stage_progress);
        self.publish();
    }

    /// Fold one ticket transition into the counters
    pub fn observe(&mut self, ticket: &DispatchTicket) {
        let previous = self.states.get(&ticket.key).copied();
        if previous.is_some_and(TicketState::is_terminal) || previous == Some(ticket.state) {
            return;
        }

        if previous == Some(TicketState::InFlight) {
            self.in_flight -= 1;
        }
        match ticket.state {
            TicketState::Pending => {}
            TicketState::InFlight => self.in_flight += 1,
            TicketState::Succeeded => self.succeeded += 1,
            TicketState::Failed => self.failed += 1,
        }
        self.states.insert(ticket.key.clone(), ticket.state);
        self.publish();
    }

    /// Whether every unit reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed >= self.total
    }
}

/*!
 * Request rate limiting.
 *
 * `TokenBucket` holds `qps` tokens. A token spent at time `t` becomes
 * available again at `t + 1s`, so no rolling one-second window ever sees
 * more than `qps` grants. Waiting suspends on the tokio clock, which lets
 * tests drive it with a paused runtime.
 */

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

/// Token bucket with per-token regeneration
#[derive(Debug)]
pub struct TokenBucket {
    capacity: usize,
    window: Duration,
    grants: VecDeque<Instant>,
}

impl TokenBucket {
    /// Bucket allowing `qps` requests per second. A `qps` of 0 is treated as 1.
    pub fn new(qps: u32) -> Self {
        Self::with_window(qps.max(1) as usize, Duration::from_secs(1))
    }

    /// Bucket allowing `capacity` grants per `window`
    pub fn with_window(capacity: usize, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            window,
            grants: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.grants.front() {
            if oldest + self.window <= now {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take a token without waiting. Returns false if none is available.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        self.expire(now);
        if self.grants.len() < self.capacity {
            self.grants.push_back(now);
            true
        } else {
            false
        }
    }

    /// Take a token, suspending until one regenerates.
    ///
    /// Cancel safe: a token is only recorded at the moment it is granted.
    pub async fn acquire(&mut self) {
        loop {
            if self.try_acquire() {
                return;
            }
            if let Some(&oldest) = self.grants.front() {
                sleep_until(oldest + self.window).await;
            }
        }
    }
}

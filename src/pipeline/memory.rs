/*!
 * Peak resident memory sampling.
 *
 * A background task reads the process resident set size once per interval
 * and keeps the maximum. On platforms without `/proc` the sampler logs that
 * once at start and the reported peak stays zero.
 */

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Resident set size of this process in bytes, if the platform exposes it
pub fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map(|kb| kb * 1024)
}

/// Samples resident memory until stopped
#[derive(Debug)]
pub struct PeakMemorySampler {
    peak: Arc<AtomicU64>,
    handle: JoinHandle<()>,
    sample: fn() -> Option<u64>,
    available: bool,
}

impl PeakMemorySampler {
    /// Start sampling every `interval`. Takes one sample immediately.
    pub fn start(interval: Duration) -> Self {
        Self::with_source(interval, resident_memory_bytes)
    }

    fn with_source(interval: Duration, sample: fn() -> Option<u64>) -> Self {
        let first = sample();
        let available = first.is_some();
        if !available {
            debug!("Resident memory is not readable on this platform, peak memory will be reported as 0");
        }

        let peak = Arc::new(AtomicU64::new(first.unwrap_or(0)));
        let task_peak = Arc::clone(&peak);
        let handle = tokio::spawn(async move {
            if !available {
                return;
            }
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Some(bytes) = sample() {
                    task_peak.fetch_max(bytes, Ordering::Relaxed);
                }
            }
        });
        Self {
            peak,
            handle,
            sample,
            available,
        }
    }

    /// Highest value observed so far
    pub fn peak(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    /// Take a final sample, stop the task and return the peak in bytes
    pub fn stop(self) -> u64 {
        self.handle.abort();
        if !self.available {
            return 0;
        }
        if let Some(bytes) = (self.sample)() {
            self.peak.fetch_max(bytes, Ordering::Relaxed);
        }
        let peak = self.peak();
        debug!("Peak resident memory: {:.1} MiB", peak as f64 / (1024.0 * 1024.0));
        peak
    }
}

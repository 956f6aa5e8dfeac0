//! The pressure signal: current process memory usage.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::{cgroup, process};

/// Source of the memory-pressure signal.
///
/// Implementations never fail outward: a sampler that cannot produce a
/// reading returns 0, which callers treat as "unknown" (and which naturally
/// compares below any positive threshold).
pub trait UsageSampler: Send + Sync {
    /// Memory currently charged to the process, in bytes.
    fn used_bytes(&self) -> u64;
}

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(250);
const POLL_SLEEP: Duration = Duration::from_millis(5);

/// Samples the current process's memory usage from the OS.
///
/// The cgroup memory controller is preferred where available since it
/// reflects the kernel's own accounting; freshly created cgroups can
/// briefly report zero, so the counter is polled until it yields a value,
/// bounded by a timeout. When no counter is usable the sampler falls back
/// to the process resident set size, and finally to 0.
pub struct ProcessSampler {
    poll_timeout: Duration,
}

impl ProcessSampler {
    pub fn new() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// Override the bound on the counter-readiness wait.
    pub fn with_poll_timeout(poll_timeout: Duration) -> Self {
        Self { poll_timeout }
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageSampler for ProcessSampler {
    fn used_bytes(&self) -> u64 {
        if let Some(path) = cgroup::current_usage_counter() {
            if let Some(bytes) =
                poll_until_nonzero(self.poll_timeout, || cgroup::read_counter(&path))
            {
                return bytes;
            }
        }
        process::resident_bytes().unwrap_or_else(|| {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target: "vigil.memory",
                    "no usable memory statistic; reporting zero usage"
                );
            }
            0
        })
    }
}

/// Poll `read` until it yields a non-zero value or `timeout` elapses.
///
/// A zero reading means the counter exists but has not been populated yet;
/// a `None` reading means the counter went away and polling stops early.
fn poll_until_nonzero(timeout: Duration, read: impl Fn() -> Option<u64>) -> Option<u64> {
    let deadline = Instant::now() + timeout;
    loop {
        match read() {
            Some(0) => {}
            Some(bytes) => return Some(bytes),
            None => return None,
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(POLL_SLEEP);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn poll_returns_the_first_nonzero_reading() {
        let reads = AtomicU64::new(0);
        let value = poll_until_nonzero(Duration::from_secs(1), || {
            // The counter reports zero for the first two reads.
            match reads.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => Some(0),
                _ => Some(4096),
            }
        });
        assert_eq!(value, Some(4096));
    }

    #[test]
    fn poll_gives_up_after_the_timeout() {
        let start = Instant::now();
        let value = poll_until_nonzero(Duration::from_millis(30), || Some(0));
        assert_eq!(value, None);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn poll_stops_early_when_the_counter_disappears() {
        let start = Instant::now();
        let value = poll_until_nonzero(Duration::from_secs(30), || None);
        assert_eq!(value, None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn process_sampler_reports_this_process() {
        // Whichever source ends up being used, a live test process has
        // measurable memory.
        let sampler = ProcessSampler::new();
        assert!(sampler.used_bytes() > 0);
    }
}

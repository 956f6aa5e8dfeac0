//! The watchdog: threshold evaluation, mitigation sequencing, and
//! rate-limited status reporting.

use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::MonitorConfig;
use crate::host::{CacheHost, HostError, MemoryReclaimer};
use crate::sampler::UsageSampler;
use crate::tick::{TickSubscription, Ticker};
use crate::units::format_byte_size;

/// Step applied to the cache load factor on each breach that adjusts it.
const LOAD_FACTOR_STEP: f64 = 0.2;

/// Independent toggles for the mitigation actions taken on a threshold
/// breach. All default to enabled; any subset may be active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MitigationFlags {
    /// Ask the cache host to drop every cache entry.
    #[serde(default = "enabled")]
    pub clear_caches: bool,
    /// Ask the reclaimer to return unused memory to the OS.
    #[serde(default = "enabled")]
    pub reclaim_memory: bool,
    /// Raise the cache load factor by a fixed step, up to the host maximum.
    #[serde(default = "enabled")]
    pub adjust_load_factor: bool,
}

fn enabled() -> bool {
    true
}

impl Default for MitigationFlags {
    fn default() -> Self {
        Self {
            clear_caches: true,
            reclaim_memory: true,
            adjust_load_factor: true,
        }
    }
}

/// A mitigation step that failed. Mitigation steps are not isolated from
/// each other: the remaining steps of that tick (including the status
/// report) are skipped, and future ticks are unaffected.
#[derive(Debug, Error)]
pub enum MitigationError {
    #[error("cache clear failed: {0}")]
    ClearCaches(#[source] HostError),
    #[error("memory reclaim failed: {0}")]
    Reclaim(#[source] HostError),
    #[error("load factor update failed: {0}")]
    LoadFactor(#[source] HostError),
}

/// Result of evaluating one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Usage was at or below the threshold; nothing was done.
    BelowThreshold { used: u64 },
    /// Usage was over the threshold and the enabled mitigations ran.
    /// `report` is `Some` when the rate limiter allowed a status report.
    Mitigated {
        used_before: u64,
        report: Option<PressureReport>,
    },
}

/// Status report emitted at most once per minimum log interval after a
/// threshold breach.
#[derive(Debug, Clone, PartialEq)]
pub struct PressureReport {
    /// Usage sampled before mitigations ran.
    pub used_before: u64,
    /// Usage re-sampled at report time. Only a meaningful before/after
    /// pair when a reclaim pass ran.
    pub used_after: u64,
    /// Whether the cache-clear mitigation ran this tick.
    pub cleared_caches: bool,
    /// Whether a reclaim pass ran this tick.
    pub reclaimed_memory: bool,
    /// Load factor read back after adjustment; reported while adjustment
    /// is enabled.
    pub load_factor: Option<f64>,
    /// Breaches mitigated but not reported since the previous report.
    pub suppressed: u64,
}

struct LogState {
    last_report: Option<Instant>,
    suppressed: u64,
}

struct Inner {
    config: MonitorConfig,
    flags: Mutex<MitigationFlags>,
    caches: Arc<dyn CacheHost>,
    reclaimer: Arc<dyn MemoryReclaimer>,
    sampler: Arc<dyn UsageSampler>,
    log_state: Mutex<LogState>,
    subscription: OnceLock<TickSubscription>,
}

/// Periodic memory-pressure watchdog.
///
/// Samples usage on every tick and, over the configured threshold, runs the
/// enabled mitigations against the host. Cheap to clone; clones share
/// state. Runs for the lifetime of the owning process — there is no stop
/// operation beyond dropping the ticker.
#[derive(Clone)]
pub struct MemoryMonitor {
    inner: Arc<Inner>,
}

impl MemoryMonitor {
    pub fn new(
        config: MonitorConfig,
        caches: Arc<dyn CacheHost>,
        reclaimer: Arc<dyn MemoryReclaimer>,
        sampler: Arc<dyn UsageSampler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                flags: Mutex::new(MitigationFlags::default()),
                caches,
                reclaimer,
                sampler,
                log_state: Mutex::new(LogState {
                    last_report: None,
                    suppressed: 0,
                }),
                subscription: OnceLock::new(),
            }),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn flags(&self) -> MitigationFlags {
        *self.inner.flags.lock().unwrap()
    }

    /// Flag changes take effect on the next tick.
    pub fn set_flags(&self, flags: MitigationFlags) {
        *self.inner.flags.lock().unwrap() = flags;
    }

    pub fn set_clear_caches(&self, enabled: bool) {
        self.inner.flags.lock().unwrap().clear_caches = enabled;
    }

    pub fn set_reclaim_memory(&self, enabled: bool) {
        self.inner.flags.lock().unwrap().reclaim_memory = enabled;
    }

    pub fn set_adjust_load_factor(&self, enabled: bool) {
        self.inner.flags.lock().unwrap().adjust_load_factor = enabled;
    }

    /// Subscribe this monitor's tick handler to `ticker`.
    ///
    /// The first call logs the configured threshold and interval and
    /// registers the handler; repeated calls are no-ops, so a monitor never
    /// handles the same tick twice. Mitigation errors are logged by the
    /// handler and do not stop future ticks.
    pub fn initialize(&self, ticker: &Ticker) {
        self.inner.subscription.get_or_init(|| {
            tracing::info!(
                target: "vigil.memory",
                threshold = %format_byte_size(self.inner.config.threshold_bytes()),
                interval = ?self.inner.config.check_interval(),
                "memory monitor initialized"
            );
            let monitor = self.clone();
            ticker.subscribe(Arc::new(move || {
                if let Err(err) = monitor.tick() {
                    tracing::error!(
                        target: "vigil.memory",
                        error = %err,
                        "mitigation failed; remaining actions skipped for this tick"
                    );
                }
            }))
        });
    }

    /// Evaluate one tick now. Invoked by the subscribed tick handler; also
    /// callable directly by hosts that drive their own schedule.
    pub fn tick(&self) -> Result<TickOutcome, MitigationError> {
        self.tick_at(Instant::now())
    }

    /// Evaluate one tick as of `now`. Deterministic entry point for hosts
    /// and tests that control time themselves.
    pub fn tick_at(&self, now: Instant) -> Result<TickOutcome, MitigationError> {
        let used_before = self.inner.sampler.used_bytes();
        if used_before <= self.inner.config.threshold_bytes() {
            return Ok(TickOutcome::BelowThreshold { used: used_before });
        }

        let flags = self.flags();
        if flags.clear_caches {
            self.inner
                .caches
                .clear_all()
                .map_err(MitigationError::ClearCaches)?;
        }
        if flags.reclaim_memory {
            self.inner
                .reclaimer
                .reclaim()
                .map_err(MitigationError::Reclaim)?;
        }
        if flags.adjust_load_factor {
            self.raise_load_factor()?;
        }

        let report = self.report_if_due(used_before, flags, now);
        Ok(TickOutcome::Mitigated {
            used_before,
            report,
        })
    }

    /// Raise the cache load factor one step, clamped to the host maximum.
    /// Never lowers it.
    fn raise_load_factor(&self) -> Result<(), MitigationError> {
        let current = self.inner.caches.load_factor();
        let max = self.inner.caches.max_load_factor();
        if current < max {
            let next = (current + LOAD_FACTOR_STEP).min(max);
            self.inner
                .caches
                .set_load_factor(next)
                .map_err(MitigationError::LoadFactor)?;
        }
        Ok(())
    }

    /// Rate-limited reporting: within the minimum log interval of the last
    /// emitted report, breaches only bump the suppressed counter.
    fn report_if_due(
        &self,
        used_before: u64,
        flags: MitigationFlags,
        now: Instant,
    ) -> Option<PressureReport> {
        let mut state = self.inner.log_state.lock().unwrap();
        if let Some(last) = state.last_report {
            if now.duration_since(last) < self.inner.config.min_log_interval() {
                state.suppressed += 1;
                return None;
            }
        }

        let used_after = self.inner.sampler.used_bytes();
        let load_factor = flags
            .adjust_load_factor
            .then(|| self.inner.caches.load_factor());
        let report = PressureReport {
            used_before,
            used_after,
            cleared_caches: flags.clear_caches,
            reclaimed_memory: flags.reclaim_memory,
            load_factor,
            suppressed: state.suppressed,
        };
        state.last_report = Some(now);
        state.suppressed = 0;
        drop(state);

        self.emit(&report);
        Some(report)
    }

    /// Multi-line status report, phrased to match what actually ran.
    fn emit(&self, report: &PressureReport) {
        let mut summary = String::from("memory usage exceeded the monitor threshold");
        if report.cleared_caches {
            summary.push_str("; all caches cleared");
        }
        if report.reclaimed_memory {
            summary.push_str("; reclaim pass forced");
        }
        tracing::warn!(
            target: "vigil.memory",
            threshold = %format_byte_size(self.inner.config.threshold_bytes()),
            "{summary}"
        );

        if report.reclaimed_memory {
            tracing::warn!(
                target: "vigil.memory",
                before = %format_byte_size(report.used_before),
                after = %format_byte_size(report.used_after),
                "memory used before/after reclaim"
            );
        } else {
            tracing::warn!(
                target: "vigil.memory",
                used = %format_byte_size(report.used_after),
                "memory usage"
            );
        }
        if let Some(load_factor) = report.load_factor {
            tracing::warn!(
                target: "vigil.memory",
                load_factor,
                "current cache load factor"
            );
        }
        tracing::warn!(
            target: "vigil.memory",
            suppressed = report.suppressed,
            "reports suppressed since the previous one"
        );
    }
}

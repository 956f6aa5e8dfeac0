//! Periodic memory-pressure watchdog.
//!
//! Vigil samples process memory usage on a fixed interval and, when usage
//! exceeds a configured threshold, runs a bounded set of host-provided
//! mitigations — cache clearing, memory reclaim, cache load-factor tuning —
//! while rate-limiting its own status reports.
//!
//! The crate is deliberately a decision loop over host primitives: cache
//! internals, scheduling, and the logging sink stay on the host side of the
//! [`CacheHost`], [`MemoryReclaimer`], [`Ticker`] and [`UsageSampler`]
//! seams. Log events are emitted through `tracing` under the
//! `"vigil.memory"` target.

mod cgroup;
mod config;
mod host;
mod monitor;
mod process;
mod sampler;
mod tick;
mod units;

pub use config::{ConfigError, MonitorConfig};
pub use host::{CacheHost, HostError, MemoryReclaimer, TrimReclaimer};
pub use monitor::{MemoryMonitor, MitigationError, MitigationFlags, PressureReport, TickOutcome};
pub use sampler::{ProcessSampler, UsageSampler};
pub use tick::{TickSubscription, Ticker};
pub use units::{
    format_byte_size, parse_byte_size, parse_duration, ParseDurationError, ParseSizeError,
};

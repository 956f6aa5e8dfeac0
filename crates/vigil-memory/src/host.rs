//! Collaborator traits implemented by the host application.

use thiserror::Error;

/// Error surfaced by a host collaborator when a mitigation request fails.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// The host's cache subsystem, as seen by the monitor.
///
/// The load factor is a host-defined multiplier controlling how aggressively
/// caches retain entries; the monitor only ever raises it, in fixed steps,
/// up to [`CacheHost::max_load_factor`]. A single monitor serializes the
/// read-modify-write through its tick handling; hosts backing several
/// concurrently-ticking monitors must make `set_load_factor` atomic with
/// respect to `load_factor` themselves.
pub trait CacheHost: Send + Sync {
    /// Drop every cache entry the host owns.
    fn clear_all(&self) -> Result<(), HostError>;

    /// Current cache load factor.
    fn load_factor(&self) -> f64;

    /// Replace the cache load factor.
    fn set_load_factor(&self, value: f64) -> Result<(), HostError>;

    /// Host-configured ceiling for the load factor.
    fn max_load_factor(&self) -> f64;
}

/// Maximum-effort release of unused memory back to the OS.
pub trait MemoryReclaimer: Send + Sync {
    fn reclaim(&self) -> Result<(), HostError>;
}

/// Reclaimer that returns free heap pages to the OS via `malloc_trim` where
/// the allocator supports it; a no-op elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimReclaimer;

impl MemoryReclaimer for TrimReclaimer {
    fn reclaim(&self) -> Result<(), HostError> {
        #[cfg(all(target_os = "linux", target_env = "gnu"))]
        unsafe {
            libc::malloc_trim(0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_error_carries_its_source() {
        let io = std::io::Error::other("backend gone");
        let err = HostError::with_source("cache clear failed", io);
        assert_eq!(err.to_string(), "cache clear failed");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn trim_reclaimer_is_infallible() {
        assert!(TrimReclaimer.reclaim().is_ok());
    }
}

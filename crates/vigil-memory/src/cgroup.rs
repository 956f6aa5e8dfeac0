//! Preferred usage counter: the cgroup memory controller.
//!
//! On Linux the kernel's own accounting for the process tree is exposed as
//! `memory.current` (v2) or `memory.usage_in_bytes` (v1). Resolution and
//! reading are split into pure, path-parameterized helpers so tests can
//! point them at synthetic trees.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Relative cgroup paths extracted from `/proc/self/cgroup` contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MemoryCgroup {
    /// Unified (v2) hierarchy path, from a `0::/path` line.
    pub(crate) unified: Option<String>,
    /// Legacy (v1) memory controller path.
    pub(crate) legacy_memory: Option<String>,
}

/// Extract the memory-relevant cgroup paths from `/proc/self/cgroup`
/// contents.
pub(crate) fn memory_cgroup_from_proc(contents: &str) -> MemoryCgroup {
    let mut cgroup = MemoryCgroup::default();
    for line in contents.lines() {
        let mut fields = line.trim().splitn(3, ':');
        let (Some(id), Some(controllers), Some(path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        let path = path.trim();
        if path.is_empty() {
            continue;
        }
        if cgroup.unified.is_none() && id == "0" && controllers.is_empty() {
            cgroup.unified = Some(path.to_string());
        }
        if cgroup.legacy_memory.is_none()
            && controllers.split(',').any(|controller| controller.trim() == "memory")
        {
            cgroup.legacy_memory = Some(path.to_string());
        }
    }
    cgroup
}

/// Locate the counter file reporting this cgroup's current memory usage,
/// preferring the unified hierarchy.
pub(crate) fn usage_counter_path(
    cgroup: &MemoryCgroup,
    v2_root: &Path,
    v1_root: &Path,
) -> Option<PathBuf> {
    if let Some(path) = &cgroup.unified {
        let candidate = v2_root.join(relative(path)).join("memory.current");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    if let Some(path) = &cgroup.legacy_memory {
        let candidate = v1_root.join(relative(path)).join("memory.usage_in_bytes");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn relative(cgroup_path: &str) -> &Path {
    Path::new(cgroup_path.trim_start_matches('/'))
}

/// Read and parse a usage counter. Failures degrade to `None` and are
/// reported at most once per site to avoid spamming a hot sampling path.
pub(crate) fn read_counter(path: &Path) -> Option<u64> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                static REPORTED: OnceLock<()> = OnceLock::new();
                if REPORTED.set(()).is_ok() {
                    tracing::debug!(
                        target: "vigil.memory",
                        path = %path.display(),
                        error = %err,
                        "failed to read cgroup usage counter"
                    );
                }
            }
            return None;
        }
    };
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(err) => {
            static REPORTED: OnceLock<()> = OnceLock::new();
            if REPORTED.set(()).is_ok() {
                tracing::debug!(
                    target: "vigil.memory",
                    path = %path.display(),
                    raw = raw.trim(),
                    error = %err,
                    "failed to parse cgroup usage counter"
                );
            }
            None
        }
    }
}

/// Resolve the current-usage counter for this process, if the kernel
/// exposes one.
#[cfg(target_os = "linux")]
pub(crate) fn current_usage_counter() -> Option<PathBuf> {
    let contents = match std::fs::read_to_string("/proc/self/cgroup") {
        Ok(contents) => contents,
        Err(err) => {
            // `/proc` may be missing entirely in sandboxed environments.
            if err.kind() != std::io::ErrorKind::NotFound {
                static REPORTED: OnceLock<()> = OnceLock::new();
                if REPORTED.set(()).is_ok() {
                    tracing::debug!(
                        target: "vigil.memory",
                        error = %err,
                        "failed to read /proc/self/cgroup"
                    );
                }
            }
            return None;
        }
    };
    let cgroup = memory_cgroup_from_proc(&contents);
    usage_counter_path(
        &cgroup,
        Path::new("/sys/fs/cgroup"),
        Path::new("/sys/fs/cgroup/memory"),
    )
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn current_usage_counter() -> Option<PathBuf> {
    None
}

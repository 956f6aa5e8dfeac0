//! Fallback usage statistic: the process resident set size.

#[cfg(target_os = "linux")]
use std::sync::OnceLock;

/// Best-effort resident set size of the current process, in bytes.
pub(crate) fn resident_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    if let Some(bytes) = statm_resident_bytes() {
        return Some(bytes);
    }
    sysinfo_resident_bytes()
}

/// Resident pages from `/proc/self/statm`, scaled by the page size.
#[cfg(target_os = "linux")]
fn statm_resident_bytes() -> Option<u64> {
    let statm = match std::fs::read_to_string("/proc/self/statm") {
        Ok(statm) => statm,
        Err(err) => {
            // `/proc` may be missing in sandboxed environments.
            if err.kind() != std::io::ErrorKind::NotFound {
                static REPORTED: OnceLock<()> = OnceLock::new();
                if REPORTED.set(()).is_ok() {
                    tracing::debug!(
                        target: "vigil.memory",
                        error = %err,
                        "failed to read /proc/self/statm while sampling rss"
                    );
                }
            }
            return None;
        }
    };
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages.saturating_mul(page_size()))
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw < 1 {
        4096
    } else {
        raw as u64
    }
}

fn sysinfo_resident_bytes() -> Option<u64> {
    use sysinfo::{ProcessRefreshKind, System};

    let pid = sysinfo::get_current_pid().ok()?;
    let mut system = System::new();
    system.refresh_process_specifics(pid, ProcessRefreshKind::new().with_memory());
    system.process(pid).map(|process| process.memory())
}

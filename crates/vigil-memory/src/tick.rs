//! Shared periodic tick source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, Weak};
use std::time::Duration;

type TickHandler = Arc<dyn Fn() + Send + Sync>;

struct TickerInner {
    interval: Duration,
    next_id: AtomicU64,
    handlers: Mutex<Vec<(u64, TickHandler)>>,
    started: Once,
}

/// A periodic tick source backed by one timer thread.
///
/// The thread is started lazily by the first subscription and shared by
/// every subscriber; handlers are dispatched sequentially on it, so at most
/// one handler runs at a time per ticker. Clones share the same thread —
/// hand the same `Ticker` to every component that should tick on this
/// cadence. The thread exits within one interval of the last `Ticker`
/// handle being dropped.
#[derive(Clone)]
pub struct Ticker {
    inner: Arc<TickerInner>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            inner: Arc::new(TickerInner {
                interval,
                next_id: AtomicU64::new(1),
                handlers: Mutex::new(Vec::new()),
                started: Once::new(),
            }),
        }
    }

    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Register `handler` to run on every tick, starting the timer thread
    /// if this is the first subscription. Dropping the returned guard stops
    /// delivery to `handler`.
    pub fn subscribe(&self, handler: TickHandler) -> TickSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.handlers.lock().unwrap().push((id, handler));

        let weak = Arc::downgrade(&self.inner);
        self.inner.started.call_once(|| {
            let thread_weak = weak.clone();
            if let Err(err) = std::thread::Builder::new()
                .name("vigil-ticker".to_string())
                .spawn(move || run_timer(thread_weak))
            {
                tracing::error!(
                    target: "vigil.memory",
                    error = %err,
                    "failed to spawn ticker thread; ticks will not fire"
                );
            }
        });

        TickSubscription { id, ticker: weak }
    }
}

fn run_timer(weak: Weak<TickerInner>) {
    let Some(interval) = weak.upgrade().map(|inner| inner.interval) else {
        return;
    };
    loop {
        std::thread::sleep(interval);
        let Some(inner) = weak.upgrade() else {
            return;
        };
        // Snapshot under the lock, dispatch outside it, so handlers may
        // subscribe or unsubscribe freely.
        let handlers: Vec<TickHandler> = inner
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        drop(inner);
        for handler in handlers {
            // A panicking handler is fatal to its tick, not to the timer
            // thread.
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler())).is_err() {
                tracing::error!(target: "vigil.memory", "tick handler panicked");
            }
        }
    }
}

/// Guard for a ticker subscription; dropping it removes the handler.
///
/// The guard holds no strong reference to the ticker: ticks keep firing
/// only for as long as the owning `Ticker` handle is alive.
pub struct TickSubscription {
    id: u64,
    ticker: Weak<TickerInner>,
}

impl Drop for TickSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.ticker.upgrade() {
            inner.handlers.lock().unwrap().retain(|(id, _)| *id != self.id);
        }
    }
}

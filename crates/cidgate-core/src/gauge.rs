// ── In-flight gauge ──

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts concurrent holders and remembers the highest count seen.
#[derive(Debug, Default)]
pub(crate) struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    /// Register one holder until the guard drops.
    pub(crate) fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

pub(crate) struct GaugeGuard(Arc<Gauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

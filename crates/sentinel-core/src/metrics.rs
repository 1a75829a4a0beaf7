//! Global atomic counters for monitor observability.
//!
//! Counters are bumped silently at the call site. [`Metrics::flush`] emits
//! every current value as one `tracing::info!` event; the daemon calls it on
//! a timer and the CLI once at exit.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// One monotonically increasing counter.
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
        }
    }

    fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = self.name, "counter incremented");
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Lock-free process-wide counters.
pub struct Metrics {
    pub sessions_started: Counter,
    pub sessions_ended: Counter,
    pub samples_accepted: Counter,
    pub samples_dropped: Counter,
    pub samples_analyzed: Counter,
    pub analyses_degraded: Counter,
    pub alerts_raised: Counter,
    pub broadcast_failures: Counter,
    pub audit_dropped: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_started: Counter::new("sessions_started"),
            sessions_ended: Counter::new("sessions_ended"),
            samples_accepted: Counter::new("samples_accepted"),
            samples_dropped: Counter::new("samples_dropped"),
            samples_analyzed: Counter::new("samples_analyzed"),
            analyses_degraded: Counter::new("analyses_degraded"),
            alerts_raised: Counter::new("alerts_raised"),
            broadcast_failures: Counter::new("broadcast_failures"),
            audit_dropped: Counter::new("audit_dropped"),
        }
    }

    pub fn inc_sessions_started(&self) {
        self.sessions_started.inc();
    }

    pub fn inc_sessions_ended(&self) {
        self.sessions_ended.inc();
    }

    /// Count an enqueue; `dropped` when it evicted an older sample.
    pub fn inc_enqueued(&self, dropped: bool) {
        self.samples_accepted.inc();
        if dropped {
            self.samples_dropped.inc();
        }
    }

    pub fn inc_analyzed(&self, degraded: bool) {
        self.samples_analyzed.inc();
        if degraded {
            self.analyses_degraded.inc();
        }
    }

    pub fn inc_alerts(&self) {
        self.alerts_raised.inc();
    }

    pub fn inc_broadcast_failures(&self) {
        self.broadcast_failures.inc();
    }

    pub fn inc_audit_dropped(&self) {
        self.audit_dropped.inc();
    }

    fn all(&self) -> [&Counter; 9] {
        [
            &self.sessions_started,
            &self.sessions_ended,
            &self.samples_accepted,
            &self.samples_dropped,
            &self.samples_analyzed,
            &self.analyses_degraded,
            &self.alerts_raised,
            &self.broadcast_failures,
            &self.audit_dropped,
        ]
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            sessions_started = self.sessions_started.get(),
            sessions_ended = self.sessions_ended.get(),
            samples_accepted = self.samples_accepted.get(),
            samples_dropped = self.samples_dropped.get(),
            samples_analyzed = self.samples_analyzed.get(),
            analyses_degraded = self.analyses_degraded.get(),
            alerts_raised = self.alerts_raised.get(),
            broadcast_failures = self.broadcast_failures.get(),
            audit_dropped = self.audit_dropped.get(),
        );
    }

    /// `(name, value)` pairs, for the daemon's metrics endpoint.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.all().iter().map(|c| (c.name, c.get())).collect()
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for c in self.all() {
            c.reset();
        }
    }
}

//! Monitor configuration.
//!
//! Defaults match production tuning; [`MonitorConfig::from_env`] overrides
//! individual fields from `SENTINEL_*` variables. Values that fail to parse
//! fall back to the default rather than aborting startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::escalation::EscalationPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Pending samples kept per session before the oldest is evicted
    pub queue_capacity: usize,
    /// How long the loop waits for a sample before warning the subject
    pub sample_timeout: Duration,
    /// Upper bound on one oracle call
    pub oracle_timeout: Duration,
    /// Alerts kept for GetStatus
    pub recent_alerts: usize,
    pub escalation: EscalationPolicy,
    /// Audit records buffered before new ones are dropped
    pub audit_buffer: usize,
    /// Ended sessions remembered for idempotent end/terminate
    pub retired_capacity: usize,
    /// Per-subscriber outbound buffer
    pub subscriber_buffer: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 20,
            sample_timeout: Duration::from_secs(30),
            oracle_timeout: Duration::from_secs(10),
            recent_alerts: 5,
            escalation: EscalationPolicy::default(),
            audit_buffer: 1024,
            retired_capacity: 1024,
            subscriber_buffer: 64,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default: Duration) -> Duration {
    let ms = env_u64(name, default.as_millis() as u64);
    if ms == 0 {
        default
    } else {
        Duration::from_millis(ms)
    }
}

impl MonitorConfig {
    /// Defaults overridden by:
    ///
    /// - `SENTINEL_QUEUE_CAPACITY`
    /// - `SENTINEL_SAMPLE_TIMEOUT_MS`
    /// - `SENTINEL_ORACLE_TIMEOUT_MS`
    /// - `SENTINEL_RECENT_ALERTS`
    /// - `SENTINEL_MAX_ALERTS`
    /// - `SENTINEL_MAX_STREAK`
    /// - `SENTINEL_AUDIT_BUFFER`
    /// - `SENTINEL_RETIRED_CAPACITY`
    /// - `SENTINEL_SUBSCRIBER_BUFFER`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            queue_capacity: env_usize("SENTINEL_QUEUE_CAPACITY", d.queue_capacity),
            sample_timeout: env_duration_ms("SENTINEL_SAMPLE_TIMEOUT_MS", d.sample_timeout),
            oracle_timeout: env_duration_ms("SENTINEL_ORACLE_TIMEOUT_MS", d.oracle_timeout),
            recent_alerts: env_usize("SENTINEL_RECENT_ALERTS", d.recent_alerts),
            escalation: EscalationPolicy {
                max_alerts: env_u64("SENTINEL_MAX_ALERTS", d.escalation.max_alerts),
                max_streak: env_u64("SENTINEL_MAX_STREAK", d.escalation.max_streak as u64) as u32,
            },
            audit_buffer: env_usize("SENTINEL_AUDIT_BUFFER", d.audit_buffer),
            retired_capacity: env_usize("SENTINEL_RETIRED_CAPACITY", d.retired_capacity),
            subscriber_buffer: env_usize("SENTINEL_SUBSCRIBER_BUFFER", d.subscriber_buffer),
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    pub fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    pub fn with_escalation(mut self, policy: EscalationPolicy) -> Self {
        self.escalation = policy;
        self
    }
}

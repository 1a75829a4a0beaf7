//! Sentinel Core Library
//!
//! Real-time integrity monitoring for online exam sessions:
//! - bounded per-session sample queues with drop-oldest overflow
//! - oracle-backed analysis that degrades to a default judgment on faults
//! - rule-table violation detection, aggregation and integrity scoring
//! - escalation policy and manual proctor actions
//! - fault-isolated alert fan-out to subject and proctor connections
//! - asynchronous audit trail through `sentinel-store`

pub mod analysis;
pub mod audit;
pub mod config;
pub mod detector;
pub mod domain;
pub mod error;
pub mod escalation;
pub mod hub;
pub mod messages;
pub mod metrics;
pub mod monitor;
pub mod obs;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod tracker;

pub use analysis::{Analysis, AnalysisClient};
pub use audit::AuditWriter;
pub use config::MonitorConfig;
pub use detector::detect;
pub use domain::{
    Alert, ProctorAction, SessionInfo, SessionSnapshot, SessionStatus, SessionSummary, Severity,
    StatusReport, Violation, ViolationType,
};
pub use error::{MonitorError, Result};
pub use escalation::{
    evaluate, EscalationAction, EscalationDecision, EscalationPolicy, EscalationReason,
};
pub use hub::{
    AlertHub, BroadcastReport, ChannelSink, MessageSink, Registration, SinkError, SubscriberRole,
    SubscriptionToken,
};
pub use messages::{MonitorMessage, StatusPayload};
pub use monitor::{EndRequest, SessionMonitor};
pub use queue::{EnqueueOutcome, QueueClosed, SampleQueue};
pub use registry::{SessionRegistry, SubmitReceipt};
pub use tracker::{ViolationAggregate, ViolationTracker};

//! Domain types for session monitoring.
//!
//! Sessions, violations and alerts, plus the fixed violation catalog.

pub mod action;
pub mod alert;
pub mod session;
pub mod violation;

pub use action::ProctorAction;
pub use alert::Alert;
pub use session::{SessionInfo, SessionSnapshot, SessionStatus, SessionSummary, StatusReport};
pub use violation::{Severity, Violation, ViolationType};

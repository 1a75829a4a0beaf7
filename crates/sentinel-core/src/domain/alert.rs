use chrono::{DateTime, Utc};
use sentinel_oracle::Judgment;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::violation::{Severity, ViolationType};

/// Everything one analysis cycle found, bundled for proctors.
///
/// Severity is the highest among the bundled violations; description and
/// recommendation come from that most severe type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub session_id: String,
    pub sample_id: Uuid,
    pub severity: Severity,
    pub violations: Vec<ViolationType>,
    pub description: String,
    pub recommendation: String,
    pub confidence: f64,
    pub suspicion_score: f64,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Bundle a cycle's violations. Returns `None` for a clean cycle.
    pub fn bundle(
        session_id: &str,
        sample_id: Uuid,
        violations: &[ViolationType],
        judgment: &Judgment,
        at: DateTime<Utc>,
    ) -> Option<Alert> {
        // first of the highest severity keeps rule-table order as the tie-break
        let lead = violations
            .iter()
            .copied()
            .fold(None::<ViolationType>, |best, v| match best {
                Some(b) if b.severity() >= v.severity() => Some(b),
                _ => Some(v),
            })?;

        Some(Alert {
            alert_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            sample_id,
            severity: lead.severity(),
            violations: violations.to_vec(),
            description: lead.description().to_string(),
            recommendation: lead.recommendation().to_string(),
            confidence: judgment.confidence,
            suspicion_score: judgment.suspicion_score,
            created_at: at,
        })
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }
}

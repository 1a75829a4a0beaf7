use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sentinel_core::{
    detect, ChannelSink, MonitorConfig, MonitorError, MonitorMessage, SessionInfo,
    SessionRegistry, SessionSummary, SubscriberRole, ViolationType,
};
use sentinel_oracle::fakes::{Scripted, ScriptedOracle};
use sentinel_oracle::{parse_verdict, Judgment, SampleKind};
use sentinel_store::fakes::MemoryAuditLog;
use sentinel_store::{AuditLog, SurrealAuditLog};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How long a simulation may run before it is abandoned.
const SIMULATION_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub violation: ViolationType,
    pub severity: String,
    pub penalty: f64,
    pub description: &'static str,
}

pub fn catalog() -> Vec<CatalogEntry> {
    ViolationType::ALL
        .iter()
        .map(|ty| CatalogEntry {
            violation: *ty,
            severity: ty.severity().to_string(),
            penalty: ty.severity().penalty(),
            description: ty.description(),
        })
        .collect()
}

pub fn cmd_catalog(json: bool) -> Result<()> {
    let entries = catalog();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    println!("{:<30} {:<9} {:>7}  description", "violation", "severity", "penalty");
    for entry in &entries {
        println!(
            "{:<30} {:<9} {:>7.2}  {}",
            entry.violation.name(),
            entry.severity,
            entry.penalty,
            entry.description
        );
    }
    Ok(())
}

/// Detector output for one judgment file.
///
/// Accepts either a serialized [`Judgment`] (recognized by its `flags` list)
/// or a raw analysis-service verdict.
pub fn detect_file(path: &Path) -> Result<Vec<ViolationType>> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let judgment = parse_judgment(&body)
        .with_context(|| format!("{} is not a judgment", path.display()))?;
    debug!(faces = ?judgment.faces, flags = judgment.flags.len(), "judgment loaded");
    Ok(detect(&judgment))
}

fn parse_judgment(body: &str) -> Result<Judgment> {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        // may still be a fenced verdict
        Err(_) => return Ok(parse_verdict(body)?),
    };
    if value.get("flags").is_some_and(|f| f.is_array()) {
        Ok(serde_json::from_value(value)?)
    } else {
        Ok(parse_verdict(body)?)
    }
}

pub fn cmd_detect(path: &Path, json: bool) -> Result<()> {
    let violations = detect_file(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&violations)?);
        return Ok(());
    }
    if violations.is_empty() {
        println!("no violations");
    }
    for ty in &violations {
        println!("{} ({})", ty.name(), ty.severity());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// A scripted session: one sample is submitted per step and the oracle
/// answers it with the step's outcome.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationScript {
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// Reason passed to EndSession once every step is processed
    #[serde(default)]
    pub end_reason: Option<String>,
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptStep {
    #[serde(default)]
    pub kind: Option<SampleKind>,
    pub outcome: Scripted,
}

fn default_session_id() -> String {
    "simulated-session".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Every message a proctor connection received, in order
    pub messages: Vec<MonitorMessage>,
    pub summary: SessionSummary,
}

pub fn load_script(path: &Path) -> Result<SimulationScript> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("{} is not a simulation script", path.display()))
}

pub async fn simulate(script: SimulationScript) -> Result<SimulationReport> {
    let steps = script.steps.len();
    let oracle = ScriptedOracle::new(script.steps.iter().map(|s| s.outcome.clone()));
    let config = MonitorConfig::default().with_queue_capacity(steps.max(1));
    let registry = SessionRegistry::new(Arc::new(oracle), Arc::new(MemoryAuditLog::new()), config);

    let session_id = script.session_id.clone();
    registry
        .start_session(SessionInfo::new(&session_id, "simulated-subject", "simulated-exam", "1"))
        .await?;

    let (sink, mut rx) = ChannelSink::new(1024);
    registry
        .subscribe(&session_id, "simulator", SubscriberRole::Proctor, Arc::new(sink))
        .await?;
    let collector: JoinHandle<Vec<MonitorMessage>> = tokio::spawn(async move {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            let last = matches!(message, MonitorMessage::SessionEnded { .. });
            messages.push(message);
            if last {
                break;
            }
        }
        messages
    });

    let mut submitted = 0u64;
    for (i, step) in script.steps.iter().enumerate() {
        let kind = step.kind.unwrap_or(SampleKind::Frame);
        let payload = format!("{session_id}-step-{i}").into_bytes();
        match registry.submit_sample(&session_id, kind, Utc::now(), payload) {
            Ok(_) => submitted += 1,
            // the session ended mid-script
            Err(MonitorError::SessionNotFound(_)) => break,
            Err(e) => return Err(e.into()),
        }
    }
    info!(session_id = %session_id, submitted, "simulation samples submitted");

    wait_until_drained(&registry, &session_id, submitted).await?;

    let reason = script.end_reason.as_deref().unwrap_or("submitted");
    let summary = registry.end_session(&session_id, reason).await?;
    registry.shutdown().await;

    let messages = tokio::time::timeout(SIMULATION_DEADLINE, collector)
        .await
        .context("proctor stream did not finish")?
        .context("message collector failed")?;

    Ok(SimulationReport { messages, summary })
}

async fn wait_until_drained(registry: &SessionRegistry, session_id: &str, submitted: u64) -> Result<()> {
    let deadline = tokio::time::Instant::now() + SIMULATION_DEADLINE;
    loop {
        let report = registry.get_status(session_id)?;
        if report.status.is_terminal() || report.frames_processed >= submitted {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "simulation stalled after {} of {} samples",
                report.frames_processed,
                submitted
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn cmd_simulate(path: &Path, quiet: bool, json: bool) -> Result<()> {
    let script = load_script(path)?;
    let report = simulate(script).await?;

    if json {
        if quiet {
            println!("{}", serde_json::to_string_pretty(&report.summary)?);
        } else {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        return Ok(());
    }

    if !quiet {
        for message in &report.messages {
            println!("{}", message.to_json()?);
        }
    }
    let s = &report.summary;
    println!("session:     {}", s.session_id);
    println!("status:      {}", s.final_status);
    println!("integrity:   {:.2}", s.integrity_score);
    println!("frames:      {}", s.frames_processed);
    println!("violations:  {}", s.violations_detected);
    println!("alerts:      {}", s.alerts_generated);
    if let Some(reason) = &s.end_reason {
        println!("end reason:  {reason}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

pub async fn cmd_audit(session_id: Option<&str>, json: bool) -> Result<()> {
    let log = SurrealAuditLog::from_env()
        .await
        .context("failed to open audit store")?;

    let Some(session_id) = session_id else {
        let sessions = log.list_sessions().await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        } else {
            for id in sessions {
                println!("{id}");
            }
        }
        return Ok(());
    };

    let records = log.records_for(session_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("no audit records for {session_id}");
    }
    for record in &records {
        println!(
            "{:>4}  {}  {:<18} {}",
            record.seq,
            record.recorded_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.kind,
            record.payload
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::SessionStatus;
    use sentinel_oracle::ConditionFlag;

    fn step(judgment: Judgment) -> ScriptStep {
        ScriptStep {
            kind: None,
            outcome: Scripted::Judgment(judgment),
        }
    }

    #[test]
    fn catalog_lists_every_type() {
        let entries = catalog();
        assert_eq!(entries.len(), ViolationType::ALL.len());
        let no_face = entries
            .iter()
            .find(|e| e.violation == ViolationType::NoFaceDetected)
            .unwrap();
        assert_eq!(no_face.severity, "critical");
        assert_eq!(no_face.penalty, 0.30);
    }

    #[test]
    fn detect_reads_judgment_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("judgment.json");
        std::fs::write(&path, r#"{"faces": 2, "flags": ["phone_visible"]}"#).unwrap();

        let found = detect_file(&path).unwrap();
        assert!(found.contains(&ViolationType::MultipleFacesDetected));
        assert!(found.contains(&ViolationType::UnauthorizedObjectDetected));
    }

    #[test]
    fn detect_reads_raw_verdicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verdict.json");
        std::fs::write(
            &path,
            "```json\n{\"faces_detected\": 1, \"analysis\": {\"reading_from_paper\": true}}\n```",
        )
        .unwrap();

        assert_eq!(detect_file(&path).unwrap(), vec![ViolationType::ReadingFromPaper]);
    }

    #[test]
    fn detect_rejects_missing_file() {
        let err = detect_file(Path::new("/nonexistent/judgment.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn script_parses_with_defaults() {
        let script: SimulationScript = serde_json::from_str(
            r#"{"steps": [{"outcome": "unavailable"}, {"kind": "audio", "outcome": {"judgment": {"speakers": 2}}}]}"#,
        )
        .unwrap();
        assert_eq!(script.session_id, "simulated-session");
        assert_eq!(script.steps.len(), 2);
        assert_eq!(script.steps[1].kind, Some(SampleKind::Audio));
    }

    #[tokio::test]
    async fn clean_script_completes() {
        let script = SimulationScript {
            session_id: "sim-clean".into(),
            end_reason: None,
            steps: (0..3).map(|_| step(Judgment::frame(1))).collect(),
        };
        let report = simulate(script).await.unwrap();
        assert_eq!(report.summary.final_status, SessionStatus::Completed);
        assert_eq!(report.summary.frames_processed, 3);
        assert_eq!(report.summary.integrity_score, 1.0);
        assert!(matches!(
            report.messages.last(),
            Some(MonitorMessage::SessionEnded { .. })
        ));
    }

    #[tokio::test]
    async fn missing_face_terminates_simulation() {
        let script = SimulationScript {
            session_id: "sim-absent".into(),
            end_reason: None,
            steps: vec![step(Judgment::frame(1)), step(Judgment::frame(0)), step(Judgment::frame(1))],
        };
        let report = simulate(script).await.unwrap();
        assert_eq!(report.summary.final_status, SessionStatus::Terminated);
        assert!(report
            .messages
            .iter()
            .any(|m| m.kind() == "live_alert"));
    }

    #[tokio::test]
    async fn gaze_streak_is_flagged() {
        let gaze = Judgment::frame(1).with_flag(ConditionFlag::GazeAway);
        let script = SimulationScript {
            session_id: "sim-gaze".into(),
            end_reason: Some("time_up".into()),
            steps: (0..4).map(|_| step(gaze.clone())).collect(),
        };
        let report = simulate(script).await.unwrap();
        assert_eq!(report.summary.final_status, SessionStatus::Flagged);
        assert_eq!(report.summary.end_reason.as_deref(), Some("time_up"));
    }
}

//! Deterministic oracles (testing and simulation)
//!
//! - `FixedOracle` returns the same judgment for every sample
//! - `ScriptedOracle` replays a queue of outcomes, then falls back to a default
//! - `FailingOracle` always fails with the configured error kind
//! - `StallingOracle` never answers, for timeout tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OracleError, OracleResult};
use crate::judgment::Judgment;
use crate::oracle::AnalysisOracle;
use crate::sample::Sample;

// ---------------------------------------------------------------------------
// FixedOracle
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FixedOracle {
    judgment: Judgment,
    calls: AtomicUsize,
}

impl FixedOracle {
    pub fn new(judgment: Judgment) -> Self {
        Self {
            judgment,
            calls: AtomicUsize::new(0),
        }
    }

    /// One face, nothing else: a clean frame.
    pub fn clean() -> Self {
        Self::new(Judgment::frame(1))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AnalysisOracle for FixedOracle {
    async fn analyze(&self, _sample: &Sample) -> OracleResult<Judgment> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.judgment.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedOracle
// ---------------------------------------------------------------------------

/// One scripted outcome.
///
/// Serialized externally tagged: `{"judgment": {...}}`, `"unavailable"`, `"malformed"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scripted {
    Judgment(Judgment),
    Unavailable,
    Malformed,
}

/// Replays scripted outcomes in order, one per call.
///
/// Once the script runs out every call returns `fallback`.
#[derive(Debug)]
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Judgment,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(script: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback: Judgment::frame(1),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn judgments(judgments: impl IntoIterator<Item = Judgment>) -> Self {
        Self::new(judgments.into_iter().map(Scripted::Judgment))
    }

    pub fn with_fallback(mut self, fallback: Judgment) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

#[async_trait]
impl AnalysisOracle for ScriptedOracle {
    async fn analyze(&self, _sample: &Sample) -> OracleResult<Judgment> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Judgment(j)) => Ok(j),
            Some(Scripted::Unavailable) => {
                Err(OracleError::Unavailable("scripted outage".into()))
            }
            Some(Scripted::Malformed) => Err(OracleError::Malformed("scripted garbage".into())),
            None => Ok(self.fallback.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// FailingOracle / StallingOracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum FailureMode {
    Unavailable,
    Malformed,
}

#[derive(Debug)]
pub struct FailingOracle {
    mode: FailureMode,
}

impl FailingOracle {
    pub fn new(mode: FailureMode) -> Self {
        Self { mode }
    }
}

#[async_trait]
impl AnalysisOracle for FailingOracle {
    async fn analyze(&self, _sample: &Sample) -> OracleResult<Judgment> {
        Err(match self.mode {
            FailureMode::Unavailable => OracleError::Unavailable("connection refused".into()),
            FailureMode::Malformed => OracleError::Malformed("unexpected token".into()),
        })
    }
}

/// Never completes.
#[derive(Debug, Default)]
pub struct StallingOracle;

#[async_trait]
impl AnalysisOracle for StallingOracle {
    async fn analyze(&self, _sample: &Sample) -> OracleResult<Judgment> {
        std::future::pending::<()>().await;
        Err(OracleError::Unavailable("unreachable".into()))
    }
}

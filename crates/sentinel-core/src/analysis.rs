//! Bounded, fault-absorbing wrapper around an [`AnalysisOracle`].
//!
//! The monitor loop must never stall or fail on the oracle. Every call here
//! is bounded by a timeout, and any failure is replaced by
//! [`Judgment::conservative_default`] with the fault recorded alongside.

use std::sync::Arc;
use std::time::Duration;

use sentinel_oracle::{AnalysisOracle, Judgment, OracleError, Sample};

/// Judgment plus the fault that forced a fallback, if any.
#[derive(Debug)]
pub struct Analysis {
    pub judgment: Judgment,
    pub fault: Option<OracleError>,
}

impl Analysis {
    pub fn is_degraded(&self) -> bool {
        self.fault.is_some()
    }
}

#[derive(Clone)]
pub struct AnalysisClient {
    oracle: Arc<dyn AnalysisOracle>,
    timeout: Duration,
}

impl AnalysisClient {
    pub fn new(oracle: Arc<dyn AnalysisOracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub async fn analyze(&self, sample: &Sample) -> Analysis {
        let outcome = match tokio::time::timeout(self.timeout, self.oracle.analyze(sample)).await {
            Ok(result) => result,
            Err(_) => Err(OracleError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(judgment) => Analysis {
                judgment,
                fault: None,
            },
            Err(fault) => Analysis {
                judgment: Judgment::conservative_default(),
                fault: Some(fault),
            },
        }
    }
}

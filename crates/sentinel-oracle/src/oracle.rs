//! The [`AnalysisOracle`] trait and the kind-based router.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{OracleError, OracleResult};
use crate::judgment::Judgment;
use crate::sample::{Sample, SampleKind};

/// Scores one sample for suspicious behavior.
///
/// Implementations are stateless from the caller's point of view: the same
/// oracle instance is shared by every session and may be called
/// concurrently. Failures are reported, never panicked; the caller decides
/// what to substitute.
#[async_trait]
pub trait AnalysisOracle: Send + Sync {
    async fn analyze(&self, sample: &Sample) -> OracleResult<Judgment>;
}

#[async_trait]
impl<T: AnalysisOracle + ?Sized> AnalysisOracle for Arc<T> {
    async fn analyze(&self, sample: &Sample) -> OracleResult<Judgment> {
        (**self).analyze(sample).await
    }
}

/// Routes each sample to the oracle variant configured for its kind.
///
/// A router built without an audio variant reports audio samples as
/// unavailable, which the monitor absorbs like any other oracle fault.
#[derive(Clone)]
pub struct OracleRouter {
    frame: Arc<dyn AnalysisOracle>,
    audio: Option<Arc<dyn AnalysisOracle>>,
}

impl OracleRouter {
    pub fn new(frame: Arc<dyn AnalysisOracle>) -> Self {
        Self { frame, audio: None }
    }

    pub fn with_audio(mut self, audio: Arc<dyn AnalysisOracle>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn handles(&self, kind: SampleKind) -> bool {
        match kind {
            SampleKind::Frame => true,
            SampleKind::Audio => self.audio.is_some(),
        }
    }
}

#[async_trait]
impl AnalysisOracle for OracleRouter {
    async fn analyze(&self, sample: &Sample) -> OracleResult<Judgment> {
        match sample.kind {
            SampleKind::Frame => self.frame.analyze(sample).await,
            SampleKind::Audio => match &self.audio {
                Some(audio) => audio.analyze(sample).await,
                None => Err(OracleError::Unavailable(
                    "no audio analysis configured".into(),
                )),
            },
        }
    }
}

//! Sentinel-Oracle: the content-analysis boundary
//!
//! The monitor treats suspicious-behavior scoring as an opaque oracle: a
//! [`Sample`] goes in, a [`Judgment`] comes out. This crate owns that seam.
//!
//! ## Layer 1 - Analysis boundary
//!
//! ## Key Components
//!
//! - [`AnalysisOracle`]: the single trait every oracle variant implements
//! - [`HttpOracle`]: calls a remote analysis service over HTTP
//! - [`OracleRouter`]: picks a variant by [`SampleKind`]
//! - [`parse_verdict`]: turns a raw service response into a [`Judgment`]
//! - [`fakes`]: deterministic oracles for tests and simulation

mod error;
pub mod fakes;
pub mod http;
pub mod judgment;
pub mod oracle;
pub mod sample;

pub use error::{OracleError, OracleResult};
pub use http::{HttpOracle, OracleConfig};
pub use judgment::{parse_verdict, ConditionFlag, Judgment};
pub use oracle::{AnalysisOracle, OracleRouter};
pub use sample::{Sample, SampleKind};

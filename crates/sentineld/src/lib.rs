//! sentineld: the control plane in front of a [`SessionRegistry`].
//!
//! HTTP routes drive the session operations; WebSocket routes attach subject
//! and proctor connections to a session's alert hub.
//!
//! [`SessionRegistry`]: sentinel_core::SessionRegistry

pub mod api;
pub mod error;
pub mod ws;

pub use api::{build_router, AppState};
pub use error::ApiError;

//! HTTP upload relay with live progress reporting.
//!
//! This crate provides the HTTP surface:
//! - Multipart upload relay to the configured storage provider
//! - Progress polling and server-sent event streams
//! - Direct-upload tickets
//! - Health and Prometheus metrics endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod relay;
pub mod routes;
pub mod sessions;
pub mod state;
pub mod trace;

pub use error::ApiError;
pub use routes::create_router;
pub use sessions::{SessionStore, SessionWriter};
pub use state::AppState;
pub use trace::TraceId;

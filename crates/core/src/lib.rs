//! Core domain types for the uprelay upload relay.
//!
//! This crate defines the data model shared by the upstream client and the
//! HTTP server:
//! - Upload sessions, their status machine and progress snapshots
//! - The `ProgressSink` capability fed by in-flight transfers
//! - Stored object naming policies
//! - Configuration types and the layered loader

pub mod config;
pub mod error;
pub mod naming;
pub mod progress;
pub mod session;

pub use config::{AppConfig, ProviderKind};
pub use error::{Error, Result};
pub use naming::ObjectNaming;
pub use progress::{NoopProgress, ProgressSink};
pub use session::{ProgressSnapshot, UploadId, UploadSession, UploadStatus};

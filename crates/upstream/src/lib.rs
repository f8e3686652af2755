//! Storage provider clients for uprelay.
//!
//! This crate provides:
//! - The three-step provider protocol (authorize, upload target, upload)
//! - A byte-counting body stream that feeds upload progress
//! - Backends: Backblaze B2 and Supabase Storage

pub mod backends;
pub mod encoding;
pub mod error;
pub mod progress;
pub mod traits;

pub use backends::{b2::B2Backend, supabase::SupabaseBackend};
pub use error::{UpstreamError, UpstreamResult};
pub use progress::ProgressStream;
pub use traits::{
    Authorization, ByteStream, DEFAULT_CONTENT_TYPE, DirectUploadTicket, StorageProvider,
    StoredObject, UploadSource, UploadTarget,
};

use std::sync::Arc;
use uprelay_core::config::{ProviderConfig, ProviderKind};

/// Create a storage provider from configuration.
pub fn from_config(config: &ProviderConfig) -> UpstreamResult<Arc<dyn StorageProvider>> {
    match config.kind {
        ProviderKind::B2 => {
            let backend = B2Backend::new(config.b2.settings()?)?;
            Ok(Arc::new(backend))
        }
        ProviderKind::Supabase => {
            let backend = SupabaseBackend::new(config.supabase.settings()?)?;
            Ok(Arc::new(backend))
        }
    }
}

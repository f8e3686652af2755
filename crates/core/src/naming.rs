//! Stored object naming policies.

use crate::session::UploadId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Fallback name when the client sent none.
pub const DEFAULT_FILE_NAME: &str = "upload";

/// How the name of the stored object is derived from an upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectNaming {
    /// Keep the client's file name.
    #[default]
    Original,
    /// `<upload id>.<original extension>`.
    UploadId,
    /// `<unix millis>-<sanitized original name>`.
    Timestamped,
}

impl ObjectNaming {
    /// Derive the object name for an upload.
    pub fn object_name(&self, id: &UploadId, file_name: &str) -> String {
        let file_name = if file_name.trim().is_empty() {
            DEFAULT_FILE_NAME
        } else {
            file_name
        };

        match self {
            Self::Original => file_name.to_string(),
            Self::UploadId => match extension(file_name) {
                Some(ext) => format!("{id}.{ext}"),
                None => id.to_string(),
            },
            Self::Timestamped => {
                let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
                format!("{millis}-{}", sanitize(file_name))
            }
        }
    }
}

/// Replace every character outside `[A-Za-z0-9.]` with `_`.
pub fn sanitize(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension(file_name: &str) -> Option<&str> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

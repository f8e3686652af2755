//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of a caller-supplied upload ID.
pub const MAX_UPLOAD_ID_LEN: usize = 128;

/// Opaque identifier correlating an upload with its progress.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UploadId(String);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parse a caller-supplied ID.
    ///
    /// Accepts 1..=128 characters of `[A-Za-z0-9_-]`.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidUploadId("empty".to_string()));
        }
        if s.len() > MAX_UPLOAD_ID_LEN {
            return Err(crate::Error::InvalidUploadId(format!(
                "length {} exceeds {}",
                s.len(),
                MAX_UPLOAD_ID_LEN
            )));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(crate::Error::InvalidUploadId(format!(
                "{s:?} contains characters outside [A-Za-z0-9_-]"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for UploadId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<UploadId> for String {
    fn from(id: UploadId) -> Self {
        id.0
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload session status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    /// Accepted, no bytes sent upstream yet.
    Pending,
    /// Bytes are flowing to the provider.
    InProgress,
    /// The provider acknowledged the whole object.
    Completed,
    /// Some step failed; see the session error.
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward transition.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Completed)
                | (Pending, Failed)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One in-flight or finished transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Correlation key handed to the client.
    pub id: UploadId,
    /// File name as supplied by the client.
    pub file_name: String,
    /// Declared content type, if any.
    pub content_type: Option<String>,
    /// Size of the source file.
    pub total_bytes: u64,
    /// Bytes handed to the provider so far. Never exceeds `total_bytes`.
    pub bytes_sent: u64,
    pub status: UploadStatus,
    /// Public download reference, set on completion.
    pub result_url: Option<String>,
    /// Failure message, set on failure.
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UploadSession {
    /// Create a new pending session.
    pub fn new(
        id: UploadId,
        file_name: impl Into<String>,
        content_type: Option<String>,
        total_bytes: u64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            file_name: file_name.into(),
            content_type,
            total_bytes,
            bytes_sent: 0,
            status: UploadStatus::Pending,
            result_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: UploadStatus) -> crate::Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(crate::Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Record the cumulative byte count sent upstream.
    ///
    /// The counter only moves forward and saturates at `total_bytes`.
    /// Reports after a terminal state are ignored.
    pub fn record_bytes(&mut self, total_sent: u64) {
        if self.status.is_terminal() {
            return;
        }
        let clamped = total_sent.min(self.total_bytes);
        if clamped > self.bytes_sent {
            self.bytes_sent = clamped;
            self.updated_at = OffsetDateTime::now_utc();
        }
        if self.status == UploadStatus::Pending {
            self.status = UploadStatus::InProgress;
            self.updated_at = OffsetDateTime::now_utc();
        }
    }

    /// Mark the session completed with its public URL.
    ///
    /// Completing an already completed session keeps the original URL.
    pub fn complete(&mut self, result_url: impl Into<String>) -> crate::Result<()> {
        if self.status == UploadStatus::Completed {
            return Ok(());
        }
        self.transition(UploadStatus::Completed)?;
        self.bytes_sent = self.total_bytes;
        self.result_url = Some(result_url.into());
        Ok(())
    }

    /// Mark the session failed.
    pub fn fail(&mut self, message: impl Into<String>) -> crate::Result<()> {
        if self.status == UploadStatus::Failed {
            return Ok(());
        }
        self.transition(UploadStatus::Failed)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Fraction of bytes sent, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.status == UploadStatus::Completed {
                1.0
            } else {
                0.0
            };
        }
        (self.bytes_sent as f64 / self.total_bytes as f64).clamp(0.0, 1.0)
    }

    /// Whole percent sent, in 0..=100.
    pub fn percent(&self) -> u8 {
        (self.progress() * 100.0).floor() as u8
    }

    /// Read-only view for progress readers.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            id: self.id.clone(),
            progress: self.progress(),
            percent: self.percent(),
            status: self.status,
            result_url: self.result_url.clone(),
            error: self.error.clone(),
        }
    }
}

/// Point-in-time copy of a session's progress.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub id: UploadId,
    pub progress: f64,
    pub percent: u8,
    pub status: UploadStatus,
    pub result_url: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: u64) -> UploadSession {
        UploadSession::new(UploadId::new(), "song.mp3", None, total)
    }

    #[test]
    fn test_upload_id_parse() {
        let generated = UploadId::new();
        assert_eq!(UploadId::parse(generated.as_str()).unwrap(), generated);
        assert_eq!(UploadId::parse("abc-123").unwrap().as_str(), "abc-123");
        assert!(UploadId::parse("").is_err());
        assert!(UploadId::parse("../etc").is_err());
        assert!(UploadId::parse("has space").is_err());
        assert!(UploadId::parse(&"a".repeat(MAX_UPLOAD_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_upload_id_serde_validates() {
        let ok: UploadId = serde_json::from_str("\"abc-123\"").unwrap();
        assert_eq!(ok.to_string(), "abc-123");
        assert!(serde_json::from_str::<UploadId>("\"a/b\"").is_err());
    }

    #[test]
    fn test_status_flags() {
        assert!(!UploadStatus::Pending.is_terminal());
        assert!(!UploadStatus::InProgress.is_terminal());
        assert!(UploadStatus::Completed.is_terminal());
        assert!(UploadStatus::Failed.is_terminal());
        assert!(!UploadStatus::Completed.can_transition_to(UploadStatus::InProgress));
        assert!(!UploadStatus::Failed.can_transition_to(UploadStatus::Completed));
        assert!(!UploadStatus::InProgress.can_transition_to(UploadStatus::Pending));
        assert_eq!(
            serde_json::to_string(&UploadStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
    }

    #[test]
    fn test_record_bytes_is_monotonic_and_clamped() {
        let mut s = session(100);
        assert_eq!(s.status, UploadStatus::Pending);

        s.record_bytes(40);
        assert_eq!(s.status, UploadStatus::InProgress);
        assert_eq!(s.bytes_sent, 40);

        s.record_bytes(10);
        assert_eq!(s.bytes_sent, 40, "counter must not move backwards");

        s.record_bytes(500);
        assert_eq!(s.bytes_sent, 100, "counter must not exceed total");
        assert_eq!(s.progress(), 1.0);
        assert_eq!(s.percent(), 100);
    }

    #[test]
    fn test_first_report_starts_transfer() {
        let mut s = session(10);
        let created = s.updated_at;
        s.record_bytes(0);
        assert_eq!(s.status, UploadStatus::InProgress);
        assert_eq!(s.bytes_sent, 0);
        assert!(s.updated_at >= created);
        assert!(s.complete("u").is_ok());
    }

    #[test]
    fn test_complete_is_idempotent() {
        let mut s = session(10);
        s.record_bytes(5);
        s.complete("https://f.example/file/b/a").unwrap();
        s.complete("https://other").unwrap();
        assert_eq!(s.result_url.as_deref(), Some("https://f.example/file/b/a"));
        assert_eq!(s.bytes_sent, 10);
        assert!(s.fail("late").is_err());
        assert!(s.error.is_none());
    }

    #[test]
    fn test_terminal_ignores_late_bytes() {
        let mut s = session(10);
        s.record_bytes(3);
        s.fail("boom").unwrap();
        s.record_bytes(9);
        assert_eq!(s.bytes_sent, 3);
        assert_eq!(s.status, UploadStatus::Failed);
        assert_eq!(s.error.as_deref(), Some("boom"));
        assert!(s.complete("x").is_err());
    }

    #[test]
    fn test_zero_byte_progress() {
        let mut s = session(0);
        assert_eq!(s.progress(), 0.0);
        s.complete("u").unwrap();
        assert_eq!(s.progress(), 1.0);
        assert_eq!(s.percent(), 100);
    }

    #[test]
    fn test_percent_floors() {
        let mut s = session(3);
        s.record_bytes(2);
        assert_eq!(s.percent(), 66);
        let snap = s.snapshot();
        assert_eq!(snap.percent, 66);
        assert_eq!(snap.status, UploadStatus::InProgress);
        assert!(snap.result_url.is_none());
    }
}

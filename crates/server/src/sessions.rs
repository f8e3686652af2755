//! In-memory upload session store.
//!
//! Sessions live in a shared map keyed by upload ID. The relay task that
//! created a session holds its only [`SessionWriter`]; progress readers get
//! copies through [`SessionStore::snapshot`]. Nothing is persisted: a restart
//! forgets every session.

use crate::error::{ApiError, ApiResult};
use crate::metrics::{ACTIVE_SESSIONS, SESSIONS_EVICTED};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uprelay_core::config::SessionConfig;
use uprelay_core::{ProgressSink, ProgressSnapshot, UploadId, UploadSession};

/// Message recorded when a writer goes away before a terminal state.
const ABORTED_MESSAGE: &str = "upload aborted";

/// Shared session map with TTL eviction.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<UploadId, UploadSession>>,
    ttl: time::Duration,
    max_age: time::Duration,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl: config.ttl(),
            max_age: config.max_age(),
        }
    }

    /// Register a new pending session and hand out its writer.
    pub fn create(
        &self,
        id: UploadId,
        file_name: impl Into<String>,
        content_type: Option<String>,
        total_bytes: u64,
    ) -> ApiResult<SessionWriter> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(_) => Err(ApiError::Conflict(format!("upload {id} already exists"))),
            Entry::Vacant(entry) => {
                entry.insert(UploadSession::new(
                    id.clone(),
                    file_name,
                    content_type,
                    total_bytes,
                ));
                ACTIVE_SESSIONS.inc();
                Ok(SessionWriter {
                    id,
                    sessions: self.sessions.clone(),
                })
            }
        }
    }

    pub fn contains(&self, id: &UploadId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Copy of the session's current progress.
    pub fn snapshot(&self, id: &UploadId) -> Option<ProgressSnapshot> {
        self.sessions.get(id).map(|s| s.snapshot())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evict finished sessions older than the TTL and any session older than
    /// the maximum age. Returns the number evicted.
    pub fn sweep(&self, now: OffsetDateTime) -> usize {
        let mut evicted = 0;
        self.sessions.retain(|_, session| {
            let expired = session.status.is_terminal() && now - session.updated_at >= self.ttl;
            let too_old = now - session.created_at >= self.max_age;
            if expired || too_old {
                evicted += 1;
                false
            } else {
                true
            }
        });

        if evicted > 0 {
            SESSIONS_EVICTED.inc_by(evicted as u64);
            ACTIVE_SESSIONS.set(self.sessions.len() as i64);
        }
        evicted
    }
}

/// Single writer for one session.
///
/// Dropping a writer whose session has not reached a terminal state marks it
/// failed, so subscribers always see an end.
pub struct SessionWriter {
    id: UploadId,
    sessions: Arc<DashMap<UploadId, UploadSession>>,
}

impl SessionWriter {
    pub fn id(&self) -> &UploadId {
        &self.id
    }

    /// Mark the session completed with its public URL.
    pub fn complete(&self, result_url: &str) {
        if let Some(mut session) = self.sessions.get_mut(&self.id)
            && let Err(e) = session.complete(result_url)
        {
            tracing::warn!(upload_id = %self.id, error = %e, "Could not complete session");
        }
    }

    /// Mark the session failed.
    pub fn fail(&self, message: &str) {
        if let Some(mut session) = self.sessions.get_mut(&self.id)
            && let Err(e) = session.fail(message)
        {
            tracing::warn!(upload_id = %self.id, error = %e, "Could not fail session");
        }
    }
}

impl ProgressSink for SessionWriter {
    fn report(&self, bytes_transferred: u64) {
        if let Some(mut session) = self.sessions.get_mut(&self.id) {
            session.record_bytes(bytes_transferred);
        }
    }
}

impl Drop for SessionWriter {
    fn drop(&mut self) {
        if let Some(mut session) = self.sessions.get_mut(&self.id)
            && !session.status.is_terminal()
        {
            let _ = session.fail(ABORTED_MESSAGE);
            tracing::warn!(upload_id = %self.id, "Session writer dropped before completion");
        }
    }
}

/// Spawn the periodic eviction sweep.
pub fn spawn_sweep_task(store: SessionStore, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = store.sweep(OffsetDateTime::now_utc());
            if evicted > 0 {
                tracing::info!(
                    evicted = evicted,
                    remaining = store.len(),
                    "Session sweep evicted expired uploads"
                );
            }
        }
    })
}

//! Progress reporter: polling and server-sent events.

use crate::error::{ApiError, ApiResult};
use crate::metrics::PROGRESS_STREAMS_ACTIVE;
use crate::sessions::SessionStore;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::ACCEPT;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use uprelay_core::{ProgressSnapshot, UploadId, UploadStatus};

const EVENT_STREAM: &str = "text/event-stream";

#[derive(Debug, Default, Deserialize)]
pub struct ProgressQuery {
    /// Force the event stream regardless of `Accept`.
    #[serde(default)]
    pub stream: bool,
}

/// Polling response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    /// Fraction in [0, 1].
    pub progress: f64,
    pub percent: u8,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            progress: snapshot.progress,
            percent: snapshot.percent,
            status: snapshot.status,
            file_url: snapshot.result_url,
            error: snapshot.error,
        }
    }
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains(EVENT_STREAM))
}

/// GET /progress/{upload_id} - Current progress, polled or streamed.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
    Query(query): Query<ProgressQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let id = UploadId::parse(&upload_id)
        .map_err(|_| ApiError::NotFound(format!("upload {upload_id} not found")))?;

    if query.stream || wants_event_stream(&headers) {
        let events = progress_events(
            state.sessions.clone(),
            id,
            state.config.progress.stream_interval(),
            state.config.progress.subscribe_grace(),
        );
        return Ok(Sse::new(events).into_response());
    }

    let snapshot = state
        .sessions
        .snapshot(&id)
        .ok_or_else(|| ApiError::NotFound(format!("upload {id} not found")))?;
    Ok(Json(ProgressResponse::from(snapshot)).into_response())
}

/// Keeps the open-stream gauge honest however the stream ends.
struct StreamGuard;

impl StreamGuard {
    fn new() -> Self {
        PROGRESS_STREAMS_ACTIVE.inc();
        Self
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        PROGRESS_STREAMS_ACTIVE.dec();
    }
}

struct Subscription {
    sessions: SessionStore,
    id: UploadId,
    ticker: Interval,
    /// Unknown IDs are given up on after this instant.
    grace_deadline: Instant,
    finished: bool,
    _guard: StreamGuard,
}

/// One `data: <percent>` event per tick.
///
/// Ends after the event that reports 100, after the event for a failed
/// session, or once an unknown ID outlives the grace period. The ticker is
/// owned by the stream, so a disconnected client drops it with the response.
pub fn progress_events(
    sessions: SessionStore,
    id: UploadId,
    interval: Duration,
    grace: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let subscription = Subscription {
        sessions,
        id,
        ticker,
        grace_deadline: Instant::now() + grace,
        finished: false,
        _guard: StreamGuard::new(),
    };

    futures::stream::unfold(subscription, |mut sub| async move {
        if sub.finished {
            return None;
        }
        sub.ticker.tick().await;

        let percent = match sub.sessions.snapshot(&sub.id) {
            Some(snapshot) => {
                sub.finished = snapshot.percent >= 100 || snapshot.status == UploadStatus::Failed;
                snapshot.percent
            }
            None if Instant::now() >= sub.grace_deadline => {
                tracing::debug!(upload_id = %sub.id, "Progress stream gave up on unknown upload");
                return None;
            }
            None => 0,
        };

        Some((Ok(Event::default().data(percent.to_string())), sub))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use uprelay_core::ProgressSink;
    use uprelay_core::config::SessionConfig;

    fn store() -> SessionStore {
        SessionStore::new(&SessionConfig::default())
    }

    #[tokio::test]
    async fn stream_ends_after_completion() {
        let sessions = store();
        let id = UploadId::new();
        let writer = sessions.create(id.clone(), "a.mp3", None, 10).unwrap();
        writer.report(5);

        let mut events = Box::pin(progress_events(
            sessions.clone(),
            id,
            Duration::from_millis(5),
            Duration::from_secs(1),
        ));
        assert!(events.next().await.is_some());

        writer.complete("https://f/file/b/a.mp3");
        let mut remaining = 0;
        while events.next().await.is_some() {
            remaining += 1;
        }
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn unknown_id_stream_ends_after_grace() {
        let mut events = Box::pin(progress_events(
            store(),
            UploadId::new(),
            Duration::from_millis(5),
            Duration::from_millis(20),
        ));

        let mut count = 0;
        while events.next().await.is_some() {
            count += 1;
        }
        assert!(count >= 1);
    }

    #[tokio::test]
    async fn failed_session_ends_stream() {
        let sessions = store();
        let id = UploadId::new();
        let writer = sessions.create(id.clone(), "a.mp3", None, 10).unwrap();
        writer.fail("boom");

        let events: Vec<_> = progress_events(
            sessions,
            id,
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .collect()
        .await;
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn accept_header_selects_event_stream() {
        let mut headers = HeaderMap::new();
        assert!(!wants_event_stream(&headers));
        headers.insert(ACCEPT, "text/event-stream".parse().unwrap());
        assert!(wants_event_stream(&headers));
    }
}

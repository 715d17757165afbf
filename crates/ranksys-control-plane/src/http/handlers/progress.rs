//! Batch progress stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::{self, Stream};
use ranksys_core::SessionId;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::progress::ProgressFrame;
use crate::state::AppState;

/// GET /api/v1/batch/progress/:session_id
///
/// One `progress` event per frame; the stream ends after the final frame
/// or when the session is closed.
pub async fn progress_stream(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = SessionId::new(session_id);
    let subscription = state.progress.subscribe(&session_id);
    info!(session_id = %session_id, "Progress subscriber connected");

    // The subscription lives in the stream state, so a client disconnect
    // drops it and releases the session.
    let events = stream::unfold((subscription, false), |(mut receiver, finished)| async move {
        if finished {
            return None;
        }

        match receiver.recv().await {
            Ok(frame) => Some((Ok(progress_event(&frame)), (receiver, frame.is_final()))),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "Progress stream lagged, skipping frames");
                Some((
                    Ok(Event::default().comment(format!("skipped {} frames", n))),
                    (receiver, false),
                ))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

fn progress_event(frame: &ProgressFrame) -> Event {
    Event::default()
        .event("progress")
        .json_data(frame)
        .unwrap_or_else(|e| Event::default().comment(format!("unencodable frame: {}", e)))
}

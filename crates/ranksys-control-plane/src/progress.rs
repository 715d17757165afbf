//! Batch progress reporting.
//!
//! The batch engine reports through a [`ProgressSink`]. For HTTP clients the
//! sink is backed by [`ProgressHub`], a registry of broadcast channels keyed
//! by session id that the SSE endpoint subscribes to.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ranksys_core::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered frames per session before slow subscribers start lagging.
const SESSION_CHANNEL_CAPACITY: usize = 64;

/// One progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub current: usize,
    pub total: usize,
    /// `floor(current * 100 / total)`; 100 for an empty batch.
    pub percentage: u32,
}

impl ProgressFrame {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            (current.min(total) * 100 / total) as u32
        };
        Self {
            current,
            total,
            percentage,
        }
    }

    /// True for the frame reporting the last evaluation.
    pub fn is_final(&self) -> bool {
        self.current >= self.total
    }
}

/// Receives progress as scenario evaluations complete.
///
/// Calls are serialized by the caller; `current` increases by one per call.
pub trait ProgressSink: Send + Sync {
    fn report(&self, frame: ProgressFrame);
}

/// Session registry for progress streams.
#[derive(Default)]
pub struct ProgressHub {
    sessions: Mutex<HashMap<SessionId, broadcast::Sender<ProgressFrame>>>,
}

impl ProgressHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to a session, creating it if needed.
    ///
    /// The session is released when its last [`Subscription`] is dropped.
    pub fn subscribe(self: &Arc<Self>, session_id: &SessionId) -> Subscription {
        let mut sessions = self.lock();
        sessions.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = sessions
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(SESSION_CHANNEL_CAPACITY).0)
            .subscribe();

        Subscription {
            receiver: Some(receiver),
            hub: Arc::clone(self),
            session_id: session_id.clone(),
        }
    }

    /// Publish a frame to a session's subscribers.
    ///
    /// The session is dropped when nobody is listening any more, and after
    /// the final frame; dropping it closes every subscriber's stream once the
    /// buffered frames are drained.
    pub fn publish(&self, session_id: &SessionId, frame: ProgressFrame) {
        let mut sessions = self.lock();
        let Some(sender) = sessions.get(session_id) else {
            return;
        };

        if sender.send(frame).is_err() {
            debug!(session_id = %session_id, "No progress subscribers left, dropping session");
            sessions.remove(session_id);
        } else if frame.is_final() {
            sessions.remove(session_id);
        }
    }

    /// Forget a session.
    pub fn close(&self, session_id: &SessionId) {
        self.lock().remove(session_id);
    }

    /// Drop `session_id` if nobody is subscribed to it.
    fn release(&self, session_id: &SessionId) {
        let mut sessions = self.lock();
        let idle = sessions
            .get(session_id)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if idle {
            debug!(session_id = %session_id, "Last progress subscriber left, dropping session");
            sessions.remove(session_id);
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// A sink publishing to `session_id`.
    pub fn sink(self: &Arc<Self>, session_id: SessionId) -> SessionSink {
        SessionSink {
            hub: Arc::clone(self),
            session_id,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, broadcast::Sender<ProgressFrame>>> {
        // A poisoned map is still structurally valid.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A subscriber's handle on a session.
pub struct Subscription {
    receiver: Option<broadcast::Receiver<ProgressFrame>>,
    hub: Arc<ProgressHub>,
    session_id: SessionId,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<ProgressFrame, broadcast::error::RecvError> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.recv().await,
            None => Err(broadcast::error::RecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver must be gone before the count is checked.
        self.receiver.take();
        self.hub.release(&self.session_id);
    }
}

/// [`ProgressSink`] bound to one hub session.
pub struct SessionSink {
    hub: Arc<ProgressHub>,
    session_id: SessionId,
}

impl ProgressSink for SessionSink {
    fn report(&self, frame: ProgressFrame) {
        self.hub.publish(&self.session_id, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_is_floored() {
        assert_eq!(ProgressFrame::new(1, 3).percentage, 33);
        assert_eq!(ProgressFrame::new(2, 3).percentage, 66);
        assert_eq!(ProgressFrame::new(3, 3).percentage, 100);
        assert!(ProgressFrame::new(3, 3).is_final());
    }

    #[tokio::test]
    async fn test_subscriber_sees_frames_then_close() {
        let hub = ProgressHub::new();
        let session = SessionId::new("s1");
        let mut rx = hub.subscribe(&session);
        let sink = hub.sink(session.clone());

        sink.report(ProgressFrame::new(1, 2));
        sink.report(ProgressFrame::new(2, 2));

        assert_eq!(rx.recv().await.unwrap().current, 1);
        assert_eq!(rx.recv().await.unwrap().current, 2);
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_dropping_last_subscription_removes_session() {
        let hub = ProgressHub::new();
        let session = SessionId::new("gone");
        let first = hub.subscribe(&session);
        let second = hub.subscribe(&session);
        assert_eq!(hub.session_count(), 1);

        drop(first);
        assert_eq!(hub.session_count(), 1);
        drop(second);
        assert_eq!(hub.session_count(), 0);

        hub.publish(&session, ProgressFrame::new(1, 5));
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_outlives_closed_session() {
        let hub = ProgressHub::new();
        let session = SessionId::new("s1");
        let mut early = hub.subscribe(&session);
        hub.publish(&session, ProgressFrame::new(1, 1));
        assert_eq!(early.recv().await.unwrap().current, 1);

        // Recreated session for a new subscriber; the old handle must not
        // tear it down.
        let late = hub.subscribe(&session);
        drop(early);
        assert_eq!(hub.session_count(), 1);
        drop(late);
        assert_eq!(hub.session_count(), 0);
    }

    #[test]
    fn test_publish_without_session_is_ignored() {
        let hub = ProgressHub::new();
        hub.publish(&SessionId::new("nobody"), ProgressFrame::new(1, 1));
        assert_eq!(hub.session_count(), 0);
    }
}

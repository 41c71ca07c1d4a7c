//! A spawned media session wired to the mocks.
//!
//! # Example
//!
//! ```rust,ignore
//! let harness = SessionHarness::start();
//! harness.join_and_stream("alice", "abc-1234-xyz").await;
//! harness.push(publishers(&[("p1", Some("p2"), "bob")])).await;
//! harness.wait_for_groups(1).await;
//! harness.shutdown().await;
//! ```

use crate::mock_media::{MockCapture, MockMediaEngine};
use crate::mock_signaling::MockSignaling;
use common::types::ProducerId;
use media_session::{
    MediaSession, MediaSessionHandle, SessionCollaborators, SessionConfig, SessionSnapshot,
    SessionStatus, SlotTable,
};
use signaling_protocol::PushEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running session plus handles to every mock behind it.
pub struct SessionHarness {
    pub handle: MediaSessionHandle,
    pub signaling: MockSignaling,
    pub engine: MockMediaEngine,
    pub capture: MockCapture,
    events: mpsc::Sender<PushEvent>,
    task: Option<JoinHandle<()>>,
}

impl SessionHarness {
    /// Start a session with default config and fresh mocks.
    #[must_use]
    pub fn start() -> Self {
        Self::start_with(
            SessionConfig::default(),
            MockSignaling::new(),
            MockMediaEngine::new(),
            MockCapture::new(),
        )
    }

    /// Start a session over the given config and mocks.
    #[must_use]
    pub fn start_with(
        config: SessionConfig,
        signaling: MockSignaling,
        engine: MockMediaEngine,
        capture: MockCapture,
    ) -> Self {
        let (events, events_rx) = mpsc::channel(64);
        let collaborators = SessionCollaborators {
            signaling: Arc::new(signaling.clone()),
            events: events_rx,
            engine: Arc::new(engine.clone()),
            capture: Arc::new(capture.clone()),
        };
        let (handle, task) = MediaSession::spawn(config, collaborators, CancellationToken::new());
        Self {
            handle,
            signaling,
            engine,
            capture,
            events,
            task: Some(task),
        }
    }

    /// Join, enable the feed, announce remote readiness and start streaming.
    ///
    /// # Panics
    ///
    /// Panics if any step fails.
    pub async fn join_and_stream(&self, user_id: &str, room_id: &str) {
        self.handle
            .join(user_id, room_id, true, true)
            .await
            .expect("join should succeed");
        self.handle
            .enable_feed(true, true)
            .await
            .expect("enable_feed should succeed");
        self.push(PushEvent::RemoteMediaReady).await;
        self.wait_until(|s| s.remote_media_ready).await;
        self.handle
            .send_feed()
            .await
            .expect("send_feed should succeed");
    }

    /// Deliver a push event to the session.
    ///
    /// # Panics
    ///
    /// Panics if the session stopped reading events.
    pub async fn push(&self, event: PushEvent) {
        self.events
            .send(event)
            .await
            .expect("session event channel closed");
    }

    pub async fn status(&self) -> SessionStatus {
        self.handle.get_state().await.expect("session ended")
    }

    /// Wait until the published state satisfies `predicate`.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_until(&self, predicate: impl Fn(&SessionSnapshot) -> bool) {
        let mut rx = self.handle.subscribe_state();
        let result = tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|s| predicate(s))).await;
        assert!(
            matches!(result, Ok(Ok(_))),
            "timed out waiting for session state, last: {:?}",
            self.handle.snapshot()
        );
    }

    /// Wait until the published slot table satisfies `predicate`.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for_slots(&self, predicate: impl Fn(&SlotTable) -> bool) -> SlotTable {
        let mut rx = self.handle.subscribe_slots();
        let result = tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(|t| predicate(t))).await;
        match result {
            Ok(Ok(table)) => table.clone(),
            _ => panic!(
                "timed out waiting for slot table, last: {:?}",
                self.handle.slots()
            ),
        }
    }

    /// Wait until exactly `count` publisher groups are registered.
    ///
    /// # Panics
    ///
    /// Panics after five seconds.
    pub async fn wait_for_groups(&self, count: usize) -> SessionStatus {
        let result = tokio::time::timeout(WAIT_TIMEOUT, async {
            loop {
                let status = self.status().await;
                if status.publisher_groups.len() == count {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        result.unwrap_or_else(|_| panic!("timed out waiting for {count} publisher groups"))
    }

    /// Group keys in slot order, `None` for empty slots.
    #[must_use]
    pub fn slot_keys(&self) -> Vec<Option<ProducerId>> {
        self.handle
            .slots()
            .slots()
            .iter()
            .map(|s| s.audio_pid.clone())
            .collect()
    }

    /// Wait for the actor task to exit.
    ///
    /// # Panics
    ///
    /// Panics if the task does not stop within five seconds.
    pub async fn join_task(&mut self) {
        if let Some(task) = self.task.take() {
            tokio::time::timeout(WAIT_TIMEOUT, task)
                .await
                .expect("session task did not stop")
                .expect("session task panicked");
        }
    }

    /// Cancel the session and wait for it to stop.
    pub async fn shutdown(mut self) {
        self.handle.cancel();
        self.join_task().await;
    }
}

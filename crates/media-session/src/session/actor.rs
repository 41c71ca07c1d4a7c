//! `MediaSession` - per-join actor that owns every media component.
//!
//! Each `MediaSession`:
//! - Sequences Idle -> Joining -> Joined -> Streaming -> Ended
//! - Owns the capability gate, transports, producer and consumer registries
//!   and the slot assigner for exactly one join; nothing survives hang-up
//! - Processes UI commands one at a time from its mailbox
//! - Consumes each announced remote publisher on its own task
//! - Runs the network half of join, feed and screen share on their own tasks
//!
//! # Cancellation
//!
//! Teardown marks the session `Ended` and publishes that before awaiting
//! anything. While a join, feed or screen-share operation is in flight the
//! actor still answers cancellation and hang-up; other commands wait until
//! the operation finishes. Results that finish afterwards are never
//! registered: the actor closes any result it still receives, and once the
//! actor has stopped waiting the task releases its own result.

use super::messages::{
    EndReason, InternalEvent, SessionMessage, SessionSnapshot, SessionState, SessionStatus,
};
use crate::capability::CapabilityNegotiator;
use crate::config::SessionConfig;
use crate::consumer::{consume_group, ConsumerRegistry};
use crate::errors::SessionError;
use crate::media::{
    CaptureConstraints, MediaCapture, MediaEngine, MediaError, MediaProducer, MediaTrack,
};
use crate::observability::metrics;
use crate::producer::{ProducerKind, ProducerRegistry};
use crate::signaling::{SignalingClient, SignalingTransport};
use crate::slots::{SlotAssigner, SlotTable};
use crate::transport::{SendTransport, TransportManager};

use common::config::ClientPreferences;
use common::types::{ProducerId, RoomId, UserId};
use signaling_protocol::{MediaKind, NewPublisher, PushEvent};
use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// External collaborators a session is built on.
pub struct SessionCollaborators {
    /// Request/ack half of the signaling channel.
    pub signaling: Arc<dyn SignalingTransport>,
    /// Decoded push events from the signaling channel.
    pub events: mpsc::Receiver<PushEvent>,
    pub engine: Arc<dyn MediaEngine>,
    pub capture: Arc<dyn MediaCapture>,
}

/// Handle to a `MediaSession`: the UI action surface plus read-only state.
#[derive(Clone)]
pub struct MediaSessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    state: watch::Receiver<SessionSnapshot>,
    slots: watch::Receiver<SlotTable>,
}

impl MediaSessionHandle {
    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| SessionError::SessionEnded)?;
        rx.await.map_err(|_| SessionError::SessionEnded)
    }

    /// Join `room_id` as `user_id`. No-op unless idle or when either id is
    /// blank after trimming.
    pub async fn join(
        &self,
        user_id: &str,
        room_id: &str,
        mic_enabled: bool,
        video_enabled: bool,
    ) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::Join {
            user_id: user_id.to_string(),
            room_id: room_id.to_string(),
            mic_enabled,
            video_enabled,
            respond_to,
        })
        .await?
    }

    /// Acquire local tracks for preview. Idempotent.
    pub async fn enable_feed(
        &self,
        mic_enabled: bool,
        video_enabled: bool,
    ) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::EnableFeed {
            mic_enabled,
            video_enabled,
            respond_to,
        })
        .await?
    }

    /// Start producing local tracks. Idempotent once streaming.
    pub async fn send_feed(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::SendFeed { respond_to })
            .await?
    }

    /// Flip mute; returns whether audio is now muted.
    pub async fn mute_audio(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionMessage::MuteAudio { respond_to })
            .await?
    }

    /// Flip the camera; returns whether video is now enabled.
    pub async fn toggle_video(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionMessage::ToggleVideo { respond_to })
            .await?
    }

    /// Start or stop screen sharing; returns whether sharing is now on.
    pub async fn toggle_screen_share(&self) -> Result<bool, SessionError> {
        self.request(|respond_to| SessionMessage::ToggleScreenShare { respond_to })
            .await?
    }

    /// Toggle the pin on a group; returns the resulting pin.
    pub async fn pin(
        &self,
        audio_pid: impl Into<ProducerId>,
    ) -> Result<Option<ProducerId>, SessionError> {
        let audio_pid = audio_pid.into();
        self.request(|respond_to| SessionMessage::Pin {
            audio_pid,
            respond_to,
        })
        .await
    }

    pub async fn unpin(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::Unpin { respond_to })
            .await
    }

    /// Leave and release everything. Calling it again is a no-op.
    pub async fn hang_up(&self) -> Result<(), SessionError> {
        match self
            .request(|respond_to| SessionMessage::HangUp { respond_to })
            .await
        {
            Ok(()) | Err(SessionError::SessionEnded) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// End the call for everyone. Room owner only.
    pub async fn end_call(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionMessage::EndCall { respond_to })
            .await?
    }

    /// Get the session state plus registry contents.
    pub async fn get_state(&self) -> Result<SessionStatus, SessionError> {
        self.request(|respond_to| SessionMessage::GetState { respond_to })
            .await
    }

    /// Latest published session state. Still readable after the session ends.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Latest published slot table.
    #[must_use]
    pub fn slots(&self) -> SlotTable {
        self.slots.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_slots(&self) -> watch::Receiver<SlotTable> {
        self.slots.clone()
    }

    /// Cancel the session actor. It tears down without waiting for a reply.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `MediaSession` implementation.
pub struct MediaSession {
    config: SessionConfig,
    receiver: mpsc::Receiver<SessionMessage>,
    events: mpsc::Receiver<PushEvent>,
    /// Whether the push channel may still yield events.
    events_open: bool,
    internal_tx: mpsc::Sender<InternalEvent>,
    internal_rx: mpsc::Receiver<InternalEvent>,
    cancel_token: CancellationToken,
    /// Cancelled on teardown; stops consume tasks and watchers.
    tasks_token: CancellationToken,
    signaling: SignalingClient,
    capture: Arc<dyn MediaCapture>,
    negotiator: Arc<CapabilityNegotiator>,
    transports: Arc<TransportManager>,
    producers: ProducerRegistry,
    consumers: ConsumerRegistry,
    slots: SlotAssigner,
    snapshot: watch::Sender<SessionSnapshot>,
    /// Bumped per screen share so stale "ended" reports are ignored.
    screen_share_generation: u64,
    /// Commands that arrived while an operation was in flight.
    deferred: VecDeque<SessionMessage>,
    /// Hang-up or cancellation seen while an operation was in flight.
    pending_end: Option<PendingEnd>,
    messages_processed: u64,
}

struct PendingEnd {
    reason: EndReason,
    respond_to: Option<oneshot::Sender<()>>,
}

/// Send transport plus the producers that opened on it.
struct ProducedFeed {
    transport: SendTransport,
    producers: Vec<(ProducerKind, Arc<dyn MediaProducer>)>,
}

impl ProducedFeed {
    fn close(self) {
        for (_, producer) in self.producers {
            producer.close();
        }
        self.transport.close();
    }
}

/// Display producers, video first.
struct ScreenShare {
    video_track: MediaTrack,
    producers: Vec<(ProducerKind, MediaTrack, Arc<dyn MediaProducer>)>,
}

impl ScreenShare {
    fn close(self) {
        for (_, track, producer) in self.producers {
            producer.close();
            track.stop();
        }
    }
}

impl MediaSession {
    /// Spawn a new media session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: SessionConfig,
        collaborators: SessionCollaborators,
        cancel_token: CancellationToken,
    ) -> (MediaSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.mailbox_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(config.mailbox_capacity);
        let (snapshot, state_rx) = watch::channel(SessionSnapshot::default());

        let SessionCollaborators {
            signaling,
            events,
            engine,
            capture,
        } = collaborators;

        let signaling = SignalingClient::new(signaling);
        let negotiator = Arc::new(CapabilityNegotiator::new(engine));
        let transports = Arc::new(TransportManager::new(
            signaling.clone(),
            Arc::clone(&negotiator),
        ));
        let slots = SlotAssigner::new(config.slot_count());
        let slots_rx = slots.subscribe();

        let actor = Self {
            receiver,
            events,
            events_open: true,
            internal_tx,
            internal_rx,
            tasks_token: cancel_token.child_token(),
            cancel_token: cancel_token.clone(),
            signaling,
            capture,
            negotiator,
            transports,
            producers: ProducerRegistry::new(),
            consumers: ConsumerRegistry::new(),
            slots,
            snapshot,
            screen_share_generation: 0,
            deferred: VecDeque::new(),
            pending_end: None,
            messages_processed: 0,
            config,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = MediaSessionHandle {
            sender,
            cancel_token,
            state: state_rx,
            slots: slots_rx,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "ms.session")]
    async fn run(mut self) {
        info!(target: "ms.session", "MediaSession started");

        loop {
            if let Some(message) = self.deferred.pop_front() {
                self.handle_message(message).await;
                self.messages_processed += 1;
            } else {
                tokio::select! {
                    () = self.cancel_token.cancelled() => {
                        info!(target: "ms.session", "MediaSession received cancellation signal");
                        self.teardown(EndReason::Shutdown).await;
                    }

                    msg = self.receiver.recv() => {
                        match msg {
                            Some(message) => {
                                self.handle_message(message).await;
                                self.messages_processed += 1;
                            }
                            None => {
                                info!(target: "ms.session", "MediaSession channel closed, exiting");
                                self.teardown(EndReason::Shutdown).await;
                            }
                        }
                    }

                    event = self.events.recv(), if self.events_open => {
                        match event {
                            Some(event) => self.handle_push(event).await,
                            None => {
                                warn!(target: "ms.session", "Signaling event channel closed");
                                self.events_open = false;
                                self.update(|s| s.signaling_connected = false);
                            }
                        }
                    }

                    Some(event) = self.internal_rx.recv() => {
                        self.handle_internal(event).await;
                    }
                }
            }

            if self.state() == SessionState::Ended {
                break;
            }
        }

        // Late consume results: close whatever is queued; senders that lose
        // the race close their own group.
        self.internal_rx.close();
        while let Ok(event) = self.internal_rx.try_recv() {
            if let InternalEvent::GroupConsumed(mut group) = event {
                group.close();
            }
        }

        info!(
            target: "ms.session",
            messages_processed = self.messages_processed,
            "MediaSession stopped"
        );
    }

    /// Handle a single UI command.
    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                user_id,
                room_id,
                mic_enabled,
                video_enabled,
                respond_to,
            } => {
                let result = self
                    .handle_join(&user_id, &room_id, mic_enabled, video_enabled)
                    .await;
                self.note_error(&result);
                self.end_if_interrupted().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::EnableFeed {
                mic_enabled,
                video_enabled,
                respond_to,
            } => {
                let result = self.handle_enable_feed(mic_enabled, video_enabled).await;
                self.note_error(&result);
                self.end_if_interrupted().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::SendFeed { respond_to } => {
                let result = self.handle_send_feed().await;
                self.note_error(&result);
                self.end_if_interrupted().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::MuteAudio { respond_to } => {
                let result = self.handle_mute_audio().await;
                self.note_error(&result);
                let _ = respond_to.send(result);
            }

            SessionMessage::ToggleVideo { respond_to } => {
                let result = self.handle_toggle_video().await;
                self.note_error(&result);
                let _ = respond_to.send(result);
            }

            SessionMessage::ToggleScreenShare { respond_to } => {
                let result = self.handle_toggle_screen_share().await;
                self.note_error(&result);
                self.end_if_interrupted().await;
                let _ = respond_to.send(result);
            }

            SessionMessage::Pin {
                audio_pid,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_pin(audio_pid));
            }

            SessionMessage::Unpin { respond_to } => {
                self.handle_unpin();
                let _ = respond_to.send(());
            }

            SessionMessage::HangUp { respond_to } => {
                if self.state().is_joined() {
                    self.teardown(EndReason::HangUp).await;
                } else {
                    debug!(
                        target: "ms.session",
                        state = self.state().as_str(),
                        "Hang-up ignored outside a joined session"
                    );
                }
                let _ = respond_to.send(());
            }

            SessionMessage::EndCall { respond_to } => {
                let result = self.handle_end_call().await;
                self.note_error(&result);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Join and local media
    // ------------------------------------------------------------------------

    #[instrument(skip_all, name = "ms.session.join", fields(room_id = %room_id))]
    async fn handle_join(
        &mut self,
        user_id: &str,
        room_id: &str,
        mic_enabled: bool,
        video_enabled: bool,
    ) -> Result<(), SessionError> {
        if self.state() != SessionState::Idle {
            debug!(
                target: "ms.session",
                state = self.state().as_str(),
                "Join ignored, session not idle"
            );
            return Ok(());
        }
        let (Some(user_id), Some(room_id)) = (UserId::parse(user_id), RoomId::parse(room_id))
        else {
            debug!(target: "ms.session", "Join ignored, empty user or room id");
            return Ok(());
        };

        let started = Instant::now();
        self.update(|s| {
            s.state = SessionState::Joining;
            s.user_id = Some(user_id.clone());
            s.room_id = Some(room_id.clone());
            s.is_muted = !mic_enabled;
            s.is_video_enabled = video_enabled;
            s.last_error = None;
        });

        let signaling = self.signaling.clone();
        let operation = perform_join(
            self.signaling.clone(),
            Arc::clone(&self.negotiator),
            user_id.clone(),
            room_id.clone(),
        );
        let rx = spawn_operation(operation, move |result: Result<bool, SessionError>| async move {
            // Joined after the session ended
            if result.is_ok() {
                if let Err(e) = signaling.leave_room().await {
                    debug!(target: "ms.session", error = %e, "leaveRoom after late join failed");
                }
            }
        });

        let outcome = self
            .await_operation(rx)
            .await
            .unwrap_or(Err(SessionError::SessionEnded));

        match outcome {
            Ok(is_owner) => {
                metrics::record_join("success", started.elapsed());
                self.update(|s| {
                    s.state = SessionState::Joined { streaming: false };
                    s.is_owner = is_owner;
                });
                info!(
                    target: "ms.session",
                    room_id = %room_id,
                    is_owner,
                    "Joined room"
                );
                if let Some(path) = self.config.preferences_path.clone() {
                    remember_display_name(&path, user_id.as_str());
                }
                Ok(())
            }
            Err(e) => {
                metrics::record_join("error", started.elapsed());
                warn!(target: "ms.session", room_id = %room_id, error = %e, "Join failed");
                self.update(|s| {
                    s.state = SessionState::Idle;
                    s.user_id = None;
                    s.room_id = None;
                });
                Err(e)
            }
        }
    }

    async fn handle_enable_feed(
        &mut self,
        mic_enabled: bool,
        video_enabled: bool,
    ) -> Result<(), SessionError> {
        self.ensure_joined()?;
        if self.producers.has_local_tracks() {
            return Ok(());
        }

        let capture = Arc::clone(&self.capture);
        let rx = spawn_operation(
            async move {
                capture
                    .acquire_user_media(CaptureConstraints {
                        audio: true,
                        video: true,
                    })
                    .await
            },
            |result: Result<Vec<MediaTrack>, MediaError>| async move {
                for track in result.into_iter().flatten() {
                    track.stop();
                }
            },
        );

        let tracks = self
            .await_operation(rx)
            .await
            .ok_or(SessionError::SessionEnded)?
            .map_err(|e| SessionError::DeviceAcquisitionFailure(e.to_string()))?;

        if tracks.is_empty() {
            return Err(SessionError::DeviceAcquisitionFailure(
                "no camera or microphone track".to_string(),
            ));
        }

        for track in tracks {
            let kind = ProducerKind::device(track.kind());
            self.producers.set_local_track(kind, track);
        }
        self.producers.set_paused(ProducerKind::Audio, !mic_enabled);
        self.producers.set_paused(ProducerKind::Video, !video_enabled);

        self.update(|s| {
            s.is_stream_enabled = true;
            s.is_muted = !mic_enabled;
            s.is_video_enabled = video_enabled;
        });
        info!(target: "ms.session", mic_enabled, video_enabled, "Local feed enabled");
        Ok(())
    }

    #[instrument(skip_all, name = "ms.session.send_feed")]
    async fn handle_send_feed(&mut self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Joined { streaming: true } => return Ok(()),
            SessionState::Joined { streaming: false } => {}
            other => {
                return Err(SessionError::InvalidState(format!(
                    "cannot send feed while {}",
                    other.as_str()
                )));
            }
        }
        self.negotiator.ensure_ready()?;
        if !self.producers.has_local_tracks() {
            return Err(SessionError::FeedNotEnabled);
        }
        if !self.snapshot.borrow().remote_media_ready {
            return Err(SessionError::RemoteMediaNotReady);
        }

        let tracks: Vec<(ProducerKind, MediaTrack)> = [ProducerKind::Audio, ProducerKind::Video]
            .into_iter()
            .filter_map(|kind| self.producers.local_track(kind).cloned().map(|t| (kind, t)))
            .collect();
        let rx = spawn_operation(
            produce_feed(Arc::clone(&self.transports), tracks),
            |result: Result<ProducedFeed, SessionError>| async move {
                if let Ok(feed) = result {
                    feed.close();
                }
            },
        );
        let feed = self
            .await_operation(rx)
            .await
            .ok_or(SessionError::SessionEnded)??;

        // Mirror flags as they are now; toggles may have queued meanwhile
        let (is_muted, is_video_enabled) = {
            let s = self.snapshot.borrow();
            (s.is_muted, s.is_video_enabled)
        };
        let produced = feed.producers.len();
        self.producers.attach_transport(feed.transport);
        for (kind, producer) in feed.producers {
            if kind == ProducerKind::Audio {
                self.slots.set_self_pid(Some(producer.id().clone()));
            }
            self.producers.insert(kind, producer);
            let paused = match kind {
                ProducerKind::Audio => is_muted,
                _ => !is_video_enabled,
            };
            self.producers.set_paused(kind, paused);
        }

        self.slots.recompute(&self.consumers);
        self.update(|s| {
            s.state = SessionState::Joined { streaming: true };
            s.is_stream_sent = true;
        });
        info!(target: "ms.session", producers = produced, "Streaming local feed");
        Ok(())
    }

    async fn handle_mute_audio(&mut self) -> Result<bool, SessionError> {
        self.ensure_not_ended()?;
        let muted = !self.snapshot.borrow().is_muted;
        self.producers.set_paused(ProducerKind::Audio, muted);
        self.update(|s| s.is_muted = muted);

        if self.state().is_joined() {
            if let Err(e) = self.signaling.toggle_audio(muted).await {
                warn!(target: "ms.session", error = %e, "toggleAudio notification failed");
            }
        }
        Ok(muted)
    }

    async fn handle_toggle_video(&mut self) -> Result<bool, SessionError> {
        self.ensure_not_ended()?;
        let enabled = !self.snapshot.borrow().is_video_enabled;
        self.producers.set_paused(ProducerKind::Video, !enabled);
        self.update(|s| s.is_video_enabled = enabled);

        if self.state().is_joined() {
            if let Err(e) = self.signaling.toggle_video(!enabled).await {
                warn!(target: "ms.session", error = %e, "toggleVideo notification failed");
            }
        }
        Ok(enabled)
    }

    async fn handle_toggle_screen_share(&mut self) -> Result<bool, SessionError> {
        if self.snapshot.borrow().is_screen_sharing {
            self.stop_screen_share(true).await;
            return Ok(false);
        }

        if !self.state().is_streaming() {
            return Err(SessionError::NotStreaming);
        }
        let Some(transport) = self.producers.transport().cloned() else {
            return Err(SessionError::NotStreaming);
        };

        let rx = spawn_operation(
            share_screen(Arc::clone(&self.capture), transport, self.signaling.clone()),
            |result: Result<ScreenShare, SessionError>| async move {
                if let Ok(share) = result {
                    share.close();
                }
            },
        );
        let share = self
            .await_operation(rx)
            .await
            .ok_or(SessionError::SessionEnded)??;

        let video_track = share.video_track;
        let mut video_pid = None;
        for (kind, track, producer) in share.producers {
            if kind == ProducerKind::ScreenVideo {
                video_pid = Some(producer.id().clone());
            }
            self.producers.set_local_track(kind, track);
            self.producers.insert(kind, producer);
        }

        self.screen_share_generation += 1;
        self.watch_screen_track(&video_track, self.screen_share_generation);
        self.update(|s| s.is_screen_sharing = true);
        info!(
            target: "ms.session",
            video_pid = ?video_pid,
            with_audio = self.producers.contains(ProducerKind::ScreenAudio),
            "Screen share started"
        );
        Ok(true)
    }

    /// Report OS-level termination of the display track back to the actor.
    fn watch_screen_track(&self, track: &MediaTrack, generation: u64) {
        let ended = track.ended_token();
        let cancel = self.tasks_token.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = ended.cancelled() => {
                    let _ = tx.send(InternalEvent::ScreenShareEnded { generation }).await;
                }
                () = cancel.cancelled() => {}
            }
        });
    }

    async fn stop_screen_share(&mut self, notify: bool) {
        self.producers.close(ProducerKind::ScreenAudio);
        self.producers.close(ProducerKind::ScreenVideo);
        self.update(|s| s.is_screen_sharing = false);
        info!(target: "ms.session", "Screen share stopped");

        if notify {
            if let Err(e) = self.signaling.stop_screen_share().await {
                warn!(target: "ms.session", error = %e, "stopScreenShare notification failed");
            }
        }
    }

    // ------------------------------------------------------------------------
    // Pin
    // ------------------------------------------------------------------------

    fn handle_pin(&mut self, audio_pid: ProducerId) -> Option<ProducerId> {
        if !self.state().is_joined() {
            return None;
        }
        let exists = self.consumers.contains(&audio_pid);
        let pinned = self.slots.toggle_pin(audio_pid, exists);
        self.slots.recompute(&self.consumers);
        let published = pinned.clone();
        self.update(|s| s.pinned_id = published);
        pinned
    }

    fn handle_unpin(&mut self) {
        if !self.state().is_joined() {
            return;
        }
        self.slots.unpin();
        self.slots.recompute(&self.consumers);
        self.update(|s| s.pinned_id = None);
    }

    // ------------------------------------------------------------------------
    // Push events
    // ------------------------------------------------------------------------

    async fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected => {
                info!(target: "ms.session", "Signaling connected");
                self.update(|s| s.signaling_connected = true);
            }
            PushEvent::Disconnected { reason } => {
                warn!(target: "ms.session", reason = %reason, "Signaling disconnected");
                self.update(|s| s.signaling_connected = false);
            }
            PushEvent::ReconnectFailed => {
                warn!(target: "ms.session", "Signaling gave up reconnecting, ending session");
                self.teardown(EndReason::ReconnectFailed).await;
            }
            PushEvent::CallEnded => {
                info!(target: "ms.session", "Call ended by owner");
                self.teardown(EndReason::CallEnded).await;
            }
            event if !self.state().is_joined() => {
                debug!(
                    target: "ms.session",
                    state = self.state().as_str(),
                    event = ?event,
                    "Push event ignored outside a joined session"
                );
            }
            PushEvent::RemoteMediaReady => {
                debug!(target: "ms.session", "Remote media ready");
                self.update(|s| s.remote_media_ready = true);
            }
            PushEvent::ActiveSpeakersUpdate(speakers) => {
                self.slots.set_speakers(speakers);
                self.slots.recompute(&self.consumers);
            }
            PushEvent::NewPublishers(publishers) => {
                for publisher in publishers {
                    self.handle_new_publisher(publisher);
                }
            }
            PushEvent::ProducerClosed(pid) => self.handle_producer_closed(&pid),
        }
    }

    fn handle_new_publisher(&mut self, publisher: NewPublisher) {
        let own_audio = self.producers.producer_id(ProducerKind::Audio);
        let own_user = self.snapshot.borrow().user_id.clone();
        if own_audio == Some(&publisher.audio_pid)
            || own_user.as_ref() == Some(&publisher.participant.id)
        {
            debug!(target: "ms.session", audio_pid = %publisher.audio_pid, "Skipping own publisher");
            return;
        }

        if !self.consumers.begin(&publisher) {
            debug!(
                target: "ms.consumer",
                audio_pid = %publisher.audio_pid,
                "Publisher already registered or in flight, skipping"
            );
            return;
        }

        debug!(
            target: "ms.consumer",
            audio_pid = %publisher.audio_pid,
            video_pid = ?publisher.video_pid,
            "Consuming new publisher"
        );

        let transports = Arc::clone(&self.transports);
        let cancel = self.tasks_token.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let group = consume_group(&transports, publisher, &cancel).await;
            if let Err(mpsc::error::SendError(InternalEvent::GroupConsumed(mut group))) =
                tx.send(InternalEvent::GroupConsumed(group)).await
            {
                debug!(
                    target: "ms.consumer",
                    audio_pid = %group.audio_pid(),
                    "Session gone, closing late publisher group"
                );
                group.close();
            }
        });
    }

    fn handle_producer_closed(&mut self, pid: &ProducerId) {
        if let Some(mut group) = self.consumers.remove(pid) {
            if self.slots.clear_pin_if(pid) {
                self.update(|s| s.pinned_id = None);
            }
            // Detach slots before the stream goes away
            self.slots.recompute(&self.consumers);
            group.close();
            metrics::set_publisher_groups_active(self.consumers.len());
            info!(target: "ms.consumer", audio_pid = %pid, "Publisher group closed");
        } else if let Some(key) = self.consumers.close_video_by_pid(pid) {
            self.slots.recompute(&self.consumers);
            info!(
                target: "ms.consumer",
                audio_pid = %key,
                video_pid = %pid,
                "Publisher video closed"
            );
        } else if self.consumers.mark_closed_pending(pid) {
            debug!(target: "ms.consumer", pid = %pid, "Producer closed while consuming");
        } else {
            debug!(target: "ms.consumer", pid = %pid, "producerClosed for unknown pid");
        }
    }

    // ------------------------------------------------------------------------
    // Internal events
    // ------------------------------------------------------------------------

    async fn handle_internal(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::GroupConsumed(mut group) => {
                if self.state() == SessionState::Ended {
                    group.close();
                    return;
                }
                match self.consumers.complete(group) {
                    Ok(()) => {
                        metrics::set_publisher_groups_active(self.consumers.len());
                        self.slots.recompute(&self.consumers);
                    }
                    Err(mut group) => {
                        debug!(
                            target: "ms.consumer",
                            audio_pid = %group.audio_pid(),
                            "Discarding publisher group closed while consuming"
                        );
                        group.close();
                    }
                }
            }
            InternalEvent::ScreenShareEnded { generation } => {
                let sharing = self.snapshot.borrow().is_screen_sharing;
                if sharing && generation == self.screen_share_generation {
                    info!(target: "ms.session", "Display capture ended by the platform");
                    self.stop_screen_share(true).await;
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    async fn handle_end_call(&mut self) -> Result<(), SessionError> {
        self.ensure_joined()?;
        if !self.snapshot.borrow().is_owner {
            return Err(SessionError::PermissionDenied(
                "Only the room owner can end the call".to_string(),
            ));
        }

        self.signaling
            .end_call()
            .await
            .map_err(|e| SessionError::Internal(format!("endCall failed: {e}")))?;

        self.teardown(EndReason::EndCall).await;
        Ok(())
    }

    /// Release everything and end the session. Safe to call twice.
    #[instrument(skip_all, name = "ms.session.teardown", fields(reason = reason.as_str()))]
    async fn teardown(&mut self, reason: EndReason) {
        let previous = self.state();
        if previous == SessionState::Ended {
            return;
        }

        // Ended first: nothing that resolves from here on may register
        self.update(|s| s.state = SessionState::Ended);
        self.tasks_token.cancel();

        let notify = previous.is_joined() && reason.notifies_server();
        if self.snapshot.borrow().is_screen_sharing {
            self.stop_screen_share(notify).await;
        }
        if notify {
            if let Err(e) = self.signaling.leave_room().await {
                warn!(target: "ms.session", error = %e, "leaveRoom notification failed");
            }
        }

        self.producers.close_all();
        // Detach every slot before closing the streams they play
        self.slots.clear();
        let groups = self.consumers.drain();
        let group_count = groups.len();
        for mut group in groups {
            group.close();
        }

        metrics::set_publisher_groups_active(0);
        metrics::record_session_ended(reason.as_str());
        self.update(|s| {
            s.is_stream_enabled = false;
            s.is_stream_sent = false;
            s.is_screen_sharing = false;
            s.pinned_id = None;
            s.remote_media_ready = false;
        });

        info!(
            target: "ms.session",
            reason = reason.as_str(),
            groups_closed = group_count,
            "Session ended"
        );
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Wait for an operation running on its own task.
    ///
    /// Cancellation and hang-up still get through; other commands are
    /// deferred until the operation finishes. Returns `None` when the session
    /// stopped waiting before the result arrived.
    async fn await_operation<T>(&mut self, mut rx: oneshot::Receiver<T>) -> Option<T> {
        loop {
            tokio::select! {
                result = &mut rx => return result.ok(),

                () = self.cancel_token.cancelled() => {
                    self.interrupt(EndReason::Shutdown, None);
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(SessionMessage::HangUp { respond_to }) => {
                            self.interrupt(EndReason::HangUp, Some(respond_to));
                            break;
                        }
                        Some(message) => self.deferred.push_back(message),
                        None => {
                            self.interrupt(EndReason::Shutdown, None);
                            break;
                        }
                    }
                }
            }
        }

        // A result that already landed is applied, then torn down with the
        // rest; anything later is released by its task
        rx.close();
        rx.try_recv().ok()
    }

    fn interrupt(&mut self, reason: EndReason, respond_to: Option<oneshot::Sender<()>>) {
        info!(
            target: "ms.session",
            reason = reason.as_str(),
            "Session ending with an operation in flight"
        );
        self.pending_end = Some(PendingEnd { reason, respond_to });
    }

    /// Tear down after an interrupted operation, then answer the hang-up.
    async fn end_if_interrupted(&mut self) {
        if let Some(PendingEnd { reason, respond_to }) = self.pending_end.take() {
            self.teardown(reason).await;
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(());
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn state(&self) -> SessionState {
        self.snapshot.borrow().state
    }

    fn update(&self, modify: impl FnOnce(&mut SessionSnapshot)) {
        self.snapshot.send_modify(modify);
    }

    fn ensure_joined(&self) -> Result<(), SessionError> {
        let state = self.state();
        if state.is_joined() {
            Ok(())
        } else if state == SessionState::Ended {
            Err(SessionError::SessionEnded)
        } else {
            Err(SessionError::InvalidState(format!(
                "not joined ({})",
                state.as_str()
            )))
        }
    }

    fn ensure_not_ended(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Ended {
            Err(SessionError::SessionEnded)
        } else {
            Ok(())
        }
    }

    fn note_error<T>(&self, result: &Result<T, SessionError>) {
        if let Err(e) = result {
            let message = e.client_message();
            self.update(|s| s.last_error = Some(message));
        }
    }

    fn status(&self) -> SessionStatus {
        SessionStatus {
            snapshot: self.snapshot.borrow().clone(),
            publisher_groups: self.consumers.keys(),
            open_producers: self.producers.open_count(),
            open_consumers: self.consumers.open_consumer_count(),
        }
    }
}

/// Run `operation` on its own task. If the session stops waiting for the
/// result, `release` disposes of it on that task.
fn spawn_operation<T, F, R, RF>(operation: F, release: R) -> oneshot::Receiver<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
    R: FnOnce(T) -> RF + Send + 'static,
    RF: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        if let Err(unclaimed) = tx.send(operation.await) {
            release(unclaimed).await;
        }
    });
    rx
}

/// Join handshake plus capability load. Returns the owner flag.
async fn perform_join(
    signaling: SignalingClient,
    negotiator: Arc<CapabilityNegotiator>,
    user_id: UserId,
    room_id: RoomId,
) -> Result<bool, SessionError> {
    let ack = signaling
        .join(&user_id, &room_id)
        .await
        .map_err(|e| SessionError::JoinFailure(e.to_string()))?;

    if let Err(e) = negotiator.negotiate(&ack.router_rtp_capabilities).await {
        // The server counts us in; tell it we are gone
        if let Err(leave_err) = signaling.leave_room().await {
            debug!(
                target: "ms.session",
                error = %leave_err,
                "leaveRoom after failed join failed"
            );
        }
        return Err(e);
    }

    Ok(ack.is_owner)
}

/// Create the send transport and produce each track on it.
///
/// A rejected producer only loses its kind. A failed connect handshake
/// loses them all and closes the transport.
async fn produce_feed(
    transports: Arc<TransportManager>,
    tracks: Vec<(ProducerKind, MediaTrack)>,
) -> Result<ProducedFeed, SessionError> {
    let transport = transports.create_send_transport().await?;
    let mut feed = ProducedFeed {
        transport,
        producers: Vec::new(),
    };

    let mut last_failure = None;
    for (kind, track) in tracks {
        let result = feed.transport.produce(kind, track).await;
        match result {
            Ok(producer) => feed.producers.push((kind, producer)),
            Err(e @ SessionError::TransportConnectFailure { .. }) => {
                feed.close();
                return Err(e);
            }
            Err(e) => {
                warn!(target: "ms.producer", kind = kind.as_str(), error = %e, "Producer failed");
                last_failure = Some(e);
            }
        }
    }

    if feed.producers.is_empty() {
        feed.close();
        return Err(last_failure.unwrap_or(SessionError::FeedNotEnabled));
    }
    Ok(feed)
}

/// Capture the display and produce it. Video is required, audio optional.
async fn share_screen(
    capture: Arc<dyn MediaCapture>,
    transport: SendTransport,
    signaling: SignalingClient,
) -> Result<ScreenShare, SessionError> {
    let tracks = capture
        .acquire_display_media()
        .await
        .map_err(|e| SessionError::DeviceAcquisitionFailure(e.to_string()))?;

    let video_track = tracks.iter().find(|t| t.kind() == MediaKind::Video).cloned();
    let audio_track = tracks.iter().find(|t| t.kind() == MediaKind::Audio).cloned();
    let Some(video_track) = video_track else {
        for track in &tracks {
            track.stop();
        }
        return Err(SessionError::DeviceAcquisitionFailure(
            "display capture returned no video track".to_string(),
        ));
    };

    let video_kind = ProducerKind::screen(video_track.kind());
    let video = match transport.produce(video_kind, video_track.clone()).await {
        Ok(producer) => producer,
        Err(e) => {
            for track in &tracks {
                track.stop();
            }
            return Err(e);
        }
    };
    let video_pid = video.id().clone();
    let mut share = ScreenShare {
        video_track: video_track.clone(),
        producers: vec![(video_kind, video_track, video)],
    };

    let mut audio_pid = None;
    if let Some(track) = audio_track {
        let kind = ProducerKind::screen(track.kind());
        match transport.produce(kind, track.clone()).await {
            Ok(producer) => {
                audio_pid = Some(producer.id().clone());
                share.producers.push((kind, track, producer));
            }
            Err(e) => {
                warn!(target: "ms.producer", error = %e, "Screen audio producer failed");
                track.stop();
            }
        }
    }

    if let Err(e) = signaling
        .start_screen_share(&video_pid, audio_pid.as_ref())
        .await
    {
        warn!(target: "ms.session", error = %e, "startScreenShare notification failed");
    }
    Ok(share)
}

/// Persist the last-used display name. Failures only cost the convenience.
fn remember_display_name(path: &Path, name: &str) {
    let result = ClientPreferences::load(path).and_then(|mut prefs| {
        prefs.remember_display_name(name);
        prefs.save(path)
    });
    if let Err(e) = result {
        warn!(target: "ms.session", error = %e, "Could not save client preferences");
    }
}

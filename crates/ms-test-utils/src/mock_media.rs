//! In-memory media engine and capture devices for session testing.
//!
//! `MockMediaEngine` hands out transports, producers and consumers that
//! only flip flags, and keeps every one of them so tests can count what
//! is still open after a flow. `MockCapture` returns fresh tracks and can
//! simulate permission denial and the OS ending a screen capture.
//!
//! # Example
//!
//! ```rust,ignore
//! use ms_test_utils::{MockCapture, MockMediaEngine};
//!
//! let engine = MockMediaEngine::new();
//! let capture = MockCapture::new().with_display_audio(true);
//!
//! // ... drive the session ...
//! assert_eq!(engine.open_transports(), 0);
//! capture.end_display();
//! ```

use async_trait::async_trait;
use common::types::{ConsumerId, ProducerId, TransportId};
use media_session::media::{
    CaptureConstraints, MediaCapture, MediaConsumer, MediaEngine, MediaError, MediaProducer,
    MediaTrack, MediaTransport,
};
use serde_json::json;
use signaling_protocol::{
    ConsumerParams, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection,
    TransportParams,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ----------------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------------

/// Mock media engine.
#[derive(Clone, Default)]
pub struct MockMediaEngine {
    inner: Arc<EngineInner>,
}

#[derive(Default)]
struct EngineInner {
    loaded: Mutex<Option<RtpCapabilities>>,
    fail_load: AtomicBool,
    fail_create_transport: AtomicBool,
    fail_local_consume: AtomicBool,
    transports: Mutex<Vec<Arc<MockTransport>>>,
    producers: Mutex<Vec<Arc<MockProducer>>>,
    consumers: Mutex<Vec<Arc<MockConsumer>>>,
}

impl MockMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject router capabilities on load.
    pub fn fail_load(&self) {
        self.inner.fail_load.store(true, Ordering::SeqCst);
    }

    /// Refuse to construct local transports.
    pub fn fail_create_transport(&self) {
        self.inner
            .fail_create_transport
            .store(true, Ordering::SeqCst);
    }

    /// Refuse to construct local consumers.
    pub fn fail_local_consume(&self) {
        self.inner.fail_local_consume.store(true, Ordering::SeqCst);
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.lock().unwrap().is_some()
    }

    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.inner.transports.lock().unwrap().clone()
    }

    pub fn producers(&self) -> Vec<Arc<MockProducer>> {
        self.inner.producers.lock().unwrap().clone()
    }

    pub fn consumers(&self) -> Vec<Arc<MockConsumer>> {
        self.inner.consumers.lock().unwrap().clone()
    }

    pub fn open_transports(&self) -> usize {
        self.transports().iter().filter(|t| !t.is_closed()).count()
    }

    pub fn open_producers(&self) -> usize {
        self.producers().iter().filter(|p| !p.is_closed()).count()
    }

    pub fn open_consumers(&self) -> usize {
        self.consumers().iter().filter(|c| !c.is_closed()).count()
    }

    /// Receive transports created so far.
    pub fn receive_transports(&self) -> usize {
        self.transports()
            .iter()
            .filter(|t| t.direction() == TransportDirection::Recv)
            .count()
    }

    /// The latest producer sending `pid`.
    pub fn producer(&self, pid: &str) -> Option<Arc<MockProducer>> {
        self.producers()
            .into_iter()
            .rev()
            .find(|p| p.id().as_str() == pid)
    }

    /// The latest consumer of remote producer `pid`.
    pub fn consumer(&self, pid: &str) -> Option<Arc<MockConsumer>> {
        self.consumers()
            .into_iter()
            .rev()
            .find(|c| c.producer_id().as_str() == pid)
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), MediaError> {
        if self.inner.fail_load.load(Ordering::SeqCst) {
            return Err(MediaError::Transport("unsupported codecs".to_string()));
        }
        *self.inner.loaded.lock().unwrap() = Some(router_capabilities.clone());
        Ok(())
    }

    fn rtp_capabilities(&self) -> Option<RtpCapabilities> {
        self.inner.loaded.lock().unwrap().clone()
    }

    async fn create_transport(
        &self,
        direction: TransportDirection,
        params: &TransportParams,
    ) -> Result<Arc<dyn MediaTransport>, MediaError> {
        if self.inner.fail_create_transport.load(Ordering::SeqCst) {
            return Err(MediaError::Transport("ICE setup failed".to_string()));
        }
        let transport = Arc::new(MockTransport {
            id: params.id.clone(),
            direction,
            closed: AtomicBool::new(false),
            engine: Arc::clone(&self.inner),
        });
        self.inner
            .transports
            .lock()
            .unwrap()
            .push(Arc::clone(&transport));
        Ok(transport)
    }
}

// ----------------------------------------------------------------------------
// Transport, producer, consumer
// ----------------------------------------------------------------------------

/// Mock local transport.
pub struct MockTransport {
    id: TransportId,
    direction: TransportDirection,
    closed: AtomicBool,
    engine: Arc<EngineInner>,
}

#[async_trait]
impl MediaTransport for MockTransport {
    fn id(&self) -> &TransportId {
        &self.id
    }

    fn direction(&self) -> TransportDirection {
        self.direction
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        DtlsParameters(json!({ "role": "client", "fingerprints": [] }))
    }

    fn rtp_parameters(&self, track: &MediaTrack) -> Result<RtpParameters, MediaError> {
        if self.is_closed() {
            return Err(MediaError::Closed);
        }
        Ok(RtpParameters(json!({
            "kind": track.kind().as_str(),
            "codecs": [],
        })))
    }

    async fn produce(
        &self,
        producer_id: ProducerId,
        track: MediaTrack,
    ) -> Result<Arc<dyn MediaProducer>, MediaError> {
        if self.is_closed() {
            return Err(MediaError::Closed);
        }
        let producer = Arc::new(MockProducer {
            id: producer_id,
            track,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.engine
            .producers
            .lock()
            .unwrap()
            .push(Arc::clone(&producer));
        Ok(producer)
    }

    async fn consume(
        &self,
        params: &ConsumerParams,
    ) -> Result<Arc<dyn MediaConsumer>, MediaError> {
        if self.is_closed() {
            return Err(MediaError::Closed);
        }
        if self.engine.fail_local_consume.load(Ordering::SeqCst) {
            return Err(MediaError::Transport("decoder unavailable".to_string()));
        }
        let consumer = Arc::new(MockConsumer {
            id: params.id.clone(),
            producer_id: params.producer_id.clone(),
            track: MediaTrack::new(params.kind, params.producer_id.as_str()),
            closed: AtomicBool::new(false),
        });
        self.engine
            .consumers
            .lock()
            .unwrap()
            .push(Arc::clone(&consumer));
        Ok(consumer)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock local producer.
pub struct MockProducer {
    id: ProducerId,
    track: MediaTrack,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl MediaProducer for MockProducer {
    fn id(&self) -> &ProducerId {
        &self.id
    }

    fn track(&self) -> &MediaTrack {
        &self.track
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Mock local consumer. Closing it ends its track.
pub struct MockConsumer {
    id: ConsumerId,
    producer_id: ProducerId,
    track: MediaTrack,
    closed: AtomicBool,
}

impl MediaConsumer for MockConsumer {
    fn id(&self) -> &ConsumerId {
        &self.id
    }

    fn producer_id(&self) -> &ProducerId {
        &self.producer_id
    }

    fn kind(&self) -> MediaKind {
        self.track.kind()
    }

    fn track(&self) -> &MediaTrack {
        &self.track
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.track.stop();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Capture
// ----------------------------------------------------------------------------

/// Mock camera, microphone and display capture.
#[derive(Clone, Default)]
pub struct MockCapture {
    inner: Arc<CaptureInner>,
}

#[derive(Default)]
struct CaptureInner {
    deny_user_media: AtomicBool,
    deny_display: AtomicBool,
    display_audio: AtomicBool,
    user_tracks: Mutex<Vec<MediaTrack>>,
    display_tracks: Mutex<Vec<MediaTrack>>,
}

impl MockCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include a system-audio track in display captures.
    #[must_use]
    pub fn with_display_audio(self, enabled: bool) -> Self {
        self.inner.display_audio.store(enabled, Ordering::SeqCst);
        self
    }

    /// Refuse camera and microphone access.
    pub fn deny_user_media(&self) {
        self.inner.deny_user_media.store(true, Ordering::SeqCst);
    }

    /// Refuse display capture (the user dismissed the picker).
    pub fn deny_display(&self) {
        self.inner.deny_display.store(true, Ordering::SeqCst);
    }

    /// Every camera/microphone track handed out.
    pub fn user_tracks(&self) -> Vec<MediaTrack> {
        self.inner.user_tracks.lock().unwrap().clone()
    }

    /// Every display track handed out.
    pub fn display_tracks(&self) -> Vec<MediaTrack> {
        self.inner.display_tracks.lock().unwrap().clone()
    }

    /// Simulate the OS "stop sharing" control ending the latest display
    /// video track.
    pub fn end_display(&self) {
        let tracks = self.display_tracks();
        if let Some(video) = tracks.iter().rev().find(|t| t.kind() == MediaKind::Video) {
            video.stop();
        }
    }

    /// Capture tracks still live (not stopped).
    pub fn live_tracks(&self) -> usize {
        self.user_tracks()
            .iter()
            .chain(self.display_tracks().iter())
            .filter(|t| !t.is_ended())
            .count()
    }
}

#[async_trait]
impl MediaCapture for MockCapture {
    async fn acquire_user_media(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Vec<MediaTrack>, MediaError> {
        if self.inner.deny_user_media.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied(
                "camera and microphone blocked".to_string(),
            ));
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(MediaKind::Audio, "microphone"));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(MediaKind::Video, "camera"));
        }
        self.inner
            .user_tracks
            .lock()
            .unwrap()
            .extend(tracks.iter().cloned());
        Ok(tracks)
    }

    async fn acquire_display_media(&self) -> Result<Vec<MediaTrack>, MediaError> {
        if self.inner.deny_display.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied(
                "display capture dismissed".to_string(),
            ));
        }
        let mut tracks = vec![MediaTrack::new(MediaKind::Video, "screen")];
        if self.inner.display_audio.load(Ordering::SeqCst) {
            tracks.push(MediaTrack::new(MediaKind::Audio, "system audio"));
        }
        self.inner
            .display_tracks
            .lock()
            .unwrap()
            .extend(tracks.iter().cloned());
        Ok(tracks)
    }
}

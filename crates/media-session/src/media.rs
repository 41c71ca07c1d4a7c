//! Media-transport and capture seams.
//!
//! The session drives a selective-forwarding media library and the
//! platform's capture APIs through these traits. Codec negotiation,
//! congestion control and the DTLS/ICE machinery live behind them.

use async_trait::async_trait;
use common::types::{ConsumerId, ProducerId, StreamId, TrackId, TransportId};
use signaling_protocol::{
    ConsumerParams, DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportDirection,
    TransportParams,
};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Failure reported by the media library or the capture APIs.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The user or the platform refused access to a device.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// No device of the requested kind is available.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The media library rejected an operation.
    #[error("Media transport error: {0}")]
    Transport(String),

    /// The object was already closed.
    #[error("Already closed")]
    Closed,
}

/// A raw local or remote media track.
///
/// Cloning yields another handle to the same track. The `ended` signal
/// fires both for local `stop()` calls and when the platform terminates
/// capture (for example the OS "stop sharing" button).
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

struct TrackInner {
    id: TrackId,
    kind: MediaKind,
    label: String,
    enabled: AtomicBool,
    ended: CancellationToken,
}

impl MediaTrack {
    /// Create a live, enabled track.
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: TrackId::new(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ended: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> TrackId {
        self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Whether the track currently carries media (false renders silence/black).
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Stop the track and release the underlying hardware.
    pub fn stop(&self) {
        self.inner.ended.cancel();
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.is_cancelled()
    }

    /// Token cancelled when the track ends, for whatever reason.
    #[must_use]
    pub fn ended_token(&self) -> CancellationToken {
        self.inner.ended.clone()
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

/// A combined playable stream built from zero or more tracks.
///
/// Two streams compare equal when they carry the same id and the same
/// tracks, so binding an equal stream to a slot is a no-op.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: StreamId,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: StreamId::new(),
            tracks,
        }
    }

    /// A stream with no tracks, used as a name-only placeholder.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    #[must_use]
    pub fn id(&self) -> StreamId {
        self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    #[must_use]
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn has_kind(&self, kind: MediaKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == kind)
    }

    /// Drop every track of `kind`; the stream keeps its identity.
    pub fn remove_kind(&mut self, kind: MediaKind) {
        self.tracks.retain(|t| t.kind() != kind);
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.tracks == other.tracks
    }
}

impl Eq for MediaStream {}

/// Which local devices to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub audio: bool,
    pub video: bool,
}

/// The local media-transport "device".
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Load the router's RTP capabilities. Must succeed before any
    /// transport is created.
    async fn load(&self, router_capabilities: &RtpCapabilities) -> Result<(), MediaError>;

    /// Local receive capabilities, available once loaded.
    fn rtp_capabilities(&self) -> Option<RtpCapabilities>;

    /// Construct a local transport from server-side parameters.
    async fn create_transport(
        &self,
        direction: TransportDirection,
        params: &TransportParams,
    ) -> Result<Arc<dyn MediaTransport>, MediaError>;
}

/// A local send or receive transport.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    fn id(&self) -> &TransportId;

    fn direction(&self) -> TransportDirection;

    /// Local DTLS parameters to hand to the server on connect.
    fn dtls_parameters(&self) -> DtlsParameters;

    /// RTP parameters the server needs to create a producer for `track`.
    fn rtp_parameters(&self, track: &MediaTrack) -> Result<RtpParameters, MediaError>;

    /// Start sending `track` under a server-assigned producer id.
    async fn produce(
        &self,
        producer_id: ProducerId,
        track: MediaTrack,
    ) -> Result<Arc<dyn MediaProducer>, MediaError>;

    /// Create a local consumer from server-side parameters.
    async fn consume(&self, params: &ConsumerParams)
        -> Result<Arc<dyn MediaConsumer>, MediaError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A local outbound media producer.
pub trait MediaProducer: Send + Sync {
    fn id(&self) -> &ProducerId;

    fn track(&self) -> &MediaTrack;

    fn pause(&self);

    fn resume(&self);

    fn is_paused(&self) -> bool;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A local receiving endpoint for one remote producer.
pub trait MediaConsumer: Send + Sync {
    fn id(&self) -> &ConsumerId;

    fn producer_id(&self) -> &ProducerId;

    fn kind(&self) -> MediaKind;

    fn track(&self) -> &MediaTrack;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Camera, microphone and display capture.
#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Capture camera and/or microphone tracks.
    async fn acquire_user_media(
        &self,
        constraints: CaptureConstraints,
    ) -> Result<Vec<MediaTrack>, MediaError>;

    /// Capture the screen: one video track, optionally one audio track.
    async fn acquire_display_media(&self) -> Result<Vec<MediaTrack>, MediaError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_track_enabled_flag_shared_between_clones() {
        let track = MediaTrack::new(MediaKind::Video, "camera");
        let clone = track.clone();

        clone.set_enabled(false);
        assert!(!track.is_enabled());
        assert_eq!(track, clone);
    }

    #[tokio::test]
    async fn test_track_stop_fires_ended_token() {
        let track = MediaTrack::new(MediaKind::Audio, "mic");
        let ended = track.ended_token();
        assert!(!track.is_ended());

        track.stop();

        // Resolves immediately once cancelled
        ended.cancelled().await;
        assert!(track.is_ended());
    }

    #[test]
    fn test_stream_equality_tracks_identity() {
        let audio = MediaTrack::new(MediaKind::Audio, "mic");
        let video = MediaTrack::new(MediaKind::Video, "camera");
        let stream = MediaStream::new(vec![audio.clone(), video]);

        let same = stream.clone();
        assert_eq!(stream, same);

        let mut audio_only = stream.clone();
        audio_only.remove_kind(MediaKind::Video);
        assert_ne!(stream, audio_only);
        assert_eq!(audio_only.track_count(), 1);
        assert!(audio_only.has_kind(MediaKind::Audio));
        assert!(!audio_only.has_kind(MediaKind::Video));

        // Same tracks, different stream identity
        assert_ne!(MediaStream::new(vec![audio.clone()]), MediaStream::new(vec![audio]));
    }

    #[test]
    fn test_empty_stream() {
        let stream = MediaStream::empty();
        assert_eq!(stream.track_count(), 0);
        assert!(stream.tracks().is_empty());
    }
}

//! Local producers.
//!
//! `ProducerRegistry` owns the captured local tracks, the producers sending
//! them, and the single send transport they share. At most one producer per
//! kind is open at a time.

use crate::media::{MediaProducer, MediaTrack};
use crate::transport::SendTransport;
use common::types::ProducerId;
use signaling_protocol::{MediaKind, MediaSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Kind of a local producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProducerKind {
    Audio,
    Video,
    ScreenAudio,
    ScreenVideo,
}

impl ProducerKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProducerKind::Audio => "audio",
            ProducerKind::Video => "video",
            ProducerKind::ScreenAudio => "screen_audio",
            ProducerKind::ScreenVideo => "screen_video",
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            ProducerKind::Audio => "audio",
            ProducerKind::Video => "video",
            ProducerKind::ScreenAudio => "screen audio",
            ProducerKind::ScreenVideo => "screen video",
        }
    }

    #[must_use]
    pub const fn media_kind(&self) -> MediaKind {
        match self {
            ProducerKind::Audio | ProducerKind::ScreenAudio => MediaKind::Audio,
            ProducerKind::Video | ProducerKind::ScreenVideo => MediaKind::Video,
        }
    }

    /// Tag the server uses to route screen content separately.
    #[must_use]
    pub const fn source(&self) -> MediaSource {
        match self {
            ProducerKind::Audio | ProducerKind::Video => MediaSource::Device,
            ProducerKind::ScreenAudio | ProducerKind::ScreenVideo => MediaSource::Screen,
        }
    }

    /// Camera/microphone kind carrying `media_kind`.
    #[must_use]
    pub const fn device(media_kind: MediaKind) -> Self {
        match media_kind {
            MediaKind::Audio => ProducerKind::Audio,
            MediaKind::Video => ProducerKind::Video,
        }
    }

    /// Display-capture kind carrying `media_kind`.
    #[must_use]
    pub const fn screen(media_kind: MediaKind) -> Self {
        match media_kind {
            MediaKind::Audio => ProducerKind::ScreenAudio,
            MediaKind::Video => ProducerKind::ScreenVideo,
        }
    }
}

/// The local participant's tracks, producers and send transport.
#[derive(Default)]
pub struct ProducerRegistry {
    local_tracks: HashMap<ProducerKind, MediaTrack>,
    producers: HashMap<ProducerKind, Arc<dyn MediaProducer>>,
    send_transport: Option<SendTransport>,
}

impl ProducerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a captured track. A previous track of the same kind is stopped.
    pub fn set_local_track(&mut self, kind: ProducerKind, track: MediaTrack) {
        if let Some(previous) = self.local_tracks.insert(kind, track.clone()) {
            if previous != track {
                previous.stop();
            }
        }
    }

    #[must_use]
    pub fn local_track(&self, kind: ProducerKind) -> Option<&MediaTrack> {
        self.local_tracks.get(&kind)
    }

    #[must_use]
    pub fn has_local_tracks(&self) -> bool {
        !self.local_tracks.is_empty()
    }

    pub fn attach_transport(&mut self, transport: SendTransport) {
        if let Some(previous) = self.send_transport.replace(transport) {
            previous.close();
        }
    }

    #[must_use]
    pub fn transport(&self) -> Option<&SendTransport> {
        self.send_transport.as_ref()
    }

    /// Close the send transport and every producer riding on it.
    pub fn detach_transport(&mut self) {
        for (_, producer) in self.producers.drain() {
            producer.close();
        }
        if let Some(transport) = self.send_transport.take() {
            transport.close();
        }
    }

    /// Register an open producer, closing any previous one of the same kind.
    pub fn insert(&mut self, kind: ProducerKind, producer: Arc<dyn MediaProducer>) {
        info!(
            target: "ms.producer",
            kind = kind.as_str(),
            producer_id = %producer.id(),
            "Producer opened"
        );
        if let Some(previous) = self.producers.insert(kind, producer) {
            debug!(
                target: "ms.producer",
                kind = kind.as_str(),
                producer_id = %previous.id(),
                "Closing superseded producer"
            );
            previous.close();
        }
    }

    #[must_use]
    pub fn producer_id(&self, kind: ProducerKind) -> Option<&ProducerId> {
        self.producers.get(&kind).map(|p| p.id())
    }

    #[must_use]
    pub fn contains(&self, kind: ProducerKind) -> bool {
        self.producers.contains_key(&kind)
    }

    /// Pause or resume `kind`.
    ///
    /// The raw track's enabled flag is updated even when no producer exists
    /// yet, so the local preview reflects the state before streaming starts.
    pub fn set_paused(&self, kind: ProducerKind, paused: bool) {
        if let Some(track) = self.local_tracks.get(&kind) {
            track.set_enabled(!paused);
        }
        if let Some(producer) = self.producers.get(&kind) {
            if paused {
                producer.pause();
            } else {
                producer.resume();
            }
        }
        debug!(target: "ms.producer", kind = kind.as_str(), paused, "Producer pause state set");
    }

    /// Close the producer of `kind` and stop its track.
    pub fn close(&mut self, kind: ProducerKind) {
        if let Some(producer) = self.producers.remove(&kind) {
            info!(
                target: "ms.producer",
                kind = kind.as_str(),
                producer_id = %producer.id(),
                "Producer closed"
            );
            producer.close();
        }
        if let Some(track) = self.local_tracks.remove(&kind) {
            track.stop();
        }
    }

    /// Close every producer, release capture hardware and close the send
    /// transport.
    pub fn close_all(&mut self) {
        let count = self.producers.len();
        self.detach_transport();
        for (_, track) in self.local_tracks.drain() {
            track.stop();
        }
        info!(target: "ms.producer", producers = count, "All producers closed");
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.producers.values().filter(|p| !p.is_closed()).count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProducer {
        id: ProducerId,
        track: MediaTrack,
        paused: AtomicBool,
        closed: AtomicBool,
    }

    impl FakeProducer {
        fn open(id: &str, track: &MediaTrack) -> Arc<Self> {
            Arc::new(Self {
                id: ProducerId::from(id),
                track: track.clone(),
                paused: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            })
        }
    }

    impl MediaProducer for FakeProducer {
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

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ProducerKind::ScreenAudio.media_kind(), MediaKind::Audio);
        assert_eq!(ProducerKind::ScreenVideo.source(), MediaSource::Screen);
        assert_eq!(ProducerKind::Video.source(), MediaSource::Device);
        assert_eq!(ProducerKind::device(MediaKind::Video), ProducerKind::Video);
        assert_eq!(
            ProducerKind::screen(MediaKind::Audio),
            ProducerKind::ScreenAudio
        );
        assert_eq!(ProducerKind::ScreenVideo.as_str(), "screen_video");
        assert_eq!(ProducerKind::ScreenVideo.description(), "screen video");
    }

    #[test]
    fn test_insert_closes_previous_of_same_kind() {
        let mut registry = ProducerRegistry::new();
        let track = MediaTrack::new(MediaKind::Audio, "mic");

        let first = FakeProducer::open("a1", &track);
        let second = FakeProducer::open("a2", &track);
        registry.insert(ProducerKind::Audio, first.clone());
        registry.insert(ProducerKind::Audio, second.clone());

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(registry.open_count(), 1);
        assert_eq!(
            registry.producer_id(ProducerKind::Audio),
            Some(&ProducerId::from("a2"))
        );
    }

    #[test]
    fn test_pause_before_producer_exists_updates_track() {
        let mut registry = ProducerRegistry::new();
        let track = MediaTrack::new(MediaKind::Video, "camera");
        registry.set_local_track(ProducerKind::Video, track.clone());

        registry.set_paused(ProducerKind::Video, true);
        assert!(!track.is_enabled());

        // Resume with no producer is a no-op beyond the track flag
        registry.set_paused(ProducerKind::Video, false);
        assert!(track.is_enabled());
    }

    #[test]
    fn test_pause_keeps_track_and_producer_consistent() {
        let mut registry = ProducerRegistry::new();
        let track = MediaTrack::new(MediaKind::Audio, "mic");
        registry.set_local_track(ProducerKind::Audio, track.clone());
        let producer = FakeProducer::open("a1", &track);
        registry.insert(ProducerKind::Audio, producer.clone());

        registry.set_paused(ProducerKind::Audio, true);
        assert!(producer.is_paused());
        assert!(!track.is_enabled());

        registry.set_paused(ProducerKind::Audio, false);
        assert!(!producer.is_paused());
        assert!(track.is_enabled());
    }

    #[test]
    fn test_close_all_stops_tracks() {
        let mut registry = ProducerRegistry::new();
        let audio = MediaTrack::new(MediaKind::Audio, "mic");
        let video = MediaTrack::new(MediaKind::Video, "camera");
        registry.set_local_track(ProducerKind::Audio, audio.clone());
        registry.set_local_track(ProducerKind::Video, video.clone());
        let producer = FakeProducer::open("a1", &audio);
        registry.insert(ProducerKind::Audio, producer.clone());

        registry.close_all();

        assert!(producer.is_closed());
        assert!(audio.is_ended());
        assert!(video.is_ended());
        assert_eq!(registry.open_count(), 0);
        assert!(!registry.has_local_tracks());
    }

    #[test]
    fn test_close_single_kind() {
        let mut registry = ProducerRegistry::new();
        let screen = MediaTrack::new(MediaKind::Video, "screen");
        registry.set_local_track(ProducerKind::ScreenVideo, screen.clone());
        registry.insert(
            ProducerKind::ScreenVideo,
            FakeProducer::open("s1", &screen),
        );

        registry.close(ProducerKind::ScreenVideo);

        assert!(!registry.contains(ProducerKind::ScreenVideo));
        assert!(screen.is_ended());
    }
}

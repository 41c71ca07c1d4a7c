//! Remote publisher groups.
//!
//! A group is one remote participant's audio and (optional) video consumers
//! on their own receive transport, keyed by the remote audio producer id.
//! The group's combined stream carries exactly the tracks of its open
//! consumers.

use crate::media::{MediaConsumer, MediaStream};
use crate::transport::{ReceiveTransport, TransportManager};
use common::types::ProducerId;
use signaling_protocol::{MediaKind, NewPublisher, RemoteParticipant};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One remote participant's consumed media.
pub struct PublisherGroup {
    audio_pid: ProducerId,
    video_pid: Option<ProducerId>,
    participant: RemoteParticipant,
    transport: Option<ReceiveTransport>,
    audio: Option<Arc<dyn MediaConsumer>>,
    video: Option<Arc<dyn MediaConsumer>>,
    stream: MediaStream,
}

impl PublisherGroup {
    /// Build a group from whichever sub-consumers succeeded.
    pub fn new(
        audio_pid: ProducerId,
        video_pid: Option<ProducerId>,
        participant: RemoteParticipant,
        transport: Option<ReceiveTransport>,
        audio: Option<Arc<dyn MediaConsumer>>,
        video: Option<Arc<dyn MediaConsumer>>,
    ) -> Self {
        let tracks = audio
            .iter()
            .chain(video.iter())
            .map(|c| c.track().clone())
            .collect();
        Self {
            audio_pid,
            video_pid,
            participant,
            transport,
            audio,
            video,
            stream: MediaStream::new(tracks),
        }
    }

    #[must_use]
    pub fn audio_pid(&self) -> &ProducerId {
        &self.audio_pid
    }

    #[must_use]
    pub fn video_pid(&self) -> Option<&ProducerId> {
        self.video_pid.as_ref()
    }

    #[must_use]
    pub fn participant(&self) -> &RemoteParticipant {
        &self.participant
    }

    #[must_use]
    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    /// Open sub-consumers (0, 1 or 2).
    #[must_use]
    pub fn open_consumer_count(&self) -> usize {
        self.audio
            .iter()
            .chain(self.video.iter())
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Close the video consumer only; the group keeps its audio.
    pub fn close_video(&mut self) {
        if let Some(video) = self.video.take() {
            video.close();
        }
        self.video_pid = None;
        self.stream.remove_kind(MediaKind::Video);
    }

    /// Close both consumers and the receive transport.
    pub fn close(&mut self) {
        for consumer in self.audio.take().into_iter().chain(self.video.take()) {
            consumer.close();
        }
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        self.stream = MediaStream::empty();
    }
}

/// Consume one announced publisher: receive transport, then audio, then
/// video. Individual failures degrade the group instead of dropping it; a
/// group where everything failed carries an empty stream so the participant
/// still shows up by name.
pub async fn consume_group(
    transports: &TransportManager,
    publisher: NewPublisher,
    cancel: &CancellationToken,
) -> PublisherGroup {
    let NewPublisher {
        audio_pid,
        video_pid,
        participant,
    } = publisher;

    let transport = match transports.create_receive_transport(&audio_pid).await {
        Ok(transport) => Some(transport),
        Err(e) => {
            warn!(
                target: "ms.consumer",
                audio_pid = %audio_pid,
                error = %e,
                "Receive transport unavailable, registering placeholder"
            );
            None
        }
    };

    let mut audio = None;
    let mut video = None;

    if let Some(transport) = &transport {
        if !cancel.is_cancelled() {
            match transport.consume(&audio_pid, MediaKind::Audio).await {
                Ok(consumer) => audio = Some(consumer),
                Err(e) => warn!(
                    target: "ms.consumer",
                    audio_pid = %audio_pid,
                    error = %e,
                    "Audio consume failed"
                ),
            }
        }

        // Audio settles before video: both share the transport's handshake
        if let Some(video_pid) = &video_pid {
            if !cancel.is_cancelled() {
                match transport.consume(video_pid, MediaKind::Video).await {
                    Ok(consumer) => video = Some(consumer),
                    Err(e) => warn!(
                        target: "ms.consumer",
                        audio_pid = %audio_pid,
                        video_pid = %video_pid,
                        error = %e,
                        "Video consume failed"
                    ),
                }
            }
        }
    }

    let group = PublisherGroup::new(audio_pid, video_pid, participant, transport, audio, video);
    debug!(
        target: "ms.consumer",
        audio_pid = %group.audio_pid,
        tracks = group.stream.track_count(),
        "Publisher group consumed"
    );
    group
}

/// Registered publisher groups plus the consume cycles still in flight.
#[derive(Default)]
pub struct ConsumerRegistry {
    groups: HashMap<ProducerId, PublisherGroup>,
    /// In-flight consume cycles: audio pid to announced video pid.
    pending: HashMap<ProducerId, Option<ProducerId>>,
    /// Pids reported closed while their cycle was in flight.
    closed_while_pending: HashSet<ProducerId>,
}

impl ConsumerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `publisher` for a consume cycle.
    ///
    /// Returns false when its audio pid already has a group or an in-flight
    /// cycle, so redundant announcements never create a second transport.
    pub fn begin(&mut self, publisher: &NewPublisher) -> bool {
        let key = &publisher.audio_pid;
        if self.groups.contains_key(key) || self.pending.contains_key(key) {
            return false;
        }
        self.pending
            .insert(key.clone(), publisher.video_pid.clone());
        true
    }

    /// Register a finished cycle.
    ///
    /// Returns the group back when it must be discarded instead (its audio
    /// pid was closed meanwhile or the cycle was not claimed). A video pid
    /// closed meanwhile is dropped from the group before registering.
    pub fn complete(&mut self, mut group: PublisherGroup) -> Result<(), PublisherGroup> {
        let key = group.audio_pid.clone();
        let Some(video_pid) = self.pending.remove(&key) else {
            return Err(group);
        };

        if let Some(video_pid) = video_pid {
            if self.closed_while_pending.remove(&video_pid) {
                group.close_video();
            }
        }

        if self.closed_while_pending.remove(&key) || self.groups.contains_key(&key) {
            return Err(group);
        }

        info!(
            target: "ms.consumer",
            audio_pid = %key,
            tracks = group.stream.track_count(),
            "Publisher group registered"
        );
        self.groups.insert(key, group);
        Ok(())
    }

    /// Remember that `pid` closed while its cycle is in flight.
    ///
    /// Returns false when `pid` belongs to no in-flight cycle.
    pub fn mark_closed_pending(&mut self, pid: &ProducerId) -> bool {
        let in_flight = self.pending.contains_key(pid)
            || self
                .pending
                .values()
                .any(|video| video.as_ref() == Some(pid));
        if in_flight {
            self.closed_while_pending.insert(pid.clone());
        }
        in_flight
    }

    #[must_use]
    pub fn is_pending(&self, audio_pid: &ProducerId) -> bool {
        self.pending.contains_key(audio_pid)
    }

    /// Remove the group keyed by `audio_pid`. The caller closes it.
    pub fn remove(&mut self, audio_pid: &ProducerId) -> Option<PublisherGroup> {
        self.groups.remove(audio_pid)
    }

    /// Close the video consumer whose producer is `video_pid`.
    ///
    /// Returns the owning group's key.
    pub fn close_video_by_pid(&mut self, video_pid: &ProducerId) -> Option<ProducerId> {
        let group = self
            .groups
            .values_mut()
            .find(|g| g.video_pid.as_ref() == Some(video_pid))?;
        group.close_video();
        Some(group.audio_pid.clone())
    }

    #[must_use]
    pub fn get(&self, audio_pid: &ProducerId) -> Option<&PublisherGroup> {
        self.groups.get(audio_pid)
    }

    #[must_use]
    pub fn contains(&self, audio_pid: &ProducerId) -> bool {
        self.groups.contains_key(audio_pid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Registered group keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<ProducerId> {
        let mut keys: Vec<ProducerId> = self.groups.keys().cloned().collect();
        keys.sort();
        keys
    }

    #[must_use]
    pub fn open_consumer_count(&self) -> usize {
        self.groups
            .values()
            .map(PublisherGroup::open_consumer_count)
            .sum()
    }

    /// Take every group out and forget in-flight cycles.
    pub fn drain(&mut self) -> Vec<PublisherGroup> {
        self.pending.clear();
        self.closed_while_pending.clear();
        self.groups.drain().map(|(_, group)| group).collect()
    }
}

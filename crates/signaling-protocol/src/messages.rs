//! Signaling message types.
//!
//! Field names are camelCase on the wire.

use common::types::{ConsumerId, ProducerId, RoomId, TransportId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Router RTP capabilities, as advertised by the server or the local device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub Value);

/// RTP parameters of one producer or consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub Value);

/// DTLS parameters exchanged once per transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub Value);

/// Media kind of a track, producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// Returns the kind as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Application-level tag telling the server where produced media comes from.
///
/// The server routes screen content differently from camera/microphone media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    /// Camera or microphone.
    Device,
    /// Display capture.
    Screen,
}

/// Direction of a data-plane transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
}

impl TransportDirection {
    /// Returns the direction as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransportDirection::Send => "send",
            TransportDirection::Recv => "recv",
        }
    }
}

// ----------------------------------------------------------------------------
// Requests and acknowledgements
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: UserId,
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAck {
    pub router_rtp_capabilities: RtpCapabilities,
    /// Whether the joining user owns the room.
    #[serde(default)]
    pub is_owner: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    #[serde(rename = "type")]
    pub direction: TransportDirection,
    /// Publisher group a receive transport belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_pid: Option<ProducerId>,
}

/// Server-side parameters needed to construct a local transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportParams {
    pub id: TransportId,
    pub ice_parameters: Value,
    pub ice_candidates: Value,
    pub dtls_parameters: DtlsParameters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectTransportRequest {
    pub dtls_parameters: DtlsParameters,
    #[serde(rename = "type")]
    pub direction: TransportDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_pid: Option<ProducerId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceAppData {
    pub source: MediaSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProduceRequest {
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub app_data: ProduceAppData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceAck {
    pub id: ProducerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeRequest {
    pub rtp_capabilities: RtpCapabilities,
    pub pid: ProducerId,
    pub kind: MediaKind,
}

/// Server-side parameters needed to construct a local consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerParams {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Outcome of a `consumeMedia` request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeAck {
    Params(ConsumerParams),
    /// Local RTP capabilities cannot receive this producer.
    CannotConsume,
    /// Server failed to create the consumer.
    ConsumeFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpauseConsumerRequest {
    pub pid: ProducerId,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleMediaRequest {
    pub paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenShareRequest {
    pub video_pid: ProducerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_pid: Option<ProducerId>,
}

/// A request sent over the signaling channel, awaiting an acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingRequest {
    Join(JoinRequest),
    RequestTransport(TransportRequest),
    ConnectTransport(ConnectTransportRequest),
    StartProducing(ProduceRequest),
    ConsumeMedia(ConsumeRequest),
    UnpauseConsumer(UnpauseConsumerRequest),
    ToggleAudio(ToggleMediaRequest),
    ToggleVideo(ToggleMediaRequest),
    StartScreenShare(ScreenShareRequest),
    StopScreenShare,
    EndCall,
    LeaveRoom,
}

// ----------------------------------------------------------------------------
// Push events
// ----------------------------------------------------------------------------

/// A remote participant as described by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParticipant {
    #[serde(rename = "userId", alias = "id")]
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub is_owner: bool,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default = "default_true")]
    pub is_video_enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// One announced remote publisher: the group key, an optional video
/// producer (camera may be off) and who it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPublisher {
    pub audio_pid: ProducerId,
    pub video_pid: Option<ProducerId>,
    pub participant: RemoteParticipant,
}

/// Wire shape of `newPublishers`: three parallel arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPublishersPayload {
    pub audio_pids_to_create: Vec<ProducerId>,
    pub video_pids_to_create: Vec<Option<ProducerId>>,
    pub associated_users: Vec<RemoteParticipant>,
}

/// Server-initiated events.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Producer ids ordered by speaking activity, loudest first.
    ActiveSpeakersUpdate(Vec<ProducerId>),
    NewPublishers(Vec<NewPublisher>),
    ProducerClosed(ProducerId),
    /// Remote media is ready to receive this participant's feed.
    RemoteMediaReady,
    /// The room owner ended the call for everyone.
    CallEnded,
    Connected,
    Disconnected { reason: String },
    /// The signaling channel gave up reconnecting.
    ReconnectFailed,
}

//! Typed client over the signaling channel.
//!
//! The channel itself (connection, reconnection with backoff, request
//! timeouts) is an external collaborator behind [`SignalingTransport`].
//! Push events reach the session already decoded, over an `mpsc` channel
//! fed by whoever owns the channel.

use async_trait::async_trait;
use common::types::{ProducerId, RoomId, UserId};
use serde_json::Value;
use signaling_protocol::{
    check_ack, decode_ack, decode_consume_ack, decode_produce_ack, decode_status_ack, events,
    ConnectTransportRequest, ConsumeAck, ConsumeRequest, DtlsParameters, JoinAck, JoinRequest,
    MediaKind, MediaSource, ProduceAppData, ProduceRequest, RtpCapabilities, RtpParameters,
    ScreenShareRequest, SignalingError, SignalingRequest, ToggleMediaRequest, TransportDirection,
    TransportParams, TransportRequest, UnpauseConsumerRequest,
};
use std::sync::Arc;
use tracing::debug;

/// Request/acknowledgement half of the signaling channel.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Emit `event` and wait for the server's acknowledgement.
    ///
    /// A timeout is reported as [`SignalingError::Timeout`] and is treated
    /// by callers exactly like a rejection.
    async fn emit_with_ack(&self, event: &str, payload: Value) -> Result<Value, SignalingError>;
}

/// Typed wrapper issuing each protocol request and decoding its ack.
#[derive(Clone)]
pub struct SignalingClient {
    transport: Arc<dyn SignalingTransport>,
}

impl SignalingClient {
    pub fn new(transport: Arc<dyn SignalingTransport>) -> Self {
        Self { transport }
    }

    async fn request(&self, request: SignalingRequest) -> Result<Value, SignalingError> {
        let (event, payload) = request.encode()?;
        debug!(target: "ms.signaling", event, "Emitting signaling request");
        self.transport.emit_with_ack(event, payload).await
    }

    pub async fn join(&self, user_id: &UserId, room_id: &RoomId) -> Result<JoinAck, SignalingError> {
        let ack = self
            .request(SignalingRequest::Join(JoinRequest {
                user_id: user_id.clone(),
                room_id: room_id.clone(),
            }))
            .await?;
        decode_ack(events::JOIN, ack)
    }

    /// Request server-side transport parameters. Receive transports carry
    /// the group key so the server can route them.
    pub async fn request_transport(
        &self,
        direction: TransportDirection,
        audio_pid: Option<&ProducerId>,
    ) -> Result<TransportParams, SignalingError> {
        let ack = self
            .request(SignalingRequest::RequestTransport(TransportRequest {
                direction,
                audio_pid: audio_pid.cloned(),
            }))
            .await?;
        decode_ack(events::REQUEST_TRANSPORT, ack)
    }

    pub async fn connect_transport(
        &self,
        dtls_parameters: DtlsParameters,
        direction: TransportDirection,
        audio_pid: Option<&ProducerId>,
    ) -> Result<(), SignalingError> {
        let ack = self
            .request(SignalingRequest::ConnectTransport(ConnectTransportRequest {
                dtls_parameters,
                direction,
                audio_pid: audio_pid.cloned(),
            }))
            .await?;
        decode_status_ack(events::CONNECT_TRANSPORT, &ack)
    }

    /// Negotiate a server-side producer id before local production starts.
    pub async fn start_producing(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        source: MediaSource,
    ) -> Result<ProducerId, SignalingError> {
        let ack = self
            .request(SignalingRequest::StartProducing(ProduceRequest {
                kind,
                rtp_parameters,
                app_data: ProduceAppData { source },
            }))
            .await?;
        decode_produce_ack(ack)
    }

    pub async fn consume_media(
        &self,
        rtp_capabilities: RtpCapabilities,
        pid: &ProducerId,
        kind: MediaKind,
    ) -> Result<ConsumeAck, SignalingError> {
        let ack = self
            .request(SignalingRequest::ConsumeMedia(ConsumeRequest {
                rtp_capabilities,
                pid: pid.clone(),
                kind,
            }))
            .await?;
        decode_consume_ack(ack)
    }

    pub async fn unpause_consumer(
        &self,
        pid: &ProducerId,
        kind: MediaKind,
    ) -> Result<(), SignalingError> {
        let ack = self
            .request(SignalingRequest::UnpauseConsumer(UnpauseConsumerRequest {
                pid: pid.clone(),
                kind,
            }))
            .await?;
        check_ack(events::UNPAUSE_CONSUMER, &ack)
    }

    pub async fn toggle_audio(&self, paused: bool) -> Result<(), SignalingError> {
        let ack = self
            .request(SignalingRequest::ToggleAudio(ToggleMediaRequest { paused }))
            .await?;
        check_ack(events::TOGGLE_AUDIO, &ack)
    }

    pub async fn toggle_video(&self, paused: bool) -> Result<(), SignalingError> {
        let ack = self
            .request(SignalingRequest::ToggleVideo(ToggleMediaRequest { paused }))
            .await?;
        check_ack(events::TOGGLE_VIDEO, &ack)
    }

    pub async fn start_screen_share(
        &self,
        video_pid: &ProducerId,
        audio_pid: Option<&ProducerId>,
    ) -> Result<(), SignalingError> {
        let ack = self
            .request(SignalingRequest::StartScreenShare(ScreenShareRequest {
                video_pid: video_pid.clone(),
                audio_pid: audio_pid.cloned(),
            }))
            .await?;
        check_ack(events::START_SCREEN_SHARE, &ack)
    }

    pub async fn stop_screen_share(&self) -> Result<(), SignalingError> {
        let ack = self.request(SignalingRequest::StopScreenShare).await?;
        check_ack(events::STOP_SCREEN_SHARE, &ack)
    }

    pub async fn end_call(&self) -> Result<(), SignalingError> {
        let ack = self.request(SignalingRequest::EndCall).await?;
        check_ack(events::END_CALL, &ack)
    }

    pub async fn leave_room(&self) -> Result<(), SignalingError> {
        let ack = self.request(SignalingRequest::LeaveRoom).await?;
        check_ack(events::LEAVE_ROOM, &ack)
    }
}

//! Codec for encoding requests and decoding acknowledgements and push events.

use crate::error::SignalingError;
use crate::messages::{
    ConsumeAck, NewPublisher, NewPublishersPayload, ProduceAck, PushEvent, SignalingRequest,
};
use common::types::ProducerId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event names used on the signaling channel.
pub mod events {
    // Requests
    pub const JOIN: &str = "join";
    pub const REQUEST_TRANSPORT: &str = "requestTransport";
    pub const CONNECT_TRANSPORT: &str = "connectTransport";
    pub const START_PRODUCING: &str = "startProducing";
    pub const CONSUME_MEDIA: &str = "consumeMedia";
    pub const UNPAUSE_CONSUMER: &str = "unpauseConsumer";
    pub const TOGGLE_AUDIO: &str = "toggleAudio";
    pub const TOGGLE_VIDEO: &str = "toggleVideo";
    pub const START_SCREEN_SHARE: &str = "startScreenShare";
    pub const STOP_SCREEN_SHARE: &str = "stopScreenShare";
    pub const END_CALL: &str = "endCall";
    pub const LEAVE_ROOM: &str = "leaveRoom";

    // Push events
    pub const ACTIVE_SPEAKERS_UPDATE: &str = "activeSpeakersUpdate";
    pub const NEW_PUBLISHERS: &str = "newPublishers";
    pub const PRODUCER_CLOSED: &str = "producerClosed";
    pub const REMOTE_MEDIA_READY: &str = "remoteMediaReady";
    pub const CALL_ENDED: &str = "callEnded";
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const RECONNECT_FAILED: &str = "reconnectFailed";
}

const SUCCESS_ACK: &str = "success";
const ERROR_ACK: &str = "error";
const CANNOT_CONSUME_ACK: &str = "cannotConsume";
const CONSUME_FAILED_ACK: &str = "consumeFailed";

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Payload did not match the expected shape
    #[error("Invalid {event} payload: {reason}")]
    InvalidFormat { event: String, reason: String },

    /// Event name not part of the protocol
    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    /// `newPublishers` arrays of different lengths
    #[error("Mismatched newPublishers arrays: {audio} audio, {video} video, {users} users")]
    MismatchedPublishers {
        audio: usize,
        video: usize,
        users: usize,
    },
}

impl CodecError {
    fn invalid(event: &str, reason: impl ToString) -> Self {
        CodecError::InvalidFormat {
            event: event.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl SignalingRequest {
    /// Event name this request is emitted under.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        match self {
            SignalingRequest::Join(_) => events::JOIN,
            SignalingRequest::RequestTransport(_) => events::REQUEST_TRANSPORT,
            SignalingRequest::ConnectTransport(_) => events::CONNECT_TRANSPORT,
            SignalingRequest::StartProducing(_) => events::START_PRODUCING,
            SignalingRequest::ConsumeMedia(_) => events::CONSUME_MEDIA,
            SignalingRequest::UnpauseConsumer(_) => events::UNPAUSE_CONSUMER,
            SignalingRequest::ToggleAudio(_) => events::TOGGLE_AUDIO,
            SignalingRequest::ToggleVideo(_) => events::TOGGLE_VIDEO,
            SignalingRequest::StartScreenShare(_) => events::START_SCREEN_SHARE,
            SignalingRequest::StopScreenShare => events::STOP_SCREEN_SHARE,
            SignalingRequest::EndCall => events::END_CALL,
            SignalingRequest::LeaveRoom => events::LEAVE_ROOM,
        }
    }

    /// Encode into an `(event, payload)` pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload fails to serialize.
    pub fn encode(&self) -> Result<(&'static str, Value), CodecError> {
        let event = self.event();
        let payload = match self {
            SignalingRequest::Join(r) => to_payload(event, r)?,
            SignalingRequest::RequestTransport(r) => to_payload(event, r)?,
            SignalingRequest::ConnectTransport(r) => to_payload(event, r)?,
            SignalingRequest::StartProducing(r) => to_payload(event, r)?,
            SignalingRequest::ConsumeMedia(r) => to_payload(event, r)?,
            SignalingRequest::UnpauseConsumer(r) => to_payload(event, r)?,
            SignalingRequest::ToggleAudio(r) | SignalingRequest::ToggleVideo(r) => {
                to_payload(event, r)?
            }
            SignalingRequest::StartScreenShare(r) => to_payload(event, r)?,
            SignalingRequest::StopScreenShare
            | SignalingRequest::EndCall
            | SignalingRequest::LeaveRoom => Value::Null,
        };
        Ok((event, payload))
    }
}

fn to_payload<T: Serialize>(event: &str, value: &T) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|e| CodecError::invalid(event, e))
}

fn from_payload<T: DeserializeOwned>(event: &str, payload: Value) -> Result<T, CodecError> {
    serde_json::from_value(payload).map_err(|e| CodecError::invalid(event, e))
}

/// Failure reason carried by an acknowledgement, if it is a failure.
fn failure_reason(ack: &Value) -> Option<String> {
    match ack {
        Value::String(s) if s == ERROR_ACK => Some(ERROR_ACK.to_string()),
        Value::Object(map) => map.get(ERROR_ACK).map(|reason| match reason {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        _ => None,
    }
}

/// Decode a structured acknowledgement.
///
/// # Errors
///
/// Returns `Rejected` for `"error"` acks and `Codec` for malformed ones.
pub fn decode_ack<T: DeserializeOwned>(event: &str, ack: Value) -> Result<T, SignalingError> {
    if let Some(reason) = failure_reason(&ack) {
        return Err(SignalingError::rejected(event, reason));
    }
    Ok(from_payload(event, ack)?)
}

/// Decode a `"success"` status acknowledgement. Anything else is a rejection.
///
/// # Errors
///
/// Returns `Rejected` carrying the ack text.
pub fn decode_status_ack(event: &str, ack: &Value) -> Result<(), SignalingError> {
    match ack {
        Value::String(s) if s == SUCCESS_ACK => Ok(()),
        Value::String(s) => Err(SignalingError::rejected(event, s.clone())),
        other => Err(SignalingError::rejected(event, other.to_string())),
    }
}

/// Check an acknowledgement that carries no data; only failures matter.
///
/// # Errors
///
/// Returns `Rejected` for `"error"` acks.
pub fn check_ack(event: &str, ack: &Value) -> Result<(), SignalingError> {
    match failure_reason(ack) {
        Some(reason) => Err(SignalingError::rejected(event, reason)),
        None => Ok(()),
    }
}

/// Decode a `startProducing` acknowledgement into the server producer id.
///
/// # Errors
///
/// Returns `Rejected` for `"error"` acks and `Codec` for malformed ones.
pub fn decode_produce_ack(ack: Value) -> Result<ProducerId, SignalingError> {
    decode_ack::<ProduceAck>(events::START_PRODUCING, ack).map(|ack| ack.id)
}

/// Decode a `consumeMedia` acknowledgement.
///
/// # Errors
///
/// Returns `Rejected` for `"error"` acks and `Codec` for malformed ones.
pub fn decode_consume_ack(ack: Value) -> Result<ConsumeAck, SignalingError> {
    if let Value::String(s) = &ack {
        if s == CANNOT_CONSUME_ACK {
            return Ok(ConsumeAck::CannotConsume);
        }
        if s == CONSUME_FAILED_ACK {
            return Ok(ConsumeAck::ConsumeFailed);
        }
    }
    decode_ack(events::CONSUME_MEDIA, ack).map(ConsumeAck::Params)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PidPayload {
    Bare(ProducerId),
    Wrapped { pid: ProducerId },
}

/// Decode a push event.
///
/// # Errors
///
/// Returns an error for unknown events or malformed payloads.
pub fn decode_push(event: &str, payload: Value) -> Result<PushEvent, CodecError> {
    match event {
        events::ACTIVE_SPEAKERS_UPDATE => {
            from_payload(event, payload).map(PushEvent::ActiveSpeakersUpdate)
        }
        events::NEW_PUBLISHERS => {
            let payload: NewPublishersPayload = from_payload(event, payload)?;
            zip_publishers(payload).map(PushEvent::NewPublishers)
        }
        events::PRODUCER_CLOSED => {
            let pid = match from_payload(event, payload)? {
                PidPayload::Bare(pid) | PidPayload::Wrapped { pid } => pid,
            };
            Ok(PushEvent::ProducerClosed(pid))
        }
        events::REMOTE_MEDIA_READY => Ok(PushEvent::RemoteMediaReady),
        events::CALL_ENDED => Ok(PushEvent::CallEnded),
        events::CONNECT => Ok(PushEvent::Connected),
        events::DISCONNECT => {
            let reason = match payload {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            Ok(PushEvent::Disconnected { reason })
        }
        events::RECONNECT_FAILED => Ok(PushEvent::ReconnectFailed),
        other => Err(CodecError::UnknownEvent(other.to_string())),
    }
}

fn zip_publishers(payload: NewPublishersPayload) -> Result<Vec<NewPublisher>, CodecError> {
    let NewPublishersPayload {
        audio_pids_to_create,
        video_pids_to_create,
        associated_users,
    } = payload;

    if audio_pids_to_create.len() != video_pids_to_create.len()
        || audio_pids_to_create.len() != associated_users.len()
    {
        return Err(CodecError::MismatchedPublishers {
            audio: audio_pids_to_create.len(),
            video: video_pids_to_create.len(),
            users: associated_users.len(),
        });
    }

    Ok(audio_pids_to_create
        .into_iter()
        .zip(video_pids_to_create)
        .zip(associated_users)
        .map(|((audio_pid, video_pid), participant)| NewPublisher {
            audio_pid,
            video_pid,
            participant,
        })
        .collect())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::messages::{
        JoinRequest, MediaKind, MediaSource, ProduceAppData, ProduceRequest, RtpParameters,
        TransportDirection, TransportRequest,
    };
    use serde_json::json;

    #[test]
    fn test_join_request_encodes_camel_case() {
        let request = SignalingRequest::Join(JoinRequest {
            user_id: "alice".into(),
            room_id: "abc-1234-xyz".into(),
        });
        let (event, payload) = request.encode().unwrap();
        assert_eq!(event, "join");
        assert_eq!(payload, json!({"userId": "alice", "roomId": "abc-1234-xyz"}));
    }

    #[test]
    fn test_receive_transport_request_carries_group_key() {
        let request = SignalingRequest::RequestTransport(TransportRequest {
            direction: TransportDirection::Recv,
            audio_pid: Some("p1".into()),
        });
        let (_, payload) = request.encode().unwrap();
        assert_eq!(payload, json!({"type": "recv", "audioPid": "p1"}));

        let send = SignalingRequest::RequestTransport(TransportRequest {
            direction: TransportDirection::Send,
            audio_pid: None,
        });
        let (_, payload) = send.encode().unwrap();
        assert_eq!(payload, json!({"type": "send"}));
    }

    #[test]
    fn test_produce_request_tags_screen_source() {
        let request = SignalingRequest::StartProducing(ProduceRequest {
            kind: MediaKind::Video,
            rtp_parameters: RtpParameters(json!({"codecs": []})),
            app_data: ProduceAppData {
                source: MediaSource::Screen,
            },
        });
        let (event, payload) = request.encode().unwrap();
        assert_eq!(event, "startProducing");
        assert_eq!(payload["appData"]["source"], "screen");
        assert_eq!(payload["kind"], "video");
    }

    #[test]
    fn test_unit_requests_have_null_payload() {
        for request in [
            SignalingRequest::StopScreenShare,
            SignalingRequest::EndCall,
            SignalingRequest::LeaveRoom,
        ] {
            let (_, payload) = request.encode().unwrap();
            assert_eq!(payload, Value::Null);
        }
    }

    #[test]
    fn test_status_ack() {
        assert!(decode_status_ack("connectTransport", &json!("success")).is_ok());
        assert!(matches!(
            decode_status_ack("connectTransport", &json!("dtls failed")),
            Err(SignalingError::Rejected { reason, .. }) if reason == "dtls failed"
        ));
        assert!(decode_status_ack("connectTransport", &json!({"ok": true})).is_err());
    }

    #[test]
    fn test_plain_ack_only_rejects_failures() {
        assert!(check_ack(events::UNPAUSE_CONSUMER, &Value::Null).is_ok());
        assert!(check_ack(events::TOGGLE_AUDIO, &json!("success")).is_ok());
        assert!(matches!(
            check_ack(events::END_CALL, &json!({"error": "not owner"})),
            Err(SignalingError::Rejected { reason, .. }) if reason == "not owner"
        ));
    }

    #[test]
    fn test_produce_ack() {
        assert_eq!(
            decode_produce_ack(json!({"id": "prod-1"})).unwrap().as_str(),
            "prod-1"
        );
        assert!(matches!(
            decode_produce_ack(json!("error")),
            Err(SignalingError::Rejected { .. })
        ));
        assert!(matches!(
            decode_produce_ack(json!({"unexpected": 1})),
            Err(SignalingError::Codec(_))
        ));
    }

    #[test]
    fn test_consume_ack_variants() {
        assert_eq!(
            decode_consume_ack(json!("cannotConsume")).unwrap(),
            ConsumeAck::CannotConsume
        );
        assert_eq!(
            decode_consume_ack(json!("consumeFailed")).unwrap(),
            ConsumeAck::ConsumeFailed
        );
        let ack = decode_consume_ack(json!({
            "id": "c1",
            "producerId": "p1",
            "kind": "audio",
            "rtpParameters": {}
        }))
        .unwrap();
        match ack {
            ConsumeAck::Params(params) => {
                assert_eq!(params.producer_id.as_str(), "p1");
                assert_eq!(params.kind, MediaKind::Audio);
            }
            other => panic!("unexpected ack: {other:?}"),
        }
    }

    #[test]
    fn test_error_object_ack_is_rejection() {
        let result: Result<ProduceAck, _> =
            decode_ack("startProducing", json!({"error": "quota exceeded"}));
        assert!(matches!(
            result,
            Err(SignalingError::Rejected { reason, .. }) if reason == "quota exceeded"
        ));
    }

    #[test]
    fn test_new_publishers_zips_parallel_arrays() {
        let event = decode_push(
            "newPublishers",
            json!({
                "audioPidsToCreate": ["p1", "p3"],
                "videoPidsToCreate": ["p2", null],
                "associatedUsers": [
                    {"userId": "bob", "displayName": "Bob"},
                    {"userId": "carol", "displayName": "Carol", "isVideoEnabled": false}
                ]
            }),
        )
        .unwrap();

        let PushEvent::NewPublishers(publishers) = event else {
            panic!("expected NewPublishers");
        };
        assert_eq!(publishers.len(), 2);
        assert_eq!(publishers[0].audio_pid.as_str(), "p1");
        assert_eq!(publishers[0].video_pid.as_ref().unwrap().as_str(), "p2");
        assert!(publishers[0].participant.is_video_enabled);
        assert!(publishers[1].video_pid.is_none());
        assert!(!publishers[1].participant.is_video_enabled);
    }

    #[test]
    fn test_new_publishers_rejects_mismatched_arrays() {
        let result = decode_push(
            "newPublishers",
            json!({
                "audioPidsToCreate": ["p1"],
                "videoPidsToCreate": [],
                "associatedUsers": [{"userId": "bob", "displayName": "Bob"}]
            }),
        );
        assert!(matches!(
            result,
            Err(CodecError::MismatchedPublishers {
                audio: 1,
                video: 0,
                users: 1
            })
        ));
    }

    #[test]
    fn test_producer_closed_accepts_both_shapes() {
        assert_eq!(
            decode_push("producerClosed", json!("p1")).unwrap(),
            PushEvent::ProducerClosed("p1".into())
        );
        assert_eq!(
            decode_push("producerClosed", json!({"pid": "p1"})).unwrap(),
            PushEvent::ProducerClosed("p1".into())
        );
    }

    #[test]
    fn test_lifecycle_events() {
        assert_eq!(
            decode_push("disconnect", json!("transport close")).unwrap(),
            PushEvent::Disconnected {
                reason: "transport close".to_string()
            }
        );
        assert_eq!(
            decode_push("reconnectFailed", Value::Null).unwrap(),
            PushEvent::ReconnectFailed
        );
        assert_eq!(
            decode_push("activeSpeakersUpdate", json!(["p3", "p1"])).unwrap(),
            PushEvent::ActiveSpeakersUpdate(vec!["p3".into(), "p1".into()])
        );
    }

    #[test]
    fn test_unknown_event() {
        assert!(matches!(
            decode_push("somethingElse", Value::Null),
            Err(CodecError::UnknownEvent(name)) if name == "somethingElse"
        ));
    }
}

//! Pre-configured test data for media session testing.
//!
//! Provides:
//! - Acknowledgement payloads in wire shape (join, transport, consume)
//! - Announced remote publishers, both typed and as push events

use common::types::ProducerId;
use serde_json::{json, Value};
use signaling_protocol::{decode_push, events, NewPublisher, PushEvent, RemoteParticipant};

/// Router RTP capabilities as advertised by a test server.
#[must_use]
pub fn router_capabilities() -> Value {
    json!({
        "codecs": [
            { "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2 },
            { "kind": "video", "mimeType": "video/VP8", "clockRate": 90000 }
        ],
        "headerExtensions": []
    })
}

/// `join` acknowledgement.
#[must_use]
pub fn join_ack(is_owner: bool) -> Value {
    json!({
        "routerRtpCapabilities": router_capabilities(),
        "isOwner": is_owner,
    })
}

/// `requestTransport` acknowledgement.
#[must_use]
pub fn transport_params(id: &str) -> Value {
    json!({
        "id": id,
        "iceParameters": { "usernameFragment": "frag", "password": "pwd" },
        "iceCandidates": [],
        "dtlsParameters": { "role": "auto", "fingerprints": [] },
    })
}

/// `consumeMedia` acknowledgement for remote producer `pid`.
#[must_use]
pub fn consumer_params(pid: &str, kind: &str) -> Value {
    json!({
        "id": format!("consumer-{pid}"),
        "producerId": pid,
        "kind": kind,
        "rtpParameters": { "codecs": [] },
    })
}

/// A remote participant whose display name is `user_id` capitalized.
#[must_use]
pub fn participant(user_id: &str) -> RemoteParticipant {
    let mut chars = user_id.chars();
    let display_name = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    RemoteParticipant {
        id: user_id.into(),
        display_name,
        is_owner: false,
        is_muted: false,
        is_video_enabled: true,
    }
}

/// One announced publisher.
#[must_use]
pub fn publisher(audio_pid: &str, video_pid: Option<&str>, user_id: &str) -> NewPublisher {
    NewPublisher {
        audio_pid: audio_pid.into(),
        video_pid: video_pid.map(ProducerId::from),
        participant: participant(user_id),
    }
}

/// `newPublishers` payload in wire shape for `(audio pid, video pid, user)`.
#[must_use]
pub fn new_publishers_payload(entries: &[(&str, Option<&str>, &str)]) -> Value {
    let users: Vec<Value> = entries
        .iter()
        .map(|(_, _, user)| {
            let p = participant(user);
            json!({ "userId": p.id, "displayName": p.display_name })
        })
        .collect();
    json!({
        "audioPidsToCreate": entries.iter().map(|(a, _, _)| *a).collect::<Vec<_>>(),
        "videoPidsToCreate": entries.iter().map(|(_, v, _)| *v).collect::<Vec<_>>(),
        "associatedUsers": users,
    })
}

/// `newPublishers` push event, decoded from its wire shape.
///
/// # Panics
///
/// Panics if the payload does not decode.
#[must_use]
pub fn publishers(entries: &[(&str, Option<&str>, &str)]) -> PushEvent {
    decode_push(events::NEW_PUBLISHERS, new_publishers_payload(entries))
        .expect("fixture newPublishers payload must decode")
}

/// `activeSpeakersUpdate` push event.
#[must_use]
pub fn speakers(pids: &[&str]) -> PushEvent {
    PushEvent::ActiveSpeakersUpdate(pids.iter().map(|pid| ProducerId::from(*pid)).collect())
}

/// `producerClosed` push event.
#[must_use]
pub fn producer_closed(pid: &str) -> PushEvent {
    PushEvent::ProducerClosed(pid.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publishers_payload_decodes_in_order() {
        let PushEvent::NewPublishers(list) = publishers(&[("p1", Some("p2"), "bob"), ("p3", None, "carol")])
        else {
            panic!("expected newPublishers");
        };
        assert_eq!(list, vec![publisher("p1", Some("p2"), "bob"), publisher("p3", None, "carol")]);
        assert_eq!(list[0].participant.display_name, "Bob");
    }
}

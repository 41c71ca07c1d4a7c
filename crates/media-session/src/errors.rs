//! Media session error types.
//!
//! Failures fall into two groups. Session-fatal failures (join, send
//! transport connect) surface to the UI as an explicit failure state and the
//! user must retry by hand. Local failures (one producer, one remote
//! sub-stream) are absorbed and logged by the session, leaving everything
//! else intact; they still appear here so the components can report them.

use crate::producer::ProducerKind;
use common::types::ProducerId;
use signaling_protocol::{MediaKind, TransportDirection};
use thiserror::Error;

/// Media session error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Initial handshake or capability negotiation failed.
    #[error("Join failed: {0}")]
    JoinFailure(String),

    /// Transport parameters could not be obtained or the local transport
    /// could not be constructed.
    #[error("{} transport setup failed: {reason}", .direction.as_str())]
    TransportSetupFailure {
        direction: TransportDirection,
        reason: String,
    },

    /// DTLS handshake rejected. Fatal to that transport only.
    #[error("{} transport connect failed: {reason}", .direction.as_str())]
    TransportConnectFailure {
        direction: TransportDirection,
        reason: String,
    },

    /// Server rejected a producer. That kind does not stream.
    #[error("Producing {} failed: {reason}", .kind.description())]
    ProduceFailure { kind: ProducerKind, reason: String },

    /// Server could not supply one remote sub-stream.
    #[error("Consuming {} of {pid} failed: {reason}", .kind.as_str())]
    ConsumeFailure {
        pid: ProducerId,
        kind: MediaKind,
        reason: String,
    },

    /// Camera, microphone or display capture unavailable or denied.
    #[error("Device acquisition failed: {0}")]
    DeviceAcquisitionFailure(String),

    /// Media device not loaded with router capabilities yet.
    #[error("Media device not ready")]
    DeviceNotReady,

    /// Local feed has not been enabled.
    #[error("Local feed not enabled")]
    FeedNotEnabled,

    /// Remote side has not signalled readiness for this participant's media.
    #[error("Remote media not ready")]
    RemoteMediaNotReady,

    /// Operation requires a different session state.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Operation requires an open send transport.
    #[error("Not streaming")]
    NotStreaming,

    /// Operation reserved to the room owner.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The session has ended; a new join needs a new session.
    #[error("Session ended")]
    SessionEnded,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether this failure ends the session attempt (or its ability to stream).
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::JoinFailure(_)
                | SessionError::TransportConnectFailure {
                    direction: TransportDirection::Send,
                    ..
                }
                | SessionError::TransportSetupFailure {
                    direction: TransportDirection::Send,
                    ..
                }
                | SessionError::SessionEnded
        )
    }

    /// Returns a user-facing message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::JoinFailure(_) => "Could not join the room".to_string(),
            SessionError::TransportSetupFailure { .. }
            | SessionError::TransportConnectFailure { .. } => {
                "Could not connect media, please try again".to_string()
            }
            SessionError::ProduceFailure { kind, .. } => {
                format!("Could not share your {}", kind.description())
            }
            SessionError::ConsumeFailure { .. } => {
                "Could not receive a participant's media".to_string()
            }
            SessionError::DeviceAcquisitionFailure(_) => {
                "Camera, microphone or screen is unavailable".to_string()
            }
            SessionError::DeviceNotReady | SessionError::RemoteMediaNotReady => {
                "Media is not ready yet".to_string()
            }
            SessionError::FeedNotEnabled => "Enable your camera or microphone first".to_string(),
            SessionError::NotStreaming => "Start streaming first".to_string(),
            SessionError::InvalidState(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            SessionError::PermissionDenied(msg) => msg.clone(),
            SessionError::SessionEnded => "The call has ended".to_string(),
        }
    }

    /// Bounded label for metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            SessionError::JoinFailure(_) => "join_failure",
            SessionError::TransportSetupFailure { .. } => "transport_setup_failure",
            SessionError::TransportConnectFailure { .. } => "transport_connect_failure",
            SessionError::ProduceFailure { .. } => "produce_failure",
            SessionError::ConsumeFailure { .. } => "consume_failure",
            SessionError::DeviceAcquisitionFailure(_) => "device_acquisition_failure",
            SessionError::DeviceNotReady => "device_not_ready",
            SessionError::FeedNotEnabled => "feed_not_enabled",
            SessionError::RemoteMediaNotReady => "remote_media_not_ready",
            SessionError::InvalidState(_) => "invalid_state",
            SessionError::NotStreaming => "not_streaming",
            SessionError::PermissionDenied(_) => "permission_denied",
            SessionError::SessionEnded => "session_ended",
            SessionError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(SessionError::JoinFailure("rejected".to_string()).is_session_fatal());
        assert!(SessionError::TransportConnectFailure {
            direction: TransportDirection::Send,
            reason: "dtls".to_string(),
        }
        .is_session_fatal());

        // Receive transport failures are scoped to one remote group
        assert!(!SessionError::TransportConnectFailure {
            direction: TransportDirection::Recv,
            reason: "dtls".to_string(),
        }
        .is_session_fatal());
        assert!(!SessionError::ProduceFailure {
            kind: ProducerKind::Video,
            reason: "error".to_string(),
        }
        .is_session_fatal());
        assert!(!SessionError::ConsumeFailure {
            pid: ProducerId::from("p1"),
            kind: MediaKind::Video,
            reason: "cannot consume".to_string(),
        }
        .is_session_fatal());
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = SessionError::JoinFailure("router 10.0.0.7 refused".to_string());
        assert!(!err.client_message().contains("10.0.0.7"));

        let err = SessionError::Internal("channel send failed".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            SessionError::TransportConnectFailure {
                direction: TransportDirection::Recv,
                reason: "timeout".to_string(),
            }
            .to_string(),
            "recv transport connect failed: timeout"
        );
        assert_eq!(
            SessionError::ConsumeFailure {
                pid: ProducerId::from("p2"),
                kind: MediaKind::Video,
                reason: "consumeFailed".to_string(),
            }
            .to_string(),
            "Consuming video of p2 failed: consumeFailed"
        );
        assert_eq!(
            SessionError::ProduceFailure {
                kind: ProducerKind::ScreenVideo,
                reason: "error".to_string(),
            }
            .to_string(),
            "Producing screen video failed: error"
        );
    }
}

//! Signaling request errors.

use crate::codec::CodecError;
use thiserror::Error;

/// Failure of a signaling request.
///
/// Callers treat `Timeout` and `Disconnected` exactly like an explicit
/// rejection; retry and reconnection policy belongs to the channel.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The server answered with a failure acknowledgement.
    #[error("{event} rejected: {reason}")]
    Rejected { event: String, reason: String },

    /// No acknowledgement arrived in time.
    #[error("{event} timed out")]
    Timeout { event: String },

    /// The channel is not connected.
    #[error("Signaling channel disconnected")]
    Disconnected,

    /// The acknowledgement could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl SignalingError {
    /// Build a rejection for `event`.
    pub fn rejected(event: &str, reason: impl Into<String>) -> Self {
        SignalingError::Rejected {
            event: event.to_string(),
            reason: reason.into(),
        }
    }
}

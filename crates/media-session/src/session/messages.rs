//! Message and state types for the media session actor.
//!
//! UI commands arrive over `tokio::sync::mpsc` with a `oneshot` reply.
//! Consume tasks and screen-share watchers report back over a separate
//! internal channel.

use crate::consumer::PublisherGroup;
use crate::errors::SessionError;
use common::types::{ProducerId, RoomId, UserId};
use tokio::sync::oneshot;

/// Lifecycle of one session instance. `Ended` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Joining,
    Joined {
        /// Whether the send transport is up and local media is produced.
        streaming: bool,
    },
    Ended,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Joining => "joining",
            SessionState::Joined { streaming: false } => "joined",
            SessionState::Joined { streaming: true } => "streaming",
            SessionState::Ended => "ended",
        }
    }

    #[must_use]
    pub const fn is_joined(&self) -> bool {
        matches!(self, SessionState::Joined { .. })
    }

    #[must_use]
    pub const fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Joined { streaming: true })
    }
}

/// Read-only session state for presentation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub room_id: Option<RoomId>,
    pub user_id: Option<UserId>,
    pub is_owner: bool,
    /// Local tracks acquired (preview available).
    pub is_stream_enabled: bool,
    /// Local media is being produced.
    pub is_stream_sent: bool,
    pub is_muted: bool,
    pub is_video_enabled: bool,
    pub is_screen_sharing: bool,
    pub pinned_id: Option<ProducerId>,
    /// The server is ready to receive this participant's media.
    pub remote_media_ready: bool,
    pub signaling_connected: bool,
    /// User-facing message of the last failed action.
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_joining(&self) -> bool {
        self.state == SessionState::Joining
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.state.is_joined()
    }
}

/// Session state plus registry contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub snapshot: SessionSnapshot,
    /// Registered publisher group keys, sorted.
    pub publisher_groups: Vec<ProducerId>,
    pub open_producers: usize,
    pub open_consumers: usize,
}

/// Messages sent to `MediaSession`.
#[derive(Debug)]
pub enum SessionMessage {
    /// Join a room. Ignored unless idle.
    Join {
        user_id: String,
        room_id: String,
        mic_enabled: bool,
        video_enabled: bool,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Acquire camera and microphone for preview.
    EnableFeed {
        mic_enabled: bool,
        video_enabled: bool,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Create the send transport and produce local tracks.
    SendFeed {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Flip mute. Replies with the new muted flag.
    MuteAudio {
        respond_to: oneshot::Sender<Result<bool, SessionError>>,
    },

    /// Flip camera. Replies with the new video-enabled flag.
    ToggleVideo {
        respond_to: oneshot::Sender<Result<bool, SessionError>>,
    },

    /// Start or stop sharing the screen. Replies with the new sharing flag.
    ToggleScreenShare {
        respond_to: oneshot::Sender<Result<bool, SessionError>>,
    },

    /// Toggle the pin on a group. Replies with the resulting pin.
    Pin {
        audio_pid: ProducerId,
        respond_to: oneshot::Sender<Option<ProducerId>>,
    },

    Unpin {
        respond_to: oneshot::Sender<()>,
    },

    /// Leave the room and release everything.
    HangUp {
        respond_to: oneshot::Sender<()>,
    },

    /// End the call for every participant (owner only).
    EndCall {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    GetState {
        respond_to: oneshot::Sender<SessionStatus>,
    },
}

/// Reports from tasks spawned by the session.
pub(crate) enum InternalEvent {
    /// A consume cycle finished, successfully or not.
    GroupConsumed(PublisherGroup),
    /// The captured display track ended.
    ScreenShareEnded { generation: u64 },
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    HangUp,
    EndCall,
    /// The owner ended the call for everyone.
    CallEnded,
    /// The signaling channel gave up reconnecting.
    ReconnectFailed,
    /// Cancelled or every handle dropped.
    Shutdown,
}

impl EndReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EndReason::HangUp => "hang_up",
            EndReason::EndCall => "end_call",
            EndReason::CallEnded => "call_ended",
            EndReason::ReconnectFailed => "reconnect_failed",
            EndReason::Shutdown => "shutdown",
        }
    }

    /// Whether the server should hear that this participant is leaving.
    #[must_use]
    pub const fn notifies_server(&self) -> bool {
        matches!(self, EndReason::HangUp | EndReason::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(SessionState::default(), SessionState::Idle);
        assert_eq!(SessionState::Joined { streaming: true }.as_str(), "streaming");
        assert!(SessionState::Joined { streaming: false }.is_joined());
        assert!(!SessionState::Joined { streaming: false }.is_streaming());
        assert!(!SessionState::Ended.is_joined());
    }

    #[test]
    fn test_snapshot_flags() {
        let snapshot = SessionSnapshot {
            state: SessionState::Joining,
            ..SessionSnapshot::default()
        };
        assert!(snapshot.is_joining());
        assert!(!snapshot.is_joined());
    }

    #[test]
    fn test_only_local_departures_notify_server() {
        assert!(EndReason::HangUp.notifies_server());
        assert!(!EndReason::CallEnded.notifies_server());
        assert!(!EndReason::ReconnectFailed.notifies_server());
        assert!(!EndReason::EndCall.notifies_server());
    }
}

//! Media Session Library
//!
//! Client-side orchestration of one participant's membership in a
//! multi-party video call:
//!
//! - Join handshake and media capability negotiation
//! - Send and receive transports with lazy, once-only connect handshakes
//! - Local producers (microphone, camera, screen) with pause/resume
//! - One publisher group per remote participant, consumed concurrently
//! - Assignment of remote streams to a fixed set of display slots driven
//!   by active-speaker ranking and an optional pin
//!
//! # Architecture
//!
//! ```text
//! UI ──► MediaSessionHandle ──mpsc──► MediaSession ◄──mpsc── signaling push events
//!                ▲                        │
//!                └──── watch (state, slots)
//! ```
//!
//! The signaling channel, the media engine and device capture are traits
//! ([`signaling::SignalingTransport`], [`media::MediaEngine`],
//! [`media::MediaCapture`]) supplied by the embedding application.
//!
//! # Modules
//!
//! - [`session`] - Session actor and state machine
//! - [`capability`] - Router capability negotiation gate
//! - [`transport`] - Send/receive transports
//! - [`producer`] - Local producers
//! - [`consumer`] - Remote publisher groups
//! - [`slots`] - Display slot assignment
//! - [`config`] - Session configuration from environment
//! - [`errors`] - Error types

pub mod capability;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod media;
pub mod observability;
pub mod producer;
pub mod session;
pub mod signaling;
pub mod slots;
pub mod transport;

pub use config::SessionConfig;
pub use errors::SessionError;
pub use session::{
    EndReason, MediaSession, MediaSessionHandle, SessionCollaborators, SessionSnapshot,
    SessionState, SessionStatus,
};
pub use slots::{SlotBinding, SlotTable};

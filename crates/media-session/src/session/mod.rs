//! Media session actor.
//!
//! ```text
//! MediaSessionHandle (UI, cloneable)
//! └── MediaSession (one per join)
//!     ├── CapabilityNegotiator
//!     ├── TransportManager
//!     ├── ProducerRegistry (local tracks, send transport)
//!     ├── ConsumerRegistry (publisher groups, receive transports)
//!     │   └── consume task per announced publisher
//!     └── SlotAssigner
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per join**: a fresh `MediaSession` is spawned for every join;
//!   `Ended` is terminal
//! - **Single writer**: every registry and slot mutation happens on the actor
//!   task, so consume completions and push events never race
//! - **Watch channels for presentation**: session state and the slot table are
//!   published over `tokio::sync::watch`
//!
//! # Modules
//!
//! - [`actor`] - `MediaSession` and its handle
//! - [`messages`] - Message and state types

pub mod actor;
pub mod messages;

pub use actor::{MediaSession, MediaSessionHandle, SessionCollaborators};
pub use messages::{EndReason, SessionMessage, SessionSnapshot, SessionState, SessionStatus};

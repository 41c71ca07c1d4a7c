//! Signaling protocol for Dark Tower media sessions.
//!
//! This crate defines the typed request/acknowledgement messages and push
//! events exchanged with the signaling server, and the JSON codec that maps
//! them onto `(event name, payload)` pairs carried by the signaling channel.
//!
//! Transport-library blobs (RTP capabilities, RTP parameters, DTLS and ICE
//! parameters) are carried as opaque JSON: the client forwards them between
//! the server and the local media engine without interpreting them.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod error;
pub mod messages;

pub use codec::{
    check_ack, decode_ack, decode_consume_ack, decode_produce_ack, decode_push, decode_status_ack,
    events, CodecError,
};
pub use error::SignalingError;
pub use messages::*;

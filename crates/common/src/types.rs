//! Common data types for Dark Tower client components.
//!
//! Server-issued identifiers (rooms, producers, consumers, transports) are
//! opaque strings. Identifiers minted locally (tracks, streams) are UUIDs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of a room participants join by name.
    RoomId
);

string_id!(
    /// Identifier of a user joining a room.
    UserId
);

string_id!(
    /// Server-assigned identifier of a media producer.
    ///
    /// A remote participant's audio producer id doubles as the key of their
    /// publisher group for the lifetime of their session.
    ProducerId
);

string_id!(
    /// Server-assigned identifier of a media consumer.
    ConsumerId
);

string_id!(
    /// Server-assigned identifier of a send or receive transport.
    TransportId
);

/// Segment lengths of a generated room code (`abc-defg-hij`).
const ROOM_CODE_SEGMENTS: [usize; 3] = [3, 4, 3];

impl RoomId {
    /// Parse user input into a room id.
    ///
    /// Surrounding whitespace is trimmed; empty input yields `None`.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Generate a fresh room code of the form `abc-defg-hij`.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let segments: Vec<String> = ROOM_CODE_SEGMENTS
            .iter()
            .map(|&len| {
                (0..len)
                    .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                    .collect()
            })
            .collect();
        Self(segments.join("-"))
    }
}

impl UserId {
    /// Parse user input into a user id, trimming whitespace.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }
}

/// Locally minted identifier of a captured or received media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Create a new random track ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locally minted identifier of a combined playable stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub Uuid);

impl StreamId {
    /// Create a new random stream ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

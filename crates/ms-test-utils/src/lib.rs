//! # MS Test Utilities
//!
//! Shared test utilities for the media session.
//!
//! This crate provides mock implementations of the session's external
//! collaborators and test fixtures, so session flows run without a
//! signaling server, a media library or capture devices.
//!
//! ## Modules
//!
//! - `mock_signaling` - Scripted signaling channel that records every request
//! - `mock_media` - In-memory media engine and capture devices
//! - `fixtures` - Wire payloads and announced publishers
//! - `harness` - A spawned session wired to all of the above
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ms_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = SessionHarness::start();
//!     harness.join_and_stream("alice", "abc-1234-xyz").await;
//!
//!     harness.push(publishers(&[("p1", Some("p2"), "bob")])).await;
//!     harness.wait_for_groups(1).await;
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_media;
pub mod mock_signaling;

// Re-export commonly used items
pub use fixtures::*;
pub use harness::*;
pub use mock_media::*;
pub use mock_signaling::*;

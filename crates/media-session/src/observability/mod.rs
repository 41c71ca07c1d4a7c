//! Observability module for the media session.
//!
//! # Privacy by Default
//!
//! Handlers use `#[instrument(skip_all)]` with an explicit field allow-list
//! (room id, producer ids, kinds, directions). Display names never reach
//! logs or metric labels, and every label is a bounded enum.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `ms_session_joins_total` | Counter | `outcome` | Join attempts |
//! | `ms_join_duration_seconds` | Histogram | none | Join handshake plus capability load |
//! | `ms_transport_connects_total` | Counter | `direction`, `outcome` | DTLS connect handshakes |
//! | `ms_producers_created_total` | Counter | `kind`, `outcome` | Local producers |
//! | `ms_consumers_created_total` | Counter | `kind`, `outcome` | Remote sub-stream consumers |
//! | `ms_publisher_groups_active` | Gauge | none | Registered remote publisher groups |
//! | `ms_sessions_ended_total` | Counter | `reason` | Session teardowns |
//!
//! No recorder is installed here; the embedding application owns that.

pub mod metrics;

pub use metrics::{
    record_consumer_created, record_join, record_producer_created, record_session_ended,
    record_transport_connect, set_publisher_groups_active,
};

//! Common utilities and types shared across the Dark Tower client crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for tracing subscriber setup
pub mod observability;

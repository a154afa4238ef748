//! Async client for Azuracast now-playing metadata.
//!
//! Three pieces, wired together by explicit construction rather than
//! globals:
//!
//! - [`resolver::ConfigResolver`] resolves the station roster from an
//!   ordered list of config sources and caches the last good result.
//! - [`connection::MetadataConnection`] owns the WebSocket to the
//!   now-playing feed, including the liveness watchdog.
//! - [`coordinator::MetadataCoordinator`] merges the live feed with the
//!   resolver fallback into one unified now-playing value for the UI.

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod resolver;

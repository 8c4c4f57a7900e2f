//! Unofficial UniFi Protect client core.
//!
//! This crate owns the state-synchronization engine for a UniFi Protect
//! NVR: authenticating an HTTP session, fetching the bootstrap device
//! graph, decoding the binary WebSocket update stream, applying diffs to
//! the in-memory graph, deriving higher-level events, and routing local
//! mutations back through the API while suppressing their own echoes.
//!
//! It does not expose a CLI, media download helpers beyond raw bytes, or
//! any persistence beyond the in-memory graph for the lifetime of a
//! [`client::ProtectClient`].

pub mod client;
pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod http;
pub mod model;
pub mod mutation;
pub mod subscribe;
pub mod time;
pub mod ws;

pub use client::ProtectClient;
pub use config::ClientConfig;
pub use error::ProtectError;
pub use model::bootstrap::Bootstrap;

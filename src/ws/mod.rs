//! The binary update-stream protocol: frame decoding and the session
//! state machine that keeps it connected.

pub mod frame;
pub mod session;

pub use session::WsSession;

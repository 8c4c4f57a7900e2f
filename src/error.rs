//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the core returns [`ProtectError`]. The
//! variants map directly onto the error kinds the diff/session/mutation
//! layers distinguish between for retry and surfacing decisions; see the
//! module docs on [`crate::http::session`] and [`crate::ws::session`] for
//! which variants trigger a retry versus a state transition.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtectError {
    /// Login rejected, or a second 401 after a re-auth attempt.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// 403 on an otherwise well-formed request.
    #[error("permission denied: {0}")]
    Permission(String),

    /// 404 on a specific device or resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// 4xx with a body the controller wants surfaced verbatim.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Connect/DNS/TLS failure, or a transport-level reqwest error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed WebSocket frame or unrecognized action/model-key.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// WebSocket closed unexpectedly (triggers reconnect, not a caller-visible failure
    /// unless reconnection itself is exhausted).
    #[error("stream error: {0}")]
    Stream(String),

    /// Operation invalid for the client's current session state.
    #[error("invalid state: {0}")]
    State(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Operation was cancelled via a client-wide cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ProtectError>;

impl ProtectError {
    /// Idempotent GETs retry on these; mutating requests never do (see
    /// [`crate::http::session::HttpSession`]).
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtectError::Transport(_) => true,
            ProtectError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

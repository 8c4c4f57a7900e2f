//! The session state machine: login, bootstrap fetch,
//! WebSocket connect, packet apply loop, and reconnection with backoff.
//!
//! The TLS connector is built per-connect from the session's
//! verify-SSL setting, and the upgrade request carries the session's
//! cookie jar by hand since `reqwest`'s jar never sees a raw WebSocket
//! upgrade.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, Connector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::diff::{DiffEngine, DivergenceSignal};
use crate::error::{ProtectError, Result};
use crate::http::HttpSession;
use crate::model::{Bootstrap, ModelKey};
use crate::subscribe::{Hub, Notification, NotificationAction, SessionState};
use crate::ws::frame;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);
const JITTER_FRACTION: f64 = 0.2;
const BOOTSTRAP_PATH: &str = "/api/bootstrap";

/// Exponential backoff with ±20% jitter, base 1s, cap 60s.
fn backoff_delay(attempt: u32) -> Duration {
    let scaled = BACKOFF_BASE.as_secs_f64() * 2f64.powi(attempt as i32);
    let capped = scaled.min(BACKOFF_CAP.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
    Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
}

/// Drives one client's connection lifecycle end to end. One instance per
/// [`crate::client::ProtectClient`], spawned as the sole reader task so a
/// single writer owns the WebSocket and bootstrap mutation.
pub struct WsSession {
    http: Arc<HttpSession>,
    diff_engine: Arc<DiffEngine>,
    hub: Arc<Hub>,
    bootstrap: Arc<RwLock<Bootstrap>>,
    cancel: CancellationToken,
}

/// Why the read loop ended, and what the outer loop should do about it.
enum ConnectionOutcome {
    ClosedByUser,
    /// The WebSocket upgrade itself was rejected as unauthorized; redo
    /// the full login rather than just backing off and retrying.
    NeedsReauth,
    /// The diff engine signalled unrecoverable divergence.
    NeedsRebootstrap,
    /// Closed frame, transport error, or decode error: reconnect with backoff.
    Disconnected,
}

impl WsSession {
    pub fn new(
        http: Arc<HttpSession>,
        diff_engine: Arc<DiffEngine>,
        hub: Arc<Hub>,
        bootstrap: Arc<RwLock<Bootstrap>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            http,
            diff_engine,
            hub,
            bootstrap,
            cancel,
        }
    }

    /// Runs the state machine until cancelled or a terminal failure.
    pub async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                self.hub.publish_state(SessionState::Closed);
                return;
            }

            self.hub.publish_state(SessionState::Authenticating);
            if let Err(e) = self.http.login().await {
                error!(error = %e, "login failed; session entering failed state");
                self.hub.publish_state(SessionState::Failed);
                return;
            }

            self.hub.publish_state(SessionState::Bootstrapping);
            if let Err(e) = self.load_bootstrap().await {
                error!(error = %e, "bootstrap fetch failed; session entering failed state");
                self.hub.publish_state(SessionState::Failed);
                return;
            }

            self.hub.publish_state(SessionState::Connecting);
            match self.connect_and_read().await {
                ConnectionOutcome::ClosedByUser => {
                    self.hub.publish_state(SessionState::Closed);
                    return;
                }
                ConnectionOutcome::NeedsReauth => {
                    warn!("websocket upgrade unauthorized; re-authenticating");
                    attempt = 0;
                    continue;
                }
                ConnectionOutcome::NeedsRebootstrap => {
                    info!("stream divergence detected; forcing full re-bootstrap");
                    self.hub.publish_message(&reset_notification());
                    attempt = 0;
                    continue;
                }
                ConnectionOutcome::Disconnected => {
                    self.hub.publish_state(SessionState::Reconnecting);
                    let delay = backoff_delay(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            self.hub.publish_state(SessionState::Closed);
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt = attempt.saturating_add(1);
                    continue;
                }
            }
        }
    }

    /// `bootstrapping` state: `GET /api/bootstrap`, parse, and replace the
    /// graph wholesale under the write lock. Also called directly by
    /// [`crate::client::ProtectClient::refresh`].
    pub(crate) async fn load_bootstrap(&self) -> Result<()> {
        let bytes = self.http.get_bytes(BOOTSTRAP_PATH).await?;
        let parsed = Bootstrap::parse(&bytes)
            .map_err(|e| ProtectError::Protocol(format!("bootstrap parse failed: {e}")))?;
        parsed.check_referential_consistency();
        let mut bs = self.bootstrap.write().await;
        *bs = parsed;
        Ok(())
    }

    /// `connecting`/`connected` states: opens the WebSocket against the
    /// controller's last known checkpoint and reads until disconnected.
    async fn connect_and_read(self: &Arc<Self>) -> ConnectionOutcome {
        let last_update_id = self.bootstrap.read().await.last_update_id.clone();
        let ws_url = format!(
            "{}/api/ws/updates?lastUpdateId={}",
            self.http.config().ws_base_url(),
            last_update_id
        );

        let mut request = match ws_url.into_client_request() {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "failed to build websocket upgrade request");
                return ConnectionOutcome::Disconnected;
            }
        };

        if let Some(cookie_header) = self.http.cookie_header() {
            if !cookie_header.is_empty() {
                match HeaderValue::from_str(&cookie_header) {
                    Ok(value) => {
                        request.headers_mut().insert("Cookie", value);
                    }
                    Err(e) => warn!(error = %e, "cookie header not a valid header value"),
                }
            }
        }

        let tls_connector = match native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(!self.http.config().verify_ssl)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to build tls connector");
                return ConnectionOutcome::Disconnected;
            }
        };

        let connect_result = connect_async_tls_with_config(
            request,
            None,
            false,
            Some(Connector::NativeTls(tls_connector)),
        )
        .await;

        let (ws_stream, response) = match connect_result {
            Ok(pair) => pair,
            Err(tokio_tungstenite::tungstenite::Error::Http(resp)) => {
                if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                    return ConnectionOutcome::NeedsReauth;
                }
                warn!(status = %resp.status(), "websocket upgrade rejected");
                return ConnectionOutcome::Disconnected;
            }
            Err(e) => {
                warn!(error = %e, "websocket connect failed");
                return ConnectionOutcome::Disconnected;
            }
        };
        debug!(status = ?response.status(), "websocket upgraded");

        self.hub.publish_state(SessionState::Connected);
        info!("protect websocket connected");

        let (_write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return ConnectionOutcome::ClosedByUser;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            if let Some(outcome) = self.handle_binary(&data).await {
                                return outcome;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "websocket closed by controller");
                            return ConnectionOutcome::Disconnected;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "websocket read error");
                            return ConnectionOutcome::Disconnected;
                        }
                        None => {
                            debug!("websocket stream ended");
                            return ConnectionOutcome::Disconnected;
                        }
                    }
                }
            }
        }
    }

    /// Decodes and applies every packet in one WebSocket message (the
    /// controller may batch several back to back). Returns `Some` to end
    /// the read loop, `None` to keep reading.
    async fn handle_binary(self: &Arc<Self>, data: &[u8]) -> Option<ConnectionOutcome> {
        let mut offset = 0usize;
        while offset < data.len() {
            let (packet, consumed) = match frame::decode_packet(&data[offset..]) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "dropping malformed packet");
                    return None;
                }
            };
            offset += consumed;

            match self.diff_engine.apply_packet(&self.bootstrap, packet).await {
                Ok(DivergenceSignal::Ok) => {}
                Ok(DivergenceSignal::FullRebootstrapRequired) => {
                    return Some(ConnectionOutcome::NeedsRebootstrap);
                }
                Err(e) => {
                    warn!(error = %e, "failed to apply packet; continuing stream");
                }
            }
        }
        None
    }
}

/// The synthetic notification emitted before a full re-bootstrap
/// replaces the graph.
fn reset_notification() -> Notification {
    Notification {
        action: NotificationAction::Reset,
        model_key: ModelKey::Unknown("reset".to_string()),
        id: String::new(),
        changed_fields: Default::default(),
        raw_packet: Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_starts_near_base_and_caps_with_jitter() {
        let d0 = backoff_delay(0);
        assert!(d0.as_secs_f64() >= 0.8 && d0.as_secs_f64() <= 1.2);

        let d_large = backoff_delay(20);
        assert!(d_large.as_secs_f64() <= BACKOFF_CAP.as_secs_f64() * 1.2);
    }
}

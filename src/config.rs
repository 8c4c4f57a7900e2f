//! Client configuration.
//!
//! A plain struct built either programmatically or from the environment
//! variables name. No module-level state: every suspending
//! operation takes (or is constructed from) a `ClientConfig`, never a
//! global.

use std::time::Duration;

/// How the client authenticates to the controller.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Local admin username/password, cookie + CSRF based (the private API).
    Password { username: String, password: String },
    /// Long-lived API key (the `/proxy/protect/integration/v1/` public API).
    ApiKey(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
    pub verify_ssl: bool,

    /// Speaks plain HTTP/WS instead of HTTPS/WSS. Every real controller is
    /// HTTPS-only with a self-signed cert; this exists solely so tests can
    /// point the client at a local mock server without TLS.
    pub insecure_http: bool,

    /// TTL of the echo-suppression ignore table entries. An inferred
    /// value; 2s is the default, configurable.
    pub echo_ignore_ttl: Duration,

    /// Heuristic reset duration for `ring` events missing an end-time
    /// packet. Default 3s.
    pub ring_reset_timeout: Duration,

    /// Connect timeout for HTTP requests.
    pub connect_timeout: Duration,

    /// Number of inconsistent `remove`-of-unknown-id packets within the
    /// divergence window before a full re-bootstrap is triggered.
    pub divergence_threshold: u32,

    /// Window within which divergence_threshold is counted.
    pub divergence_window: Duration,

    /// Slow-subscriber drop threshold for the state channel.
    pub state_channel_backlog_limit: usize,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 443,
            credentials: Credentials::Password {
                username: username.into(),
                password: password.into(),
            },
            verify_ssl: true,
            insecure_http: false,
            echo_ignore_ttl: Duration::from_secs(2),
            ring_reset_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(30),
            divergence_threshold: 3,
            divergence_window: Duration::from_secs(60),
            state_channel_backlog_limit: 100,
        }
    }

    pub fn with_api_key(host: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 443,
            credentials: Credentials::ApiKey(api_key.into()),
            verify_ssl: true,
            insecure_http: false,
            echo_ignore_ttl: Duration::from_secs(2),
            ring_reset_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(30),
            divergence_threshold: 3,
            divergence_window: Duration::from_secs(60),
            state_channel_backlog_limit: 100,
        }
    }

    /// Build from `UFP_*` environment variables. `UFP_API_KEY`, if set,
    /// takes precedence over username/password.
    pub fn from_env() -> Result<Self, crate::error::ProtectError> {
        let host = std::env::var("UFP_ADDRESS")
            .map_err(|_| crate::error::ProtectError::State("UFP_ADDRESS not set".into()))?;
        let port: u16 = std::env::var("UFP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(443);
        let verify_ssl = std::env::var("UFP_SSL_VERIFY")
            .ok()
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let mut config = if let Ok(api_key) = std::env::var("UFP_API_KEY") {
            Self::with_api_key(host, api_key)
        } else {
            let username = std::env::var("UFP_USERNAME")
                .map_err(|_| crate::error::ProtectError::State("UFP_USERNAME not set".into()))?;
            let password = std::env::var("UFP_PASSWORD")
                .map_err(|_| crate::error::ProtectError::State("UFP_PASSWORD not set".into()))?;
            Self::new(host, username, password)
        };

        config.port = port;
        config.verify_ssl = verify_ssl;
        Ok(config)
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.insecure_http { "http" } else { "https" };
        if self.port == 443 {
            format!("{scheme}://{}", self.host)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }

    pub fn ws_base_url(&self) -> String {
        let scheme = if self.insecure_http { "ws" } else { "wss" };
        if self.port == 443 {
            format!("{scheme}://{}", self.host)
        } else {
            format!("{scheme}://{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_base_url() {
        let config = ClientConfig::new("192.168.1.1", "admin", "password");
        assert_eq!(config.base_url(), "https://192.168.1.1");
        assert_eq!(config.ws_base_url(), "wss://192.168.1.1");
    }

    #[test]
    fn nonstandard_port_base_url() {
        let mut config = ClientConfig::new("10.0.0.1", "admin", "password");
        config.port = 8443;
        assert_eq!(config.base_url(), "https://10.0.0.1:8443");
    }

    #[test]
    fn insecure_http_swaps_both_schemes() {
        let mut config = ClientConfig::new("127.0.0.1", "admin", "password");
        config.port = 8080;
        config.insecure_http = true;
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
        assert_eq!(config.ws_base_url(), "ws://127.0.0.1:8080");
    }
}

//! Cookie/CSRF-based login flow and the API-key alternative.
//!
//! Cookie-jar-backed `reqwest::Client`, CSRF-token-from-header
//! extraction with a cookie fallback, and API-key auth as an alternative
//! to username/password.

use std::sync::{Arc, Mutex};

use reqwest::cookie::Jar;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::{ClientConfig, Credentials};
use crate::error::{ProtectError, Result};

const CSRF_HEADER: &str = "x-csrf-token";
const CSRF_COOKIE: &str = "csrf_token";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(rename = "rememberMe")]
    remember_me: bool,
}

/// Cookie jar + CSRF token, refreshed as a unit under one mutex: auth
/// refresh takes that mutex exclusively.
struct AuthState {
    csrf_token: String,
}

pub struct HttpSession {
    client: Client,
    cookie_jar: Arc<Jar>,
    config: ClientConfig,
    auth: Mutex<AuthState>,
}

impl HttpSession {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .danger_accept_invalid_certs(!config.verify_ssl)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            cookie_jar: jar,
            config,
            auth: Mutex::new(AuthState {
                csrf_token: String::new(),
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.cookie_jar
    }

    fn csrf_token(&self) -> String {
        self.auth.lock().unwrap().csrf_token.clone()
    }

    /// Step 1 of the auth flow. A no-op for API-key auth,
    /// which authenticates per-request via a header instead.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<()> {
        let Credentials::Password { username, password } = &self.config.credentials else {
            return Ok(());
        };

        let login_url = format!("{}/api/auth/login", self.config.base_url());
        let body = LoginRequest {
            username,
            password,
            remember_me: true,
        };

        let resp = self
            .client
            .post(&login_url)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ProtectError::Auth(format!("login failed ({status}): {text}")));
        }

        let token = resp
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| self.csrf_from_cookie())
            .unwrap_or_default();

        debug!(has_token = !token.is_empty(), "login succeeded");
        self.auth.lock().unwrap().csrf_token = token;
        info!("authenticated with controller");
        Ok(())
    }

    fn csrf_from_cookie(&self) -> Option<String> {
        let url = url::Url::parse(&self.config.base_url()).ok()?;
        let header = self.cookie_jar.cookies(&url)?;
        let header = header.to_str().ok()?.to_string();
        header.split("; ").find_map(|kv| {
            let (name, value) = kv.split_once('=')?;
            (name == CSRF_COOKIE).then(|| value.to_string())
        })
    }

    /// The `Cookie:` header value for the current session, for the
    /// WebSocket upgrade request (which reqwest's cookie jar never sees).
    pub fn cookie_header(&self) -> Option<String> {
        let url = url::Url::parse(&self.config.base_url()).ok()?;
        let header = self.cookie_jar.cookies(&url)?;
        header.to_str().ok().map(str::to_string)
    }

    /// Applies the appropriate auth header for the current credential
    /// mode before a request is sent.
    pub fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credentials {
            Credentials::Password { .. } => builder.header(CSRF_HEADER, self.csrf_token()),
            Credentials::ApiKey(key) => builder.header("X-API-KEY", key),
        }
    }

    /// Step 3: on 401, re-run login once, then fail.
    pub async fn reauth_once(&self) -> Result<()> {
        self.login().await
    }

    pub fn is_unauthorized(status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn api_key_sessions_skip_login_header_round_trip() {
        let config = ClientConfig::with_api_key("10.0.0.1", "secret-key");
        let session = HttpSession::new(config).unwrap();
        assert_eq!(session.csrf_token(), "");
    }

    fn config_for(server: &MockServer) -> ClientConfig {
        let mut config = ClientConfig::new(server.address().ip().to_string(), "admin", "password");
        config.port = server.address().port();
        config.insecure_http = true;
        config
    }

    #[tokio::test]
    async fn login_extracts_csrf_token_from_response_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-csrf-token", "tok-123"))
            .mount(&server)
            .await;

        let session = HttpSession::new(config_for(&server)).unwrap();
        session.login().await.unwrap();
        assert_eq!(session.csrf_token(), "tok-123");
    }

    #[tokio::test]
    async fn login_failure_status_surfaces_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let session = HttpSession::new(config_for(&server)).unwrap();
        let err = session.login().await.unwrap_err();
        assert!(matches!(err, ProtectError::Auth(_)));
    }
}

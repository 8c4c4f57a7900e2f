//! Request framing and retry policy on top of [`super::auth::HttpSession`]
//! idempotent GETs retry with backoff, mutating requests
//! never retry automatically, and every non-2xx response maps onto the
//! error taxonomy.

use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use super::auth::HttpSession;
use crate::error::{ProtectError, Result};

const MAX_RETRIES: u32 = 5;
const RETRY_BASE: Duration = Duration::from_millis(500);
const RETRY_CAP: Duration = Duration::from_secs(30);

fn backoff_delay(attempt: u32) -> Duration {
    let scaled = RETRY_BASE.as_secs_f64() * 2f64.powi(attempt as i32);
    Duration::from_secs_f64(scaled.min(RETRY_CAP.as_secs_f64()))
}

impl HttpSession {
    /// Idempotent GET with exponential backoff on 5xx/transport errors
    /// (base 0.5s, cap 30s, max 5 attempts) and a single 401 re-auth.
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.config().base_url(), path);
        let mut attempt = 0u32;
        let mut reauthed = false;

        loop {
            let request = self.apply_auth(self.client().get(&url));
            match request.send().await {
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED && !reauthed => {
                    reauthed = true;
                    self.reauth_once().await?;
                }
                Ok(resp) if resp.status().is_server_error() && attempt < MAX_RETRIES => {
                    warn!(path, status = %resp.status(), attempt, "retrying GET after server error");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Ok(resp) => return map_status(resp).await,
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(path, error = %e, attempt, "retrying GET after transport error");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(ProtectError::Transport(e.to_string())),
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.get(path).await?;
        Ok(resp.json().await?)
    }

    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self.get(path).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Mutating request — never retried automatically; the caller
    /// receives the error and decides whether to retry.
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Response> {
        let url = format!("{}{}", self.config().base_url(), path);
        let resp = self
            .apply_auth(self.client().patch(&url))
            .json(body)
            .send()
            .await?;
        map_status(resp).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Response> {
        let url = format!("{}{}", self.config().base_url(), path);
        let resp = self
            .apply_auth(self.client().post(&url))
            .json(body)
            .send()
            .await?;
        map_status(resp).await
    }
}

async fn map_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status {
        StatusCode::UNAUTHORIZED => {
            let body = resp.text().await.unwrap_or_default();
            Err(ProtectError::Auth(body))
        }
        StatusCode::FORBIDDEN => {
            let body = resp.text().await.unwrap_or_default();
            Err(ProtectError::Permission(body))
        }
        StatusCode::NOT_FOUND => {
            let body = resp.text().await.unwrap_or_default();
            Err(ProtectError::NotFound(body))
        }
        s if s.is_client_error() => {
            let body = resp.text().await.unwrap_or_default();
            Err(ProtectError::BadRequest(format!("{s}: {body}")))
        }
        s => {
            let body = resp.text().await.unwrap_or_default();
            Err(ProtectError::Transport(format!("{s}: {body}")))
        }
    }
}

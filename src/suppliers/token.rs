//! OAuth2 client-credentials token lifecycle for one supplier.
//!
//! One cached token per manager. A token is considered expired
//! `REFRESH_BUFFER_SECS` before the supplier would actually reject it, so
//! renewal happens proactively. Failed or malformed token responses leave
//! nothing cached (fail-closed).

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::SupplierError;
use crate::suppliers::config::SupplierConfig;

/// Renew this many seconds before the supplier-declared expiry.
const REFRESH_BUFFER_SECS: u64 = 300;
/// Token endpoint timeout; short because the grant is a tiny exchange.
const TOKEN_TIMEOUT_SECS: u64 = 10;
/// Floor for the cached lifetime so a short-lived grant is still usable once.
const MIN_CACHE_SECS: u64 = 30;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid_at(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

pub struct TokenManager {
    supplier_code: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    http: Client,
    // Async mutex so a parallelized orchestrator still gets single-flight refresh.
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl TokenManager {
    pub fn new(cfg: &SupplierConfig) -> Result<Self, SupplierError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .build()
            .map_err(|e| SupplierError::Authentication(format!("http client: {e}")))?;
        Ok(Self {
            supplier_code: cfg.code.clone(),
            token_url: cfg.token_url.clone(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            http,
            cached: Arc::new(Mutex::new(None)),
        })
    }

    /// Return the cached token, re-authenticating first if it is missing or
    /// inside the refresh buffer.
    pub async fn get_access_token(&self) -> Result<String, SupplierError> {
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.is_valid_at(Instant::now()) {
                return Ok(token.access_token.clone());
            }
            debug!(supplier = %self.supplier_code, "cached token inside refresh buffer; renewing");
        }
        let token = self.request_access_token().await?;
        let access = token.access_token.clone();
        *guard = Some(token);
        Ok(access)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        let mut guard = self.cached.lock().await;
        *guard = None;
    }

    async fn request_access_token(&self) -> Result<CachedToken, SupplierError> {
        let (client_id, client_secret) = match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
            _ => {
                return Err(SupplierError::Authentication(format!(
                    "{}: credentials not configured (live integration disabled?)",
                    self.supplier_code
                )))
            }
        };

        let issued_at = Instant::now();
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| {
                SupplierError::Authentication(format!("{}: token request: {e}", self.supplier_code))
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(supplier = %self.supplier_code, status = status.as_u16(), "token request rejected");
            return Err(SupplierError::Authentication(format!(
                "{}: token request failed (status={}): {}",
                self.supplier_code, status, body
            )));
        }

        let (access_token, expires_in) = parse_token_response(&body).map_err(|msg| {
            SupplierError::Authentication(format!("{}: {msg}", self.supplier_code))
        })?;

        let ttl = expires_in.saturating_sub(REFRESH_BUFFER_SECS).max(MIN_CACHE_SECS);
        debug!(supplier = %self.supplier_code, expires_in, cached_secs = ttl, "token acquired");
        Ok(CachedToken {
            access_token,
            expires_at: issued_at + Duration::from_secs(ttl),
        })
    }
}

/// Extract `access_token` and `expires_in` from a token response body.
///
/// Suppliers have been observed returning the grant either as a JSON object
/// or as a JSON string whose contents are the JSON-encoded object; both
/// forms are accepted. `expires_in` may arrive as a number or a numeric
/// string.
fn parse_token_response(body: &str) -> Result<(String, u64), String> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| format!("token response is not JSON: {e}"))?;

    let object = match value {
        Value::String(inner) => serde_json::from_str::<Value>(&inner)
            .map_err(|e| format!("string-encoded token response is not JSON: {e}"))?,
        other => other,
    };

    let access_token = object
        .get("access_token")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or("token response missing access_token")?
        .to_string();

    let expires_in = match object.get("expires_in") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or("token response missing expires_in")?;

    Ok((access_token, expires_in))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_form() {
        let body = r#"{"access_token":"abc123","expires_in":3600,"token_type":"Bearer"}"#;
        let (token, expires) = parse_token_response(body).unwrap();
        assert_eq!(token, "abc123");
        assert_eq!(expires, 3600);
    }

    #[test]
    fn parses_string_encoded_form() {
        let body = r#""{\"access_token\":\"abc123\",\"expires_in\":\"1800\"}""#;
        let (token, expires) = parse_token_response(body).unwrap();
        assert_eq!(token, "abc123");
        assert_eq!(expires, 1800);
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_token_response(r#"{"token_type":"Bearer"}"#).is_err());
        assert!(parse_token_response(r#"{"access_token":"abc"}"#).is_err());
        assert!(parse_token_response(r#"{"access_token":"","expires_in":60}"#).is_err());
        assert!(parse_token_response("not json").is_err());
    }

    #[test]
    fn expiry_honours_refresh_buffer() {
        let issued = Instant::now();
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: issued + Duration::from_secs(3600 - REFRESH_BUFFER_SECS),
        };
        assert!(token.is_valid_at(issued));
        assert!(token.is_valid_at(issued + Duration::from_secs(3000)));
        assert!(!token.is_valid_at(issued + Duration::from_secs(3600 - REFRESH_BUFFER_SECS)));
    }

    #[tokio::test]
    async fn missing_credentials_fail_closed() {
        std::env::set_var("OFFLINE9_API_URL", "https://api.test");
        std::env::set_var("OFFLINE9_TOKEN_URL", "https://auth.test/token");
        let cfg = crate::suppliers::config::SupplierConfig::from_env("OFFLINE9").unwrap();
        let manager = TokenManager::new(&cfg).unwrap();
        let err = manager.get_access_token().await.unwrap_err();
        assert!(matches!(err, SupplierError::Authentication(_)));
        // fail-closed: nothing cached after the failure
        assert!(manager.cached.lock().await.is_none());
    }
}

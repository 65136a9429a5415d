//! Authenticated HTTP client for one supplier.
//!
//! Wraps [`TokenManager`] to attach the bearer header and JSON content
//! negotiation. On 401/403 the cached token is invalidated, one forced
//! re-authentication happens, and the call is retried exactly once. Some
//! suppliers return business errors inside success-shaped HTTP 200 bodies
//! (`errorCode != 0`); those are surfaced as typed API errors.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SupplierError;
use crate::suppliers::config::SupplierConfig;
use crate::suppliers::token::TokenManager;

/// Catalog payloads can be large; allow more headroom than the token call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut cut = max_len;
        while cut > 0 && !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push('…');
    }
    s
}

pub struct SupplierClient {
    supplier_code: String,
    api_base: String,
    http: Client,
    tokens: TokenManager,
}

impl SupplierClient {
    pub fn new(cfg: &SupplierConfig) -> Result<Self, SupplierError> {
        let http = Client::builder()
            .user_agent("vas-catalog-sync/1.0")
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SupplierError::Authentication(format!("http client: {e}")))?;
        Ok(Self {
            supplier_code: cfg.code.clone(),
            api_base: cfg.api_url.clone(),
            http,
            tokens: TokenManager::new(cfg)?,
        })
    }

    pub fn supplier_code(&self) -> &str {
        &self.supplier_code
    }

    pub async fn get(&self, path: &str) -> Result<Value, SupplierError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, SupplierError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Issue one authenticated JSON request.
    ///
    /// 401/403 triggers exactly one invalidate + re-auth + retry; a second
    /// failure surfaces as `RequestFailed` with that response's status and
    /// body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, SupplierError> {
        let url = format!("{}/{}", self.api_base, path.trim_start_matches('/'));

        let mut response = self.send_once(&method, &url, body).await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            warn!(
                supplier = %self.supplier_code,
                status = response.status().as_u16(),
                url = %url,
                "authorization rejected; re-authenticating and retrying once"
            );
            self.tokens.invalidate().await;
            response = self.send_once(&method, &url, body).await?;
        }

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SupplierError::RequestFailed {
                status: status.as_u16(),
                body: truncate_for_log(text, 2000),
            });
        }

        let value: Value = serde_json::from_str(&text).map_err(|e| SupplierError::RequestFailed {
            status: status.as_u16(),
            body: format!("invalid JSON body ({e}): {}", truncate_for_log(text, 500)),
        })?;

        if let Some(err) = extract_api_error(&value) {
            return Err(err);
        }

        debug!(supplier = %self.supplier_code, url = %url, "request ok");
        Ok(value)
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, SupplierError> {
        let token = self.tokens.get_access_token().await?;
        let mut req = self
            .http
            .request(method.clone(), url)
            .header("Accept", "application/json")
            .bearer_auth(token);
        if let Some(json) = body {
            req = req.json(json);
        }
        Ok(req.send().await?)
    }
}

/// Detect the supplier's embedded error envelope in a 200-status body.
///
/// Convention observed across integrations: `errorCode` (number or numeric
/// string) is non-zero when the business call failed, with the text under
/// `errorMessage` or `message`.
fn extract_api_error(body: &Value) -> Option<SupplierError> {
    let code = match body.get("errorCode") {
        Some(Value::Number(n)) => n.as_i64()?,
        Some(Value::String(s)) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    if code == 0 {
        return None;
    }
    let message = body
        .get("errorMessage")
        .or_else(|| body.get("message"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown supplier error")
        .to_string();
    Some(SupplierError::Api { code, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zero_error_code_is_success() {
        let body = json!({"errorCode": 0, "products": []});
        assert!(extract_api_error(&body).is_none());
    }

    #[test]
    fn nonzero_error_code_becomes_api_error() {
        let body = json!({"errorCode": 17, "errorMessage": "product unavailable"});
        match extract_api_error(&body) {
            Some(SupplierError::Api { code, message }) => {
                assert_eq!(code, 17);
                assert_eq!(message, "product unavailable");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn string_error_code_is_accepted() {
        let body = json!({"errorCode": "5", "message": "maintenance"});
        match extract_api_error(&body) {
            Some(SupplierError::Api { code, message }) => {
                assert_eq!(code, 5);
                assert_eq!(message, "maintenance");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn bodies_without_envelope_pass_through() {
        assert!(extract_api_error(&json!([1, 2, 3])).is_none());
        assert!(extract_api_error(&json!({"products": []})).is_none());
    }

    #[test]
    fn truncates_long_bodies_for_logging() {
        let s = "x".repeat(5000);
        let out = truncate_for_log(s, 2000);
        assert!(out.len() <= 2000 + '…'.len_utf8());
        assert!(out.ends_with('…'));
    }

    #[test]
    fn truncation_backs_off_to_a_char_boundary() {
        // 2-byte chars; a cut at 2001 lands mid-char.
        let s = "é".repeat(2000);
        let out = truncate_for_log(s, 2001);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().filter(|c| *c == 'é').count(), 1000);
    }
}

//! Per-supplier integration configuration, resolved from the environment.
//!
//! Every supplier integration is keyed by its immutable code (e.g.
//! `MOBILEMART`) and configured through `{CODE}_CLIENT_ID`,
//! `{CODE}_CLIENT_SECRET`, `{CODE}_API_URL`, `{CODE}_TOKEN_URL` and the
//! `{CODE}_LIVE_INTEGRATION` gate.

use anyhow::{anyhow, Result};

use crate::util::env::{env_flag, env_opt, env_parse, env_req};

#[derive(Debug, Clone)]
pub struct SupplierConfig {
    /// Immutable supplier code, upper-case (`MOBILEMART`).
    pub code: String,
    pub display_name: String,
    /// Base URL for catalog/purchase endpoints.
    pub api_url: String,
    /// OAuth2 token endpoint.
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// When enabled, missing credentials are a hard configuration error.
    /// Otherwise the integration runs catalog-only and token acquisition
    /// fails soft at call time.
    pub live_integration: bool,
    /// Integration rank; lower number = preferred on ties.
    pub priority: i32,
}

impl SupplierConfig {
    pub fn from_env(code: &str) -> Result<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(anyhow!("empty supplier code"));
        }

        let key = |suffix: &str| format!("{code}_{suffix}");

        let api_url = env_req(&key("API_URL"))?.trim_end_matches('/').to_string();
        let token_url = env_req(&key("TOKEN_URL"))?;

        let client_id = env_opt(&key("CLIENT_ID"));
        let client_secret = env_opt(&key("CLIENT_SECRET"));
        let live_integration = env_flag(&key("LIVE_INTEGRATION"), false);

        if live_integration && (client_id.is_none() || client_secret.is_none()) {
            return Err(anyhow!(
                "{code}: live integration enabled but {} / {} not set",
                key("CLIENT_ID"),
                key("CLIENT_SECRET")
            ));
        }

        let display_name = env_opt(&key("DISPLAY_NAME")).unwrap_or_else(|| title_case(&code));
        let priority: i32 = env_parse(&key("PRIORITY"), 10);

        Ok(Self {
            code,
            display_name,
            api_url,
            token_url,
            client_id,
            client_secret,
            live_integration,
            priority,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

fn title_case(code: &str) -> String {
    let lower = code.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests use a unique supplier code per test so parallel test
    // execution cannot interfere.

    #[test]
    fn live_integration_requires_credentials() {
        std::env::set_var("ACME1_API_URL", "https://api.acme.test");
        std::env::set_var("ACME1_TOKEN_URL", "https://auth.acme.test/token");
        std::env::set_var("ACME1_LIVE_INTEGRATION", "true");
        let err = SupplierConfig::from_env("ACME1").unwrap_err();
        assert!(err.to_string().contains("CLIENT_ID"));
    }

    #[test]
    fn offline_mode_tolerates_missing_credentials() {
        std::env::set_var("ACME2_API_URL", "https://api.acme.test/");
        std::env::set_var("ACME2_TOKEN_URL", "https://auth.acme.test/token");
        let cfg = SupplierConfig::from_env("acme2").unwrap();
        assert_eq!(cfg.code, "ACME2");
        assert!(!cfg.live_integration);
        assert!(!cfg.has_credentials());
        // trailing slash trimmed so path joins stay predictable
        assert_eq!(cfg.api_url, "https://api.acme.test");
    }

    #[test]
    fn defaults_display_name_and_priority() {
        std::env::set_var("ACME3_API_URL", "https://api.acme.test");
        std::env::set_var("ACME3_TOKEN_URL", "https://auth.acme.test/token");
        let cfg = SupplierConfig::from_env("ACME3").unwrap();
        assert_eq!(cfg.display_name, "Acme3");
        assert_eq!(cfg.priority, 10);
    }
}

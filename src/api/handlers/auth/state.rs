//! Auth state and configuration.

use std::sync::Arc;

use super::envelope::CookieSecrets;
use super::rate_limit::RateLimiter;

/// Sessions live server-side for two weeks, regardless of cookie lifetime.
const DEFAULT_SESSION_LIFETIME_SECONDS: i64 = 14 * 24 * 60 * 60;
/// Emailed verification codes are valid for ten minutes.
const DEFAULT_VERIFICATION_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_BREACH_RANGE_URL: &str = "https://api.pwnedpasswords.com";
/// Breach lookups must never stall signup for more than a second.
const DEFAULT_BREACH_TIMEOUT_MILLIS: u64 = 1000;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    session_lifetime_seconds: i64,
    verification_ttl_seconds: i64,
    breach_range_url: String,
    breach_timeout_millis: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            session_lifetime_seconds: DEFAULT_SESSION_LIFETIME_SECONDS,
            verification_ttl_seconds: DEFAULT_VERIFICATION_TTL_SECONDS,
            breach_range_url: DEFAULT_BREACH_RANGE_URL.to_string(),
            breach_timeout_millis: DEFAULT_BREACH_TIMEOUT_MILLIS,
        }
    }

    #[must_use]
    pub fn with_session_lifetime_seconds(mut self, seconds: i64) -> Self {
        self.session_lifetime_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_breach_range_url(mut self, url: String) -> Self {
        self.breach_range_url = url;
        self
    }

    #[must_use]
    pub fn with_breach_timeout_millis(mut self, millis: u64) -> Self {
        self.breach_timeout_millis = millis;
        self
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(super) fn session_lifetime_seconds(&self) -> i64 {
        self.session_lifetime_seconds
    }

    pub(super) fn verification_ttl_seconds(&self) -> i64 {
        self.verification_ttl_seconds
    }

    pub(super) fn breach_range_url(&self) -> &str {
        &self.breach_range_url
    }

    pub(super) fn breach_timeout_millis(&self) -> u64 {
        self.breach_timeout_millis
    }

    /// Cookies are only marked `Secure` when the service is served over
    /// HTTPS; local development stays on plain HTTP.
    pub(super) fn cookie_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    cookie_secrets: CookieSecrets,
    rate_limiter: Arc<dyn RateLimiter>,
    http_client: reqwest::Client,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        cookie_secrets: CookieSecrets,
        rate_limiter: Arc<dyn RateLimiter>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            cookie_secrets,
            rate_limiter,
            http_client,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn cookie_secrets(&self) -> &CookieSecrets {
        &self.cookie_secrets
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }
}

#[cfg(test)]
mod tests {
    use super::super::rate_limit::{NoopRateLimiter, RateLimiter};
    use super::{AuthConfig, AuthState, CookieSecrets};
    use anyhow::Result;
    use std::sync::Arc;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://sesamo.dev".to_string());

        assert_eq!(config.base_url(), "https://sesamo.dev");
        assert_eq!(
            config.session_lifetime_seconds(),
            super::DEFAULT_SESSION_LIFETIME_SECONDS
        );
        assert_eq!(
            config.verification_ttl_seconds(),
            super::DEFAULT_VERIFICATION_TTL_SECONDS
        );
        assert_eq!(config.breach_range_url(), super::DEFAULT_BREACH_RANGE_URL);
        assert_eq!(
            config.breach_timeout_millis(),
            super::DEFAULT_BREACH_TIMEOUT_MILLIS
        );

        let config = config
            .with_session_lifetime_seconds(3600)
            .with_verification_ttl_seconds(120)
            .with_breach_range_url("https://range.test".to_string())
            .with_breach_timeout_millis(250);

        assert_eq!(config.session_lifetime_seconds(), 3600);
        assert_eq!(config.verification_ttl_seconds(), 120);
        assert_eq!(config.breach_range_url(), "https://range.test");
        assert_eq!(config.breach_timeout_millis(), 250);
    }

    #[test]
    fn cookie_secure_tracks_scheme() {
        assert!(AuthConfig::new("https://sesamo.dev".to_string()).cookie_secure());
        assert!(!AuthConfig::new("http://localhost:3000".to_string()).cookie_secure());
    }

    #[test]
    fn auth_state_holds_its_parts() -> Result<()> {
        let config = AuthConfig::new("https://sesamo.dev".to_string());
        let secrets = CookieSecrets::from_csv("s3cret")?;
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        let state = AuthState::new(config, secrets, limiter, reqwest::Client::new());
        assert_eq!(state.config().base_url(), "https://sesamo.dev");
        Ok(())
    }
}

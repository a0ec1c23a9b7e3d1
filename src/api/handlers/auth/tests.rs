//! Auth module tests and shared fixtures.

use anyhow::Result;
use std::sync::Arc;

use super::envelope::CookieSecrets;
use super::rate_limit::{NoopRateLimiter, RateLimiter};
use super::state::{AuthConfig, AuthState};

pub(crate) fn auth_state() -> Result<Arc<AuthState>> {
    auth_state_with(AuthConfig::new("https://sesamo.dev".to_string()))
}

pub(crate) fn auth_state_with(config: AuthConfig) -> Result<Arc<AuthState>> {
    let secrets = CookieSecrets::from_csv("test-secret")?;
    let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
    Ok(Arc::new(AuthState::new(
        config,
        secrets,
        limiter,
        reqwest::Client::new(),
    )))
}

mod cookies {
    use super::super::session::clear_session_cookie;
    use super::{AuthConfig, auth_state, auth_state_with};
    use anyhow::Result;

    #[test]
    fn secure_attribute_follows_the_base_url_scheme() -> Result<()> {
        let https = auth_state()?;
        let header = clear_session_cookie(&https)?;
        assert!(header.to_str()?.contains("Secure"));

        let http = auth_state_with(AuthConfig::new("http://localhost:3000".to_string()))?;
        let header = clear_session_cookie(&http)?;
        assert!(!header.to_str()?.contains("Secure"));
        Ok(())
    }
}

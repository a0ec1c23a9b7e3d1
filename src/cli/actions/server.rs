use crate::api;
use crate::api::handlers::auth::{AuthConfig, CookieSecrets};
use anyhow::{Context, Result};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub base_url: String,
    pub session_secrets: String,
    pub session_lifetime_seconds: i64,
    pub verification_ttl_seconds: i64,
    pub breach_range_url: String,
    pub breach_timeout_millis: u64,
    pub email_outbox_poll_seconds: u64,
    pub email_outbox_batch_size: usize,
    pub email_outbox_max_attempts: u32,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let cookie_secrets =
        CookieSecrets::from_csv(&args.session_secrets).context("Invalid --session-secrets")?;

    let auth_config = AuthConfig::new(args.base_url)
        .with_session_lifetime_seconds(args.session_lifetime_seconds)
        .with_verification_ttl_seconds(args.verification_ttl_seconds)
        .with_breach_range_url(args.breach_range_url)
        .with_breach_timeout_millis(args.breach_timeout_millis);

    let email_config = api::email::EmailWorkerConfig::new()
        .with_poll_interval_seconds(args.email_outbox_poll_seconds)
        .with_batch_size(args.email_outbox_batch_size)
        .with_max_attempts(args.email_outbox_max_attempts);

    api::new(args.port, args.dsn, auth_config, cookie_secrets, email_config).await
}

//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let base_url = matches
        .get_one::<String>("base-url")
        .cloned()
        .context("missing required argument: --base-url")?;
    let session_secrets = matches
        .get_one::<String>("session-secrets")
        .cloned()
        .context("missing required argument: --session-secrets")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        base_url,
        session_secrets,
        session_lifetime_seconds: matches
            .get_one::<i64>("session-lifetime-seconds")
            .copied()
            .unwrap_or(1_209_600),
        verification_ttl_seconds: matches
            .get_one::<i64>("verification-ttl-seconds")
            .copied()
            .unwrap_or(600),
        breach_range_url: matches
            .get_one::<String>("breach-range-url")
            .cloned()
            .unwrap_or_else(|| "https://api.pwnedpasswords.com".to_string()),
        breach_timeout_millis: matches
            .get_one::<u64>("breach-timeout-millis")
            .copied()
            .unwrap_or(1000),
        email_outbox_poll_seconds: matches
            .get_one::<u64>("email-outbox-poll-seconds")
            .copied()
            .unwrap_or(5),
        email_outbox_batch_size: matches
            .get_one::<usize>("email-outbox-batch-size")
            .copied()
            .unwrap_or(10),
        email_outbox_max_attempts: matches
            .get_one::<u32>("email-outbox-max-attempts")
            .copied()
            .unwrap_or(5),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn handler_builds_server_args() {
        temp_env::with_vars([("SESAMO_DSN", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "sesamo",
                "--dsn",
                "postgres://user@localhost:5432/sesamo",
                "--base-url",
                "http://localhost:3000",
                "--session-secrets",
                "first,second",
            ]);
            let action = handler(&matches);
            assert!(action.is_ok());
            if let Ok(Action::Server(args)) = action {
                assert_eq!(args.port, 8080);
                assert_eq!(args.base_url, "http://localhost:3000");
                assert_eq!(args.session_secrets, "first,second");
                assert_eq!(args.session_lifetime_seconds, 1_209_600);
                assert_eq!(args.verification_ttl_seconds, 600);
                assert_eq!(args.breach_timeout_millis, 1000);
            }
        });
    }
}

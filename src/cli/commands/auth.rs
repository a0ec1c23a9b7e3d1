use clap::{Arg, Command};

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_verification_args(command);
    let command = with_breach_args(command);
    with_outbox_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .help("Public base URL used for verification links and cookie flags")
                .env("SESAMO_BASE_URL")
                .default_value("https://sesamo.dev"),
        )
        .arg(
            Arg::new("session-secrets")
                .long("session-secrets")
                .help("Comma-separated cookie signing secrets (first signs, all verify)")
                .env("SESAMO_SESSION_SECRETS")
                .default_value("secr3t"),
        )
        .arg(
            Arg::new("session-lifetime-seconds")
                .long("session-lifetime-seconds")
                .help("Server-side session lifetime in seconds")
                .env("SESAMO_SESSION_LIFETIME_SECONDS")
                .default_value("1209600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_verification_args(command: Command) -> Command {
    command.arg(
        Arg::new("verification-ttl-seconds")
            .long("verification-ttl-seconds")
            .help("Validity period for emailed verification codes")
            .env("SESAMO_VERIFICATION_TTL_SECONDS")
            .default_value("600")
            .value_parser(clap::value_parser!(i64)),
    )
}

fn with_breach_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("breach-range-url")
                .long("breach-range-url")
                .help("Base URL of the compromised-password range service")
                .env("SESAMO_BREACH_RANGE_URL")
                .default_value("https://api.pwnedpasswords.com"),
        )
        .arg(
            Arg::new("breach-timeout-millis")
                .long("breach-timeout-millis")
                .help("Hard timeout for the breach-password lookup")
                .env("SESAMO_BREACH_TIMEOUT_MILLIS")
                .default_value("1000")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("email-outbox-poll-seconds")
                .long("email-outbox-poll-seconds")
                .help("Email outbox poll interval in seconds")
                .env("SESAMO_EMAIL_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("email-outbox-batch-size")
                .long("email-outbox-batch-size")
                .help("Email outbox batch size per poll")
                .env("SESAMO_EMAIL_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("email-outbox-max-attempts")
                .long("email-outbox-max-attempts")
                .help("Max attempts before marking an email as failed")
                .env("SESAMO_EMAIL_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}

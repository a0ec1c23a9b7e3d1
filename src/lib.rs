//! # Sesamo (Login, Registration & Verification)
//!
//! `sesamo` is a small authentication service: password login, signup with
//! email verification, and cookie-based sessions.
//!
//! ## Sessions
//!
//! Sessions are rows in the database with a fixed 14-day lifetime, mirrored
//! into a signed `HttpOnly` cookie (`__session`). The cookie only carries the
//! session id and an optional expiry; the raw envelope is HMAC-signed with
//! one or more rotatable secrets (the first signs, all verify).
//!
//! ## Verification codes
//!
//! Onboarding, password reset, email change and two-factor flows share a
//! single one-time-code protocol keyed by `(target, type)`. Codes are
//! TOTP-style values rendered over an alphabet that excludes visually
//! ambiguous characters. At most one live code exists per `(target, type)`
//! pair; issuing a new one invalidates the old one, and single-use types are
//! deleted atomically with their redemption.
//!
//! ## Passwords
//!
//! Passwords are bcrypt-hashed. During signup the service additionally asks
//! the haveibeenpwned range API (k-anonymity, 5-character SHA-1 prefix)
//! whether the password is known-breached; that check is advisory and fails
//! open.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}

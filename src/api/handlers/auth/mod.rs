//! Auth handlers and supporting modules.
//!
//! This module coordinates password authentication, cookie sessions, and
//! the shared one-time-code verification protocol.
//!
//! ## Sessions
//!
//! Session rows live server-side for a fixed window; the `__session` cookie
//! only carries the signed session id (and, for persistent logins, the
//! mirrored expiry). Signing secrets are rotatable: the first configured
//! secret signs, all of them verify.
//!
//! ## Verification codes
//!
//! One record per `(target, type)` pair, enforced by upsert. Emailed codes
//! expire and are deleted atomically with their redemption; the two-factor
//! secret is a standing record that never expires and is never consumed.

mod breach;
mod envelope;
pub(crate) mod gate;
pub(crate) mod login;
mod otp;
mod password;
mod rate_limit;
pub(crate) mod session;
pub(crate) mod signup;
mod state;
pub(crate) mod storage;
pub(crate) mod submission;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use envelope::CookieSecrets;
pub use rate_limit::NoopRateLimiter;
pub use state::{AuthConfig, AuthState};

#[cfg(test)]
pub(crate) mod tests;

//! Small helpers for auth validation, cookies, and error classification.

use axum::http::HeaderMap;
use regex::Regex;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Normalize a username for lookup/uniqueness checks.
pub(super) fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Username format check on already-normalized input.
pub(super) fn valid_username(username_normalized: &str) -> bool {
    Regex::new(r"^[a-z0-9_]{3,20}$").is_ok_and(|regex| regex.is_match(username_normalized))
}

/// Display names just need to be present and reasonably short.
pub(super) fn valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= 40
}

pub(super) const MIN_PASSWORD_LENGTH: usize = 6;
pub(super) const MAX_PASSWORD_LENGTH: usize = 100;

pub(super) fn valid_password_length(password: &str) -> bool {
    let length = password.chars().count();
    (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&length)
}

/// Only follow client-supplied redirects to local absolute paths.
///
/// Anything else (other origins, scheme-relative `//` URLs, empty values)
/// falls back to `/`.
pub(super) fn safe_redirect(redirect_to: Option<&str>) -> String {
    match redirect_to.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Map a unique violation to the form field that caused it, based on the
/// violated constraint name.
pub(super) fn unique_violation_field(err: &sqlx::Error) -> Option<&'static str> {
    if !is_unique_violation(err) {
        return None;
    }
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };
    let constraint = db_err.constraint().unwrap_or_default();
    if constraint.contains("email") {
        Some("email")
    } else if constraint.contains("username") {
        Some("username")
    } else {
        None
    }
}

/// Extract a named cookie value from the `Cookie` request header.
pub(super) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == name {
            return Some(val.to_string());
        }
    }
    None
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

//! Session lifecycle: server-side rows mirrored into the `__session` cookie.
//!
//! The cookie and the row have independent lifetimes. The row always lives
//! for the configured server-side window; the cookie is a browser-session
//! cookie unless the caller asks for persistence, in which case the expiry
//! is written both into the signed envelope and onto the cookie's `Expires`
//! attribute. Both sides are checked when resolving a session.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::envelope;
use super::state::AuthState;
use super::storage::{delete_session, lookup_live_session, lookup_session_user};
use super::types::SessionResponse;
use super::utils::extract_cookie;

pub(crate) const SESSION_COOKIE_NAME: &str = "__session";

/// Signed payload carried by the session cookie.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub(crate) struct SessionEnvelope {
    pub(crate) session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expires: Option<DateTime<Utc>>,
}

/// Cookie persistence options for `commit_session`.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct CookieOptions {
    pub(crate) expires: Option<DateTime<Utc>>,
    pub(crate) max_age: Option<i64>,
}

fn http_date(instant: DateTime<Utc>) -> String {
    instant.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn cookie_attributes(state: &AuthState, expires: Option<DateTime<Utc>>) -> String {
    let mut attributes = "; Path=/; HttpOnly; SameSite=Lax".to_string();
    if let Some(expires) = expires {
        attributes.push_str("; Expires=");
        attributes.push_str(&http_date(expires));
    }
    if state.config().cookie_secure() {
        attributes.push_str("; Secure");
    }
    attributes
}

/// Serialize a session into a signed `Set-Cookie` value.
///
/// `max_age` takes precedence over an explicit `expires`; with neither, the
/// envelope records no expiry and the cookie lives for the browser session
/// only. The effective expiry is mirrored onto the cookie attribute.
///
/// # Errors
/// Returns an error if sealing or header construction fails.
pub(crate) fn commit_session(
    state: &AuthState,
    session_id: Uuid,
    options: CookieOptions,
) -> Result<HeaderValue> {
    let expires = options
        .max_age
        .map(|seconds| Utc::now() + Duration::seconds(seconds))
        .or(options.expires);

    let sealed = envelope::seal(
        &SessionEnvelope {
            session_id,
            expires,
        },
        state.cookie_secrets(),
    )?;

    let cookie = format!(
        "{SESSION_COOKIE_NAME}={sealed}{}",
        cookie_attributes(state, expires)
    );
    HeaderValue::from_str(&cookie).context("failed to build session cookie")
}

/// Cookie-clearing header; always available, whatever the store did.
pub(crate) fn clear_session_cookie(state: &AuthState) -> Result<HeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).context("failed to build clearing cookie")
}

/// Verified envelope from the request, if any.
pub(crate) fn extract_session_envelope(
    headers: &HeaderMap,
    state: &AuthState,
) -> Option<SessionEnvelope> {
    let raw = extract_cookie(headers, SESSION_COOKIE_NAME)?;
    envelope::open(&raw, state.cookie_secrets())
}

/// Outcome of resolving the request cookie against the session store.
pub(crate) enum ResolvedSession {
    /// No cookie, or one that fails signature verification.
    Anonymous,
    /// A verified cookie pointing at an expired or missing session; callers
    /// must actively clear it.
    Stale,
    Active {
        user_id: Uuid,
    },
}

/// Resolve the request's cookie into a user identity.
///
/// The envelope's own mirrored expiry and the row's `expiration_date` are
/// both honored; either one lapsing makes the session stale.
pub(crate) async fn resolve_session(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<ResolvedSession> {
    let Some(session) = extract_session_envelope(headers, state) else {
        return Ok(ResolvedSession::Anonymous);
    };
    if session.expires.is_some_and(|expires| expires <= Utc::now()) {
        return Ok(ResolvedSession::Stale);
    }
    match lookup_live_session(pool, session.session_id).await? {
        Some(user_id) => Ok(ResolvedSession::Active { user_id }),
        None => Ok(ResolvedSession::Stale),
    }
}

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(envelope) = extract_session_envelope(&headers, &auth_state) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    if envelope.expires.is_some_and(|expires| expires <= Utc::now()) {
        return stale_session_response(&auth_state);
    }

    match lookup_session_user(&pool, envelope.session_id).await {
        Ok(Some(user)) => {
            let response = SessionResponse {
                user_id: user.user_id.to_string(),
                email: user.email,
                username: user.username,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        // The cookie references a dead session; destroy it, don't ignore it.
        Ok(None) => stale_session_response(&auth_state),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn stale_session_response(state: &AuthState) -> axum::response::Response {
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(state) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // The row delete is best-effort: logout must never fail visibly, and a
    // leftover row expires on its own anyway.
    if let Some(envelope) = extract_session_envelope(&headers, &auth_state) {
        if let Err(err) = delete_session(&pool, envelope.session_id).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(&auth_state) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result, anyhow};
    use axum::http::HeaderValue;

    fn state() -> Result<Arc<AuthState>> {
        super::super::tests::auth_state()
    }

    fn cookie_value(header: &HeaderValue) -> Result<String> {
        let raw = header.to_str().context("cookie header is not a string")?;
        let pair = raw.split(';').next().context("empty cookie")?;
        let (name, value) = pair.split_once('=').context("malformed cookie pair")?;
        if name != SESSION_COOKIE_NAME {
            return Err(anyhow!("unexpected cookie name: {name}"));
        }
        Ok(value.to_string())
    }

    fn decode_envelope(state: &AuthState, header: &HeaderValue) -> Result<SessionEnvelope> {
        let sealed = cookie_value(header)?;
        envelope::open(&sealed, state.cookie_secrets()).context("envelope did not verify")
    }

    #[test]
    fn commit_with_max_age_mirrors_expiry() -> Result<()> {
        let state = state()?;
        let session_id = Uuid::new_v4();
        let header = commit_session(
            &state,
            session_id,
            CookieOptions {
                expires: None,
                max_age: Some(60),
            },
        )?;

        let envelope = decode_envelope(&state, &header)?;
        assert_eq!(envelope.session_id, session_id);
        let expires = envelope.expires.context("expires missing")?;
        let delta = (expires - Utc::now()).num_seconds();
        assert!((50..=60).contains(&delta), "expiry ~60s out, got {delta}");

        let raw = header.to_str()?;
        assert!(raw.contains("Expires="), "cookie attribute mirrored");
        Ok(())
    }

    #[test]
    fn max_age_wins_over_explicit_expires() -> Result<()> {
        let state = state()?;
        let far_future = Utc::now() + Duration::days(365);
        let header = commit_session(
            &state,
            Uuid::new_v4(),
            CookieOptions {
                expires: Some(far_future),
                max_age: Some(60),
            },
        )?;
        let expires = decode_envelope(&state, &header)?
            .expires
            .context("expires missing")?;
        assert!(expires < Utc::now() + Duration::hours(1));
        Ok(())
    }

    #[test]
    fn commit_without_options_is_a_session_cookie() -> Result<()> {
        let state = state()?;
        let header = commit_session(&state, Uuid::new_v4(), CookieOptions::default())?;
        let envelope = decode_envelope(&state, &header)?;
        assert_eq!(envelope.expires, None);

        let raw = header.to_str()?;
        assert!(!raw.contains("Expires="));
        assert!(raw.contains("Path=/"));
        assert!(raw.contains("HttpOnly"));
        assert!(raw.contains("SameSite=Lax"));
        assert!(raw.contains("Secure"), "https base url implies Secure");
        Ok(())
    }

    #[test]
    fn clearing_cookie_expires_immediately() -> Result<()> {
        let state = state()?;
        let header = clear_session_cookie(&state)?;
        let raw = header.to_str()?;
        assert!(raw.starts_with("__session=;"));
        assert!(raw.contains("Max-Age=0"));
        Ok(())
    }

    #[test]
    fn committed_cookie_round_trips_through_request_headers() -> Result<()> {
        let state = state()?;
        let session_id = Uuid::new_v4();
        let header = commit_session(&state, session_id, CookieOptions::default())?;

        let mut request_headers = HeaderMap::new();
        let pair = format!(
            "{SESSION_COOKIE_NAME}={}",
            cookie_value(&header)?
        );
        request_headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_str(&pair)?,
        );

        let envelope =
            extract_session_envelope(&request_headers, &state).context("cookie not extracted")?;
        assert_eq!(envelope.session_id, session_id);
        Ok(())
    }

    #[test]
    fn forged_cookie_is_treated_as_anonymous() -> Result<()> {
        let state = state()?;
        let mut request_headers = HeaderMap::new();
        request_headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("__session=forged.payload"),
        );
        assert!(extract_session_envelope(&request_headers, &state).is_none());
        Ok(())
    }

    #[test]
    fn http_date_is_rfc7231_shaped() {
        let instant = DateTime::parse_from_rfc3339("2026-08-06T12:30:45Z")
            .map(|instant| instant.with_timezone(&Utc));
        assert!(instant.is_ok());
        if let Ok(instant) = instant {
            assert_eq!(http_date(instant), "Thu, 06 Aug 2026 12:30:45 GMT");
        }
    }
}

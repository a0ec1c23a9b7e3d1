//! Route preconditions: authenticated and anonymous-only gates.
//!
//! A failed precondition is not an error, it is a redirect decision. Gates
//! return a tagged value that the handler converts into a 303 at the HTTP
//! boundary; nothing unwinds through the call stack.

use axum::{
    http::{
        HeaderMap, HeaderValue, StatusCode, Uri,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::session::{ResolvedSession, clear_session_cookie, resolve_session};
use super::state::AuthState;

/// A redirect decision carrying its destination and, when a dangling cookie
/// was detected, the header that destroys it.
#[derive(Debug)]
pub(crate) struct AuthRedirect {
    location: String,
    clear_cookie: Option<HeaderValue>,
}

impl AuthRedirect {
    pub(crate) fn to(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            clear_cookie: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn location(&self) -> &str {
        &self.location
    }
}

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.location) {
            headers.insert(LOCATION, value);
        }
        if let Some(cookie) = self.clear_cookie {
            headers.insert(SET_COOKIE, cookie);
        }
        (StatusCode::SEE_OTHER, headers).into_response()
    }
}

/// Gate failures: either a redirect decision or a store failure.
pub(crate) enum GateError {
    Redirect(AuthRedirect),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for GateError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(redirect) => redirect.into_response(),
            Self::Internal(err) => {
                error!("Auth gate failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Unexpected error".to_string(),
                )
                    .into_response()
            }
        }
    }
}

/// Where to send an anonymous user after they log in.
pub(crate) enum LoginRedirect {
    /// Come back to the URL being requested (default).
    Current,
    /// An explicit destination.
    To(String),
    /// Plain `/login` with no destination parameter.
    Skip,
}

fn login_location(redirect_to: Option<&str>) -> String {
    match redirect_to {
        Some(target) if !target.is_empty() => {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .append_pair("redirectTo", target)
                .finish();
            format!("/login?{query}")
        }
        _ => "/login".to_string(),
    }
}

/// A verified-but-dead cookie is actively destroyed, not merely ignored.
fn stale_redirect(state: &AuthState) -> AuthRedirect {
    AuthRedirect {
        location: "/".to_string(),
        clear_cookie: clear_session_cookie(state).ok(),
    }
}

/// Require a live session; anonymous requests are redirected to the login
/// entry point carrying the intended destination.
pub(crate) async fn require_user_id(
    headers: &HeaderMap,
    uri: &Uri,
    pool: &PgPool,
    state: &AuthState,
    redirect: LoginRedirect,
) -> Result<Uuid, GateError> {
    match resolve_session(headers, pool, state).await {
        Ok(ResolvedSession::Active { user_id }) => Ok(user_id),
        Ok(ResolvedSession::Anonymous) => {
            let redirect_to = match redirect {
                LoginRedirect::Current => Some(
                    uri.path_and_query()
                        .map_or_else(|| uri.path().to_string(), |pq| pq.as_str().to_string()),
                ),
                LoginRedirect::To(target) => Some(target),
                LoginRedirect::Skip => None,
            };
            Err(GateError::Redirect(AuthRedirect::to(login_location(
                redirect_to.as_deref(),
            ))))
        }
        Ok(ResolvedSession::Stale) => Err(GateError::Redirect(stale_redirect(state))),
        Err(err) => Err(GateError::Internal(err)),
    }
}

/// Require that no live session exists (login, register, verify pages).
pub(crate) async fn require_anonymous(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<(), GateError> {
    match resolve_session(headers, pool, state).await {
        Ok(ResolvedSession::Anonymous) => Ok(()),
        Ok(ResolvedSession::Active { .. }) => {
            Err(GateError::Redirect(AuthRedirect::to("/")))
        }
        Ok(ResolvedSession::Stale) => Err(GateError::Redirect(stale_redirect(state))),
        Err(err) => Err(GateError::Internal(err)),
    }
}

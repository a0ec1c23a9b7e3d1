//! Registration and onboarding signup.
//!
//! Registration only collects an email and issues an onboarding code; no
//! account exists yet. Redeeming the code (see `verification`) hands the
//! verified email back here through a short-lived signed cookie, and signup
//! then creates user, credential, and first session in one transaction.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::breach::is_common_password;
use super::envelope;
use super::gate::{AuthRedirect, require_anonymous};
use super::password::hash_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{CookieOptions, commit_session};
use super::state::AuthState;
use super::storage::{
    SignupOutcome, create_user_with_session, enqueue_email, lookup_user_id_by_email,
};
use super::submission::Submission;
use super::types::{AuthResponse, RegisterRequest, RegisterResponse, SignupRequest};
use super::utils::{
    extract_client_ip, extract_cookie, normalize_email, normalize_username, safe_redirect,
    valid_email, valid_name, valid_password_length, valid_username,
};
use super::verification::{VerificationType, prepare_verification};

pub(crate) const ONBOARDING_COOKIE_NAME: &str = "__onboarding";

/// Signed proof that an email passed onboarding verification.
#[derive(Serialize, Deserialize, Debug)]
pub(super) struct OnboardingSession {
    pub(super) email: String,
    pub(super) redirect_to: Option<String>,
    pub(super) expires: DateTime<Utc>,
}

/// Issue the onboarding cookie after a successful code redemption.
pub(super) fn onboarding_cookie(
    state: &AuthState,
    email: &str,
    redirect_to: Option<&str>,
) -> Result<HeaderValue> {
    let ttl = state.config().verification_ttl_seconds();
    let payload = OnboardingSession {
        email: email.to_string(),
        redirect_to: redirect_to.map(str::to_string),
        expires: Utc::now() + Duration::seconds(ttl),
    };
    let sealed = envelope::seal(&payload, state.cookie_secrets())?;
    let mut cookie = format!(
        "{ONBOARDING_COOKIE_NAME}={sealed}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl}"
    );
    if state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).context("failed to build onboarding cookie")
}

fn clear_onboarding_cookie(state: &AuthState) -> Result<HeaderValue> {
    let mut cookie =
        format!("{ONBOARDING_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if state.config().cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).context("failed to build clearing cookie")
}

/// Verified onboarding state from the request, honoring its own expiry.
pub(super) fn onboarding_session(
    headers: &HeaderMap,
    state: &AuthState,
) -> Option<OnboardingSession> {
    let raw = extract_cookie(headers, ONBOARDING_COOKIE_NAME)?;
    let session: OnboardingSession = envelope::open(&raw, state.cookie_secrets())?;
    (session.expires > Utc::now()).then_some(session)
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Verification code issued", body = RegisterResponse),
        (status = 400, description = "Invalid submission", body = super::submission::SubmissionReply),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Err(gate) = require_anonymous(&headers, &pool, &auth_state).await {
        return gate.into_response();
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        let mut submission = Submission::new();
        submission.add_field_error("email", "Invalid email");
        return submission.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }
    if auth_state
        .rate_limiter()
        .check_target(&email, RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    match lookup_user_id_by_email(&pool, &email).await {
        Ok(None) => {}
        Ok(Some(_)) => {
            let mut submission = Submission::new();
            submission.add_field_error("email", "Email already exists");
            return submission.into_response();
        }
        Err(err) => {
            error!("Registration lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    }

    let prepared = match prepare_verification(
        &pool,
        &auth_state,
        VerificationType::Onboarding,
        &email,
        auth_state.config().verification_ttl_seconds(),
        request.redirect_to.as_deref(),
    )
    .await
    {
        Ok(prepared) => prepared,
        Err(err) => {
            error!("Failed to prepare verification: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed".to_string(),
            )
                .into_response();
        }
    };

    // The engine only returns URLs; delivery goes through the outbox worker.
    let payload_json = json!({
        "email": email,
        "code": prepared.otp,
        "verify_url": prepared.verify_url.to_string(),
    });
    if let Err(err) = enqueue_email(&pool, &email, "verification_code", &payload_json).await {
        error!("Failed to enqueue verification email: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Registration failed".to_string(),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(RegisterResponse {
            redirect_to: prepared.redirect_to.to_string(),
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created and session committed", body = AuthResponse),
        (status = 303, description = "No verified email on hand; restart at /register"),
        (status = 400, description = "Invalid submission", body = super::submission::SubmissionReply),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let request: SignupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Err(gate) = require_anonymous(&headers, &pool, &auth_state).await {
        return gate.into_response();
    }

    // Signup is only reachable with a verified email from the onboarding
    // code; otherwise the flow restarts at registration.
    let Some(onboarding) = onboarding_session(&headers, &auth_state) else {
        return AuthRedirect::to("/register").into_response();
    };

    let username = normalize_username(&request.username);
    let mut submission = Submission::new();
    if !valid_username(&username) {
        submission.add_field_error("username", "Invalid username");
    }
    if !valid_name(&request.name) {
        submission.add_field_error("name", "Name is required");
    }
    if !valid_password_length(&request.password) {
        submission.add_field_error("password", "Invalid password length");
    }
    if submission.has_errors() {
        return submission.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Signup)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }
    if auth_state
        .rate_limiter()
        .check_target(&onboarding.email, RateLimitAction::Signup)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    // Advisory breach check; an unreachable corpus never blocks signup.
    if is_common_password(&auth_state, &request.password).await {
        submission.add_field_error("password", "Password is too common");
        return submission.into_response();
    }

    let password_hash = match hash_password(&request.password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Signup failed".to_string(),
            )
                .into_response();
        }
    };

    match create_user_with_session(
        &pool,
        &onboarding.email,
        &username,
        request.name.trim(),
        &password_hash,
        auth_state.config().session_lifetime_seconds(),
    )
    .await
    {
        Ok(SignupOutcome::Created { user_id, session }) => {
            // `remember` persists the cookie until the server-side row dies;
            // otherwise the cookie lasts only for the browser session.
            let options = if request.remember {
                CookieOptions {
                    expires: Some(session.expiration_date),
                    max_age: None,
                }
            } else {
                CookieOptions::default()
            };
            match commit_session(&auth_state, session.id, options) {
                Ok(cookie) => {
                    let mut response_headers = HeaderMap::new();
                    response_headers.append(SET_COOKIE, cookie);
                    if let Ok(clear) = clear_onboarding_cookie(&auth_state) {
                        response_headers.append(SET_COOKIE, clear);
                    }
                    let redirect_to = safe_redirect(
                        request
                            .redirect_to
                            .as_deref()
                            .or(onboarding.redirect_to.as_deref()),
                    );
                    (
                        StatusCode::OK,
                        response_headers,
                        Json(AuthResponse {
                            user_id: user_id.to_string(),
                            redirect_to,
                        }),
                    )
                        .into_response()
                }
                Err(err) => {
                    error!("Failed to commit session cookie: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Signup failed".to_string(),
                    )
                        .into_response()
                }
            }
        }
        Ok(SignupOutcome::Conflict { field }) => {
            // Concurrent signup on the same email/username is an expected,
            // user-correctable outcome.
            let message = if field == "email" {
                "Email already exists"
            } else {
                "Username already exists"
            };
            let mut submission = Submission::new();
            submission.add_field_error(field, message);
            submission.into_response()
        }
        Err(err) => {
            error!("Signup failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Signup failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::http::header::{COOKIE, LOCATION};
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    #[tokio::test]
    async fn register_missing_payload() -> Result<()> {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(super::super::tests::auth_state()?),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn register_rejects_invalid_email_before_any_lookup() -> Result<()> {
        let response = register(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(super::super::tests::auth_state()?),
            Some(Json(RegisterRequest {
                email: "not-an-email".to_string(),
                redirect_to: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn signup_without_onboarding_cookie_restarts_the_flow() -> Result<()> {
        let response = signup(
            HeaderMap::new(),
            Extension(lazy_pool()?),
            Extension(super::super::tests::auth_state()?),
            Some(Json(SignupRequest {
                username: "newuser".to_string(),
                name: "New User".to_string(),
                password: "Sup3rSecret!".to_string(),
                remember: false,
                redirect_to: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some("/register")
        );
        Ok(())
    }

    #[tokio::test]
    async fn onboarding_cookie_round_trips_and_expires() -> Result<()> {
        let state = super::super::tests::auth_state()?;
        let cookie = onboarding_cookie(&state, "a@x.com", Some("/welcome"))?;

        let raw = cookie.to_str()?;
        let pair = raw.split(';').next().unwrap_or_default();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(pair)?);

        let session = onboarding_session(&headers, &state);
        assert!(session.is_some());
        if let Some(session) = session {
            assert_eq!(session.email, "a@x.com");
            assert_eq!(session.redirect_to.as_deref(), Some("/welcome"));
            assert!(session.expires > Utc::now());
        }
        Ok(())
    }

    #[tokio::test]
    async fn expired_onboarding_envelope_is_ignored() -> Result<()> {
        let state = super::super::tests::auth_state()?;
        let payload = OnboardingSession {
            email: "a@x.com".to_string(),
            redirect_to: None,
            expires: Utc::now() - Duration::seconds(1),
        };
        let sealed = envelope::seal(&payload, state.cookie_secrets())?;
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("{ONBOARDING_COOKIE_NAME}={sealed}"))?,
        );
        assert!(onboarding_session(&headers, &state).is_none());
        Ok(())
    }
}

//! Password login.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::gate::require_anonymous;
use super::password::{DUMMY_HASH, verify_password};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{CookieOptions, commit_session};
use super::state::AuthState;
use super::storage::{insert_session, lookup_credential_by_username};
use super::submission::Submission;
use super::types::{AuthResponse, LoginRequest};
use super::utils::{extract_client_ip, normalize_username, safe_redirect};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session committed", body = AuthResponse),
        (status = 400, description = "Invalid credentials", body = super::submission::SubmissionReply),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if let Err(gate) = require_anonymous(&headers, &pool, &auth_state).await {
        return gate.into_response();
    }

    let username = normalize_username(&request.username);

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }
    if auth_state
        .rate_limiter()
        .check_target(&username, RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    let credential = match lookup_credential_by_username(&pool, &username).await {
        Ok(credential) => credential,
        Err(err) => {
            error!("Login lookup failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

    // Unknown usernames still burn a hash check so the two failure modes
    // are indistinguishable, in timing and in the response.
    let user_id = match credential {
        Some(credential) => verify_password(&request.password, &credential.password_hash)
            .await
            .then_some(credential.user_id),
        None => {
            let _ = verify_password(&request.password, DUMMY_HASH).await;
            None
        }
    };

    let Some(user_id) = user_id else {
        return Submission::form_error("Invalid username or password").into_response();
    };

    let session = match insert_session(
        &pool,
        user_id,
        auth_state.config().session_lifetime_seconds(),
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to create session: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response();
        }
    };

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
            response_headers.insert(SET_COOKIE, cookie);
            (
                StatusCode::OK,
                response_headers,
                Json(AuthResponse {
                    user_id: user_id.to_string(),
                    redirect_to: safe_redirect(request.redirect_to.as_deref()),
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to commit session cookie: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Login failed".to_string(),
            )
                .into_response()
        }
    }
}

//! Authenticated profile endpoint.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::auth::AuthState;
use super::auth::gate::{LoginRedirect, require_user_id};
use super::auth::storage::lookup_user_profile;
use super::auth::types::UserResponse;

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Authenticated user profile", body = UserResponse),
        (status = 303, description = "Not authenticated; redirected to login")
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    uri: Uri,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user_id = match require_user_id(
        &headers,
        &uri,
        &pool,
        &auth_state,
        LoginRedirect::Current,
    )
    .await
    {
        Ok(user_id) => user_id,
        Err(gate) => return gate.into_response(),
    };

    match lookup_user_profile(&pool, user_id).await {
        Ok(Some(profile)) => Json(UserResponse {
            id: profile.id.to_string(),
            email: profile.email,
            username: profile.username,
            name: profile.name,
            roles: profile.roles,
        })
        .into_response(),
        // A live session for a vanished user should not happen; treat it as
        // not found rather than leaking internals.
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to load profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::http::header::LOCATION;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn anonymous_profile_request_redirects_to_login() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let state = super::super::auth::tests::auth_state()?;
        let uri: Uri = "/v1/me".parse()?;

        let response = me(HeaderMap::new(), uri, Extension(pool), Extension(state))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok()),
            Some("/login?redirectTo=%2Fv1%2Fme")
        );
        Ok(())
    }
}

use crate::api::handlers::{auth, health, me};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span};
use ulid::Ulid;
use url::Url;

pub mod email;
pub mod handlers;
// OpenAPI document generation lives in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// Start the server.
///
/// # Errors
/// Returns an error if configuration is invalid, the database is
/// unreachable, or the listener fails.
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    cookie_secrets: auth::CookieSecrets,
    email_config: email::EmailWorkerConfig,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let http_client = reqwest::Client::builder()
        .user_agent(crate::APP_USER_AGENT)
        .build()
        .context("Failed to build HTTP client")?;

    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        cookie_secrets,
        Arc::new(auth::NoopRateLimiter),
        http_client,
    ));

    // Background worker polls email_outbox (DB-backed queue) for pending
    // rows and hands them to the sender.
    email::spawn_outbox_worker(pool.clone(), Arc::new(email::LogEmailSender), email_config);

    let origin = allowed_origin(auth_state.config().base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/openapi.json", get(openapi_json))
        .route("/v1/auth/register", post(auth::signup::register))
        .route("/v1/auth/verify", post(auth::verification::verify))
        .route("/v1/auth/signup", post(auth::signup::signup))
        .route("/v1/auth/login", post(auth::login::login))
        .route("/v1/auth/logout", post(auth::session::logout))
        .route("/v1/auth/session", get(auth::session::session))
        .route(
            "/v1/auth/two-factor",
            post(auth::verification::enroll_two_factor),
        )
        .route("/v1/me", get(me::me))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state.clone()))
                .layer(Extension(pool.clone())),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(openapi::openapi())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn allowed_origin(base_url: &str) -> Result<HeaderValue> {
    let parsed =
        Url::parse(base_url).with_context(|| format!("Invalid base URL: {base_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Base URL must include a valid host: {base_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build allowed origin header")
}

#[cfg(test)]
mod tests {
    use super::allowed_origin;
    use anyhow::Result;

    #[test]
    fn allowed_origin_strips_paths_and_keeps_ports() -> Result<()> {
        let origin = allowed_origin("http://localhost:3000/app/")?;
        assert_eq!(origin.to_str()?, "http://localhost:3000");

        let origin = allowed_origin("https://sesamo.dev")?;
        assert_eq!(origin.to_str()?, "https://sesamo.dev");
        Ok(())
    }

    #[test]
    fn allowed_origin_rejects_garbage() {
        assert!(allowed_origin("not a url").is_err());
    }
}

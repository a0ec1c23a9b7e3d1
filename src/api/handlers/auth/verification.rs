//! Verification-code engine and the `/v1/auth/verify` endpoint.
//!
//! One protocol serves every flow that needs a one-time code: issuance
//! upserts a record keyed by `(target, type)` so at most one code is ever
//! outstanding per pair, validation is a pure lookup-and-check, and
//! redemption of single-use types deletes the record atomically with the
//! type-specific continuation.

use anyhow::{Context, Result};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, Uri, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use url::Url;

use super::gate::{LoginRedirect, require_user_id};
use super::otp::{self, CODE_LENGTH, OtpAlgorithm, OtpConfig};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::signup::onboarding_cookie;
use super::state::AuthState;
use super::storage::{delete_verification, lookup_live_verification, upsert_verification};
use super::submission::Submission;
use super::types::{TwoFactorEnrollResponse, VerifyRequest, VerifyResponse};
use super::utils::extract_client_ip;

/// Standing two-factor secrets roll over on the standard 30-second step.
pub(super) const TWO_FACTOR_PERIOD_SECONDS: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum VerificationType {
    Onboarding,
    ResetPassword,
    ChangeEmail,
    TwoFactor,
}

impl VerificationType {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::ResetPassword => "reset-password",
            Self::ChangeEmail => "change-email",
            Self::TwoFactor => "2fa",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "onboarding" => Some(Self::Onboarding),
            "reset-password" => Some(Self::ResetPassword),
            "change-email" => Some(Self::ChangeEmail),
            "2fa" => Some(Self::TwoFactor),
            _ => None,
        }
    }

    /// Emailed codes are consumed on redemption; the two-factor secret is a
    /// standing credential re-validated on every login.
    pub(crate) const fn single_use(self) -> bool {
        !matches!(self, Self::TwoFactor)
    }
}

/// URLs handed back to the caller for delivery; nothing is sent from here.
pub(super) struct PreparedVerification {
    pub(super) redirect_to: Url,
    pub(super) verify_url: Url,
    pub(super) otp: String,
    pub(super) secret: String,
}

fn verify_base_url(
    base_url: &str,
    verification_type: VerificationType,
    target: &str,
    redirect_to: Option<&str>,
) -> Result<Url> {
    let base = Url::parse(base_url).context("invalid base URL")?;
    let mut url = base.join("/verify").context("invalid verify URL")?;
    url.query_pairs_mut()
        .append_pair("type", verification_type.as_str())
        .append_pair("target", target);
    if let Some(redirect_to) = redirect_to {
        url.query_pairs_mut().append_pair("redirectTo", redirect_to);
    }
    Ok(url)
}

/// Issue (or re-issue) the one outstanding code for `(target, type)`.
///
/// Upsert semantics mean a second `prepare` for the same pair silently
/// invalidates the first code. Returns the URLs for the caller to deliver;
/// the `verify_url` additionally carries the code itself.
pub(super) async fn prepare_verification(
    pool: &PgPool,
    state: &AuthState,
    verification_type: VerificationType,
    target: &str,
    period_seconds: i64,
    redirect_to: Option<&str>,
) -> Result<PreparedVerification> {
    let secret = otp::generate_secret()?;
    let config = OtpConfig::sha256(period_seconds);
    let code = otp::generate_totp(&secret, &config)?;

    // Emailed codes expire with their period; the two-factor secret is a
    // standing record with no expiry at all.
    let expires_at: Option<DateTime<Utc>> = verification_type
        .single_use()
        .then(|| Utc::now() + Duration::seconds(period_seconds));

    upsert_verification(
        pool,
        verification_type,
        target,
        &secret,
        config.algorithm.as_str(),
        i16::try_from(config.digits).context("code length out of range")?,
        period_seconds,
        &config.char_set,
        expires_at,
    )
    .await?;

    let redirect_to_url =
        verify_base_url(state.config().base_url(), verification_type, target, redirect_to)?;
    let mut verify_url = redirect_to_url.clone();
    verify_url.query_pairs_mut().append_pair("code", &code);

    Ok(PreparedVerification {
        redirect_to: redirect_to_url,
        verify_url,
        otp: code,
        secret,
    })
}

/// Whether `code` currently redeems the `(target, type)` record.
///
/// Absent or expired records simply answer `false`; nothing about the
/// failure reason leaks, and the lookup has no side effects.
pub(crate) async fn is_code_valid(
    pool: &PgPool,
    code: &str,
    verification_type: VerificationType,
    target: &str,
) -> Result<bool> {
    let Some(record) = lookup_live_verification(pool, target, verification_type).await? else {
        return Ok(false);
    };
    let Some(algorithm) = OtpAlgorithm::parse(&record.algorithm) else {
        return Ok(false);
    };
    let config = OtpConfig {
        algorithm,
        digits: usize::try_from(record.digits).unwrap_or(CODE_LENGTH),
        period_seconds: record.period_seconds,
        char_set: record.char_set,
    };
    // Corrupt secret material counts as a mismatch, not an error.
    Ok(otp::verify_totp(code, &record.secret, &config).unwrap_or(false))
}

/// Result of validating a `/verify` submission.
pub(super) enum VerifyOutcome {
    /// Schema or code validation failed; field errors attached.
    Invalid(Submission),
    /// The type has no continuation wired up.
    Unsupported(VerificationType),
    /// Onboarding code redeemed; the email may proceed to signup.
    Onboarding {
        email: String,
        redirect_to: Option<String>,
    },
}

/// Validate a submission and, for single-use types, redeem the record.
///
/// The delete and the type continuation share one transaction so a crash in
/// between cannot strand a consumed-but-unfinished verification, and a
/// concurrent second redemption loses the delete race and is told its code
/// is invalid.
pub(super) async fn validate_request(
    pool: &PgPool,
    request: &VerifyRequest,
) -> Result<VerifyOutcome> {
    let code = request.code.trim();
    let target = request.target.trim();

    let mut submission = Submission::new();
    if code.chars().count() != CODE_LENGTH {
        submission.add_field_error("code", "Invalid code");
    }
    if target.is_empty() {
        submission.add_field_error("target", "Target is required");
    }
    let Some(verification_type) = VerificationType::parse(request.verification_type.trim()) else {
        submission.add_field_error("type", "Invalid verification type");
        return Ok(VerifyOutcome::Invalid(submission));
    };
    if submission.has_errors() {
        return Ok(VerifyOutcome::Invalid(submission));
    }

    // Async refinement: a failed code check is a field error on `code`,
    // indistinguishable whether the record is missing, expired, or mismatched.
    if !is_code_valid(pool, code, verification_type, target).await? {
        submission.add_field_error("code", "Invalid code");
        return Ok(VerifyOutcome::Invalid(submission));
    }

    match verification_type {
        VerificationType::Onboarding => {
            let mut tx = pool
                .begin()
                .await
                .context("begin verification transaction")?;
            let deleted = delete_verification(&mut tx, target, verification_type).await?;
            if !deleted {
                // A concurrent redemption consumed the record first.
                let _ = tx.rollback().await;
                submission.add_field_error("code", "Invalid code");
                return Ok(VerifyOutcome::Invalid(submission));
            }
            tx.commit()
                .await
                .context("commit verification transaction")?;
            Ok(VerifyOutcome::Onboarding {
                email: target.to_string(),
                redirect_to: request.redirect_to.clone(),
            })
        }
        VerificationType::ResetPassword
        | VerificationType::ChangeEmail
        | VerificationType::TwoFactor => Ok(VerifyOutcome::Unsupported(verification_type)),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/verify",
    request_body = VerifyRequest,
    responses(
        (status = 200, description = "Code redeemed", body = VerifyResponse),
        (status = 400, description = "Invalid submission", body = super::submission::SubmissionReply),
        (status = 429, description = "Rate limited", body = String)
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyRequest>>,
) -> impl IntoResponse {
    let request: VerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let client_ip = extract_client_ip(&headers);
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Verify)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }
    if auth_state
        .rate_limiter()
        .check_target(request.target.trim(), RateLimitAction::Verify)
        == RateLimitDecision::Limited
    {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string()).into_response();
    }

    match validate_request(&pool, &request).await {
        Ok(VerifyOutcome::Invalid(submission)) => submission.into_response(),
        Ok(VerifyOutcome::Unsupported(verification_type)) => Submission::form_error(&format!(
            "Unsupported verification type: {}",
            verification_type.as_str()
        ))
        .into_response(),
        Ok(VerifyOutcome::Onboarding { email, redirect_to }) => {
            // Hand the verified email to the signup flow via its own signed,
            // short-lived cookie.
            match onboarding_cookie(&auth_state, &email, redirect_to.as_deref()) {
                Ok(cookie) => {
                    let mut response_headers = HeaderMap::new();
                    response_headers.insert(SET_COOKIE, cookie);
                    (
                        StatusCode::OK,
                        response_headers,
                        Json(VerifyResponse {
                            redirect_to: "/onboarding".to_string(),
                        }),
                    )
                        .into_response()
                }
                Err(err) => {
                    error!("Failed to issue onboarding cookie: {err}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Verification failed".to_string(),
                    )
                        .into_response()
                }
            }
        }
        Err(err) => {
            error!("Verification failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Verification failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Enroll a standing two-factor secret for the authenticated user.
///
/// The record is keyed by the user id, never expires, and is re-issued
/// wholesale on repeat enrollment (upsert). Validating login codes against
/// it is a separate, not-yet-wired flow.
#[utoipa::path(
    post,
    path = "/v1/auth/two-factor",
    responses(
        (status = 200, description = "Two-factor secret enrolled", body = TwoFactorEnrollResponse),
        (status = 303, description = "Not authenticated")
    ),
    tag = "auth"
)]
pub async fn enroll_two_factor(
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

    match prepare_verification(
        &pool,
        &auth_state,
        VerificationType::TwoFactor,
        &user_id.to_string(),
        TWO_FACTOR_PERIOD_SECONDS,
        None,
    )
    .await
    {
        Ok(prepared) => (
            StatusCode::OK,
            Json(TwoFactorEnrollResponse {
                secret: prepared.secret,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to enroll two-factor secret: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Enrollment failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> Result<PgPool> {
        Ok(PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?)
    }

    fn request(code: &str, verification_type: &str, target: &str) -> VerifyRequest {
        VerifyRequest {
            code: code.to_string(),
            verification_type: verification_type.to_string(),
            target: target.to_string(),
            redirect_to: None,
        }
    }

    #[test]
    fn type_tags_round_trip() {
        for verification_type in [
            VerificationType::Onboarding,
            VerificationType::ResetPassword,
            VerificationType::ChangeEmail,
            VerificationType::TwoFactor,
        ] {
            assert_eq!(
                VerificationType::parse(verification_type.as_str()),
                Some(verification_type)
            );
        }
        assert_eq!(VerificationType::parse("magic-link"), None);
    }

    #[test]
    fn only_two_factor_is_recurring() {
        assert!(VerificationType::Onboarding.single_use());
        assert!(VerificationType::ResetPassword.single_use());
        assert!(VerificationType::ChangeEmail.single_use());
        assert!(!VerificationType::TwoFactor.single_use());
    }

    #[test]
    fn verify_url_embeds_type_target_and_redirect() -> Result<()> {
        let url = verify_base_url(
            "https://sesamo.dev",
            VerificationType::Onboarding,
            "a@x.com",
            Some("/dashboard"),
        )?;
        assert_eq!(url.path(), "/verify");
        let query: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(query.contains(&("type".to_string(), "onboarding".to_string())));
        assert!(query.contains(&("target".to_string(), "a@x.com".to_string())));
        assert!(query.contains(&("redirectTo".to_string(), "/dashboard".to_string())));
        Ok(())
    }

    #[test]
    fn verify_url_omits_missing_redirect() -> Result<()> {
        let url = verify_base_url(
            "https://sesamo.dev",
            VerificationType::TwoFactor,
            "user-id",
            None,
        )?;
        assert!(!url.query().unwrap_or_default().contains("redirectTo"));
        Ok(())
    }

    #[tokio::test]
    async fn short_codes_fail_schema_validation_before_lookup() -> Result<()> {
        // The lazy pool never connects: schema validation must reject first.
        let pool = lazy_pool()?;
        let outcome = validate_request(&pool, &request("AB12", "onboarding", "a@x.com")).await?;
        match outcome {
            VerifyOutcome::Invalid(submission) => {
                assert!(submission.has_errors());
            }
            _ => panic!("expected invalid outcome"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn unknown_types_fail_schema_validation() -> Result<()> {
        let pool = lazy_pool()?;
        let outcome = validate_request(&pool, &request("ABC123", "magic-link", "a@x.com")).await?;
        assert!(matches!(outcome, VerifyOutcome::Invalid(_)));
        Ok(())
    }

    #[tokio::test]
    async fn empty_targets_fail_schema_validation() -> Result<()> {
        let pool = lazy_pool()?;
        let outcome = validate_request(&pool, &request("ABC123", "onboarding", "  ")).await?;
        assert!(matches!(outcome, VerifyOutcome::Invalid(_)));
        Ok(())
    }

    #[tokio::test]
    async fn enroll_two_factor_requires_a_session() -> Result<()> {
        let pool = lazy_pool()?;
        let state = super::super::tests::auth_state()?;
        let uri: Uri = "/v1/auth/two-factor".parse()?;
        let response = enroll_two_factor(HeaderMap::new(), uri, Extension(pool), Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        Ok(())
    }

    #[tokio::test]
    async fn verify_missing_payload() -> Result<()> {
        let pool = lazy_pool()?;
        let state = super::super::tests::auth_state()?;
        let response = verify(
            HeaderMap::new(),
            Extension(pool),
            Extension(state),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}

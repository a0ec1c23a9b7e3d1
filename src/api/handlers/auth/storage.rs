//! Database helpers for users, credentials, sessions, and verifications.
//!
//! This is the only module that talks to the store. All operations are
//! single-row atomic; multi-row invariants (user + credential + session at
//! signup, verification delete + finalize at redemption) run inside explicit
//! transactions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::unique_violation_field;
use super::verification::VerificationType;

/// Outcome when attempting to create a new user + credential + session.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created { user_id: Uuid, session: SessionRow },
    Conflict { field: &'static str },
}

/// A freshly created session row.
#[derive(Debug, Clone)]
pub(crate) struct SessionRow {
    pub(crate) id: Uuid,
    pub(crate) expiration_date: DateTime<Utc>,
}

/// Minimal fields needed to check a login attempt.
pub(super) struct CredentialRow {
    pub(super) user_id: Uuid,
    pub(super) password_hash: String,
}

/// Identity attached to a live session.
pub(crate) struct SessionUser {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) username: String,
}

/// Full profile for authenticated reads.
pub(crate) struct UserProfile {
    pub(crate) id: Uuid,
    pub(crate) email: String,
    pub(crate) username: String,
    pub(crate) name: String,
    pub(crate) roles: Vec<String>,
}

/// Stored one-time-code material for a `(target, type)` pair.
pub(super) struct VerificationRow {
    pub(super) secret: String,
    pub(super) algorithm: String,
    pub(super) digits: i16,
    pub(super) period_seconds: i64,
    pub(super) char_set: String,
}

pub(super) async fn lookup_user_id_by_email(pool: &PgPool, email: &str) -> Result<Option<Uuid>> {
    let query = "SELECT id FROM users WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.map(|row| row.get("id")))
}

pub(super) async fn lookup_credential_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<CredentialRow>> {
    let query = r"
        SELECT users.id, user_passwords.password_hash
        FROM users
        JOIN user_passwords ON user_passwords.user_id = users.id
        WHERE users.username = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credential")?;

    Ok(row.map(|row| CredentialRow {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
    }))
}

/// Create user, credential, and first session in one transaction.
///
/// A unique violation on email/username is an expected concurrent-signup
/// outcome and is surfaced as a field-level conflict, not an error.
pub(super) async fn create_user_with_session(
    pool: &PgPool,
    email: &str,
    username: &str,
    name: &str,
    password_hash: &str,
    session_lifetime_seconds: i64,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let query = r"
        INSERT INTO users (email, username, name, roles)
        VALUES ($1, $2, $3, ARRAY['user'])
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(username)
        .bind(name)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if let Some(field) = unique_violation_field(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict { field });
            }
            return Err(err).context("failed to insert user");
        }
    };

    let query = r"
        INSERT INTO user_passwords (user_id, password_hash)
        VALUES ($1, $2)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert credential")?;

    let query = r"
        INSERT INTO sessions (user_id, expiration_date)
        VALUES ($1, NOW() + ($2 * INTERVAL '1 second'))
        RETURNING id, expiration_date
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(session_lifetime_seconds)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert session")?;

    let session = SessionRow {
        id: row.get("id"),
        expiration_date: row.get("expiration_date"),
    };

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created { user_id, session })
}

/// Insert a session row for an existing user (login path).
pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    session_lifetime_seconds: i64,
) -> Result<SessionRow> {
    let query = r"
        INSERT INTO sessions (user_id, expiration_date)
        VALUES ($1, NOW() + ($2 * INTERVAL '1 second'))
        RETURNING id, expiration_date
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(session_lifetime_seconds)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;

    Ok(SessionRow {
        id: row.get("id"),
        expiration_date: row.get("expiration_date"),
    })
}

/// Owner of a session, only while the row is still live.
pub(super) async fn lookup_live_session(pool: &PgPool, session_id: Uuid) -> Result<Option<Uuid>> {
    let query = r"
        SELECT user_id
        FROM sessions
        WHERE id = $1
          AND expiration_date > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Session owner joined with identity fields, only while live.
pub(super) async fn lookup_session_user(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<Option<SessionUser>> {
    let query = r"
        SELECT users.id, users.email, users.username
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.id = $1
          AND sessions.expiration_date > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session user")?;

    Ok(row.map(|row| SessionUser {
        user_id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, session_id: Uuid) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM sessions WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(crate) async fn lookup_user_profile(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<UserProfile>> {
    let query = r"
        SELECT id, email, username, name, roles
        FROM users
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user profile")?;

    Ok(row.map(|row| UserProfile {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        name: row.get("name"),
        roles: row.get("roles"),
    }))
}

/// Upsert the one live verification record for `(target, type)`.
///
/// Issuing a new code replaces any outstanding one for the same pair.
#[allow(clippy::too_many_arguments)]
pub(super) async fn upsert_verification(
    pool: &PgPool,
    verification_type: VerificationType,
    target: &str,
    secret: &str,
    algorithm: &str,
    digits: i16,
    period_seconds: i64,
    char_set: &str,
    expires_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let query = r"
        INSERT INTO verifications
            (verification_type, target, secret, algorithm, digits, period_seconds, char_set, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
        ON CONFLICT (target, verification_type) DO UPDATE
        SET secret = EXCLUDED.secret,
            algorithm = EXCLUDED.algorithm,
            digits = EXCLUDED.digits,
            period_seconds = EXCLUDED.period_seconds,
            char_set = EXCLUDED.char_set,
            expires_at = EXCLUDED.expires_at,
            created_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(verification_type.as_str())
        .bind(target)
        .bind(secret)
        .bind(algorithm)
        .bind(digits)
        .bind(period_seconds)
        .bind(char_set)
        .bind(expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert verification")?;
    Ok(())
}

/// Fetch the live record for `(target, type)`; expired records are invisible.
pub(super) async fn lookup_live_verification(
    pool: &PgPool,
    target: &str,
    verification_type: VerificationType,
) -> Result<Option<VerificationRow>> {
    let query = r"
        SELECT secret, algorithm, digits, period_seconds, char_set
        FROM verifications
        WHERE target = $1
          AND verification_type = $2
          AND (expires_at IS NULL OR expires_at > NOW())
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(target)
        .bind(verification_type.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup verification")?;

    Ok(row.map(|row| VerificationRow {
        secret: row.get("secret"),
        algorithm: row.get("algorithm"),
        digits: row.get("digits"),
        period_seconds: row.get("period_seconds"),
        char_set: row.get("char_set"),
    }))
}

/// Delete the record for `(target, type)` inside a redemption transaction.
///
/// Returns false when another redemption already consumed it; the losing
/// request must treat its code as invalid.
pub(super) async fn delete_verification(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    target: &str,
    verification_type: VerificationType,
) -> Result<bool> {
    let query = r"
        DELETE FROM verifications
        WHERE target = $1
          AND verification_type = $2
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(target)
        .bind(verification_type.as_str())
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete verification")?;
    Ok(result.rows_affected() > 0)
}

/// Enqueue an email in the transactional outbox for the background worker.
pub(super) async fn enqueue_email(
    pool: &PgPool,
    to_email: &str,
    template: &str,
    payload_json: &serde_json::Value,
) -> Result<()> {
    let payload_text =
        serde_json::to_string(payload_json).context("failed to serialize email payload")?;
    let query = r"
        INSERT INTO email_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_email)
        .bind(template)
        .bind(payload_text)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert email outbox row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{CredentialRow, SessionRow, SignupOutcome};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn signup_outcome_debug_names() {
        let outcome = SignupOutcome::Conflict { field: "email" };
        assert!(format!("{outcome:?}").contains("Conflict"));
        let outcome = SignupOutcome::Created {
            user_id: Uuid::nil(),
            session: SessionRow {
                id: Uuid::nil(),
                expiration_date: Utc::now(),
            },
        };
        assert!(format!("{outcome:?}").contains("Created"));
    }

    #[test]
    fn credential_row_holds_values() {
        let row = CredentialRow {
            user_id: Uuid::nil(),
            password_hash: "$2b$10$hash".to_string(),
        };
        assert_eq!(row.user_id, Uuid::nil());
        assert_eq!(row.password_hash, "$2b$10$hash");
    }
}

//! Password hashing and verification.

use anyhow::{Context, Result};

/// Fixed bcrypt work factor.
const HASH_COST: u32 = 10;

/// A syntactically valid hash that matches nothing we ever store. Verifying
/// against it keeps login timing uniform when the username is unknown.
pub(super) const DUMMY_HASH: &str =
    "$2a$10$N9qo8uLOickgx2ZMRZoMyeIjZAgcfl7p92ldGxad68LJZdL17lhWy";

/// Hash a password with the fixed work factor.
///
/// Hashing is CPU-bound, so it runs on the blocking pool and the request
/// task suspends cooperatively.
///
/// # Errors
/// Returns an error if the hashing task fails.
pub(crate) async fn hash_password(password: &str) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")
}

/// Constant-time comparison of a password against a stored hash.
///
/// Malformed hashes and task failures count as a failed match; login never
/// distinguishes "bad hash" from "bad password".
pub(crate) async fn verify_password(password: &str, password_hash: &str) -> bool {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    match tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash)).await {
        Ok(Ok(valid)) => valid,
        Ok(Err(_)) | Err(_) => false,
    }
}

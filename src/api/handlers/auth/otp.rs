//! One-time-code generation and validation.
//!
//! Codes are TOTP-style (RFC 4226 truncation over an HMAC digest) but are
//! rendered over a configurable alphabet instead of decimal digits, so a
//! six-character emailed code carries more entropy than a six-digit one.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

/// Emailed codes are always exactly this long.
pub(crate) const CODE_LENGTH: usize = 6;

/// Leaving off 0, O, 1 and I on purpose to avoid confusing users.
pub(crate) const CODE_CHAR_SET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// One time-step of clock skew is tolerated on either side.
const VALIDATION_WINDOW: i64 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OtpAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl OtpAlgorithm {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha512 => "SHA-512",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "SHA-1" => Some(Self::Sha1),
            "SHA-256" => Some(Self::Sha256),
            "SHA-512" => Some(Self::Sha512),
            _ => None,
        }
    }
}

/// Everything needed to re-derive a code later: the record stores these
/// fields next to the secret so validation uses whatever the issuer used.
#[derive(Clone, Debug)]
pub(crate) struct OtpConfig {
    pub(crate) algorithm: OtpAlgorithm,
    pub(crate) digits: usize,
    pub(crate) period_seconds: i64,
    pub(crate) char_set: String,
}

impl OtpConfig {
    /// Default configuration for emailed verification codes.
    pub(crate) fn sha256(period_seconds: i64) -> Self {
        Self {
            algorithm: OtpAlgorithm::Sha256,
            digits: CODE_LENGTH,
            period_seconds,
            char_set: CODE_CHAR_SET.to_string(),
        }
    }
}

/// Create fresh secret material, returned base64url-encoded for storage.
pub(crate) fn generate_secret() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate verification secret")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(secret)
        .context("invalid verification secret encoding")
}

fn hmac_digest(algorithm: OtpAlgorithm, key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    match algorithm {
        OtpAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key)
                .map_err(|_| anyhow!("invalid HMAC key length"))?;
            mac.update(message);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        OtpAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key)
                .map_err(|_| anyhow!("invalid HMAC key length"))?;
            mac.update(message);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        OtpAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key)
                .map_err(|_| anyhow!("invalid HMAC key length"))?;
            mac.update(message);
            Ok(mac.finalize().into_bytes().to_vec())
        }
    }
}

/// Map the truncated 31-bit value onto the configured alphabet.
fn render_code(truncated: u32, digits: usize, char_set: &str) -> Result<String> {
    let alphabet: Vec<char> = char_set.chars().collect();
    let radix = u32::try_from(alphabet.len()).context("alphabet too large")?;
    if radix < 2 {
        return Err(anyhow!("alphabet must contain at least two characters"));
    }

    let mut value = truncated;
    let mut code = String::with_capacity(digits);
    for _ in 0..digits {
        let index = usize::try_from(value % radix).context("alphabet index")?;
        code.push(*alphabet.get(index).context("alphabet index out of range")?);
        value /= radix;
    }
    Ok(code)
}

fn hotp(secret: &[u8], counter: u64, config: &OtpConfig) -> Result<String> {
    let digest = hmac_digest(config.algorithm, secret, &counter.to_be_bytes())?;

    // RFC 4226 dynamic truncation: low nibble of the last byte selects the
    // offset of a 31-bit big-endian slice.
    let offset = usize::from(digest.last().copied().unwrap_or_default() & 0x0f);
    let slice = digest
        .get(offset..offset + 4)
        .context("digest too short for truncation")?;
    let truncated = u32::from_be_bytes([slice[0] & 0x7f, slice[1], slice[2], slice[3]]);

    render_code(truncated, config.digits, &config.char_set)
}

/// Code for an explicit timestamp; used by validation and by tests.
pub(crate) fn totp_at(secret: &str, config: &OtpConfig, unix_seconds: i64) -> Result<String> {
    let period = config.period_seconds.max(1);
    let counter = u64::try_from(unix_seconds / period).unwrap_or_default();
    hotp(&decode_secret(secret)?, counter, config)
}

/// Current code for the secret, e.g. to embed in a verification URL.
pub(crate) fn generate_totp(secret: &str, config: &OtpConfig) -> Result<String> {
    totp_at(secret, config, Utc::now().timestamp())
}

/// Validate a code at an explicit timestamp with a ±1 time-step window.
///
/// Returns only a boolean; callers never learn why a code failed.
pub(crate) fn verify_totp_at(
    code: &str,
    secret: &str,
    config: &OtpConfig,
    unix_seconds: i64,
) -> Result<bool> {
    let period = config.period_seconds.max(1);
    let counter = unix_seconds / period;
    let secret = decode_secret(secret)?;

    let mut valid = false;
    for delta in -VALIDATION_WINDOW..=VALIDATION_WINDOW {
        let Some(step) = counter
            .checked_add(delta)
            .and_then(|step| u64::try_from(step).ok())
        else {
            continue;
        };
        let candidate = hotp(&secret, step, config)?;
        valid |= bool::from(candidate.as_bytes().ct_eq(code.as_bytes()));
    }
    Ok(valid)
}

/// Validate a code against the current clock.
pub(crate) fn verify_totp(code: &str, secret: &str, config: &OtpConfig) -> Result<bool> {
    verify_totp_at(code, secret, config, Utc::now().timestamp())
}

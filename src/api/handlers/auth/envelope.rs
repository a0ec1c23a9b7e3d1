//! Signed cookie envelopes.
//!
//! Cookies never carry raw state: the JSON payload is base64url-encoded and
//! HMAC-SHA-256 signed. Multiple secrets can be configured so they can be
//! rotated: the first secret signs new envelopes, every secret is tried when
//! verifying incoming ones.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Serialize, de::DeserializeOwned};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Ordered signing secrets for cookie envelopes.
#[derive(Debug)]
pub struct CookieSecrets {
    secrets: Vec<SecretString>,
}

impl CookieSecrets {
    /// Build from explicit secrets; at least one is required.
    ///
    /// # Errors
    /// Returns an error when the list is empty.
    pub fn new(secrets: Vec<SecretString>) -> Result<Self> {
        if secrets.is_empty() {
            return Err(anyhow!("at least one cookie signing secret is required"));
        }
        Ok(Self { secrets })
    }

    /// Build from a comma-separated list, newest secret first.
    ///
    /// # Errors
    /// Returns an error when no non-empty secret remains after trimming.
    pub fn from_csv(raw: &str) -> Result<Self> {
        let secrets = raw
            .split(',')
            .map(str::trim)
            .filter(|secret| !secret.is_empty())
            .map(|secret| SecretString::from(secret.to_string()))
            .collect();
        Self::new(secrets)
    }

    fn signing_secret(&self) -> Result<&SecretString> {
        self.secrets
            .first()
            .context("cookie secrets list is empty")
    }

    fn all(&self) -> &[SecretString] {
        &self.secrets
    }
}

fn sign(secret: &SecretString, message: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| anyhow!("invalid cookie signing key"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Serialize and sign a payload into a cookie-safe string.
///
/// # Errors
/// Returns an error if serialization or signing fails.
pub(crate) fn seal<T: Serialize>(value: &T, secrets: &CookieSecrets) -> Result<String> {
    let payload = serde_json::to_vec(value).context("failed to serialize cookie payload")?;
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload);
    let signature = sign(secrets.signing_secret()?, payload_b64.as_bytes())?;
    Ok(format!(
        "{payload_b64}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// Verify and deserialize a sealed envelope.
///
/// Returns `None` for anything malformed, unsigned, or signed with an
/// unknown secret; callers treat that the same as an absent cookie.
pub(crate) fn open<T: DeserializeOwned>(raw: &str, secrets: &CookieSecrets) -> Option<T> {
    let (payload_b64, signature_b64) = raw.split_once('.')?;
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

    let verified = secrets.all().iter().any(|secret| {
        sign(secret, payload_b64.as_bytes())
            .map(|expected| bool::from(expected.as_slice().ct_eq(&signature)))
            .unwrap_or(false)
    });
    if !verified {
        return None;
    }

    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    serde_json::from_slice(&payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
    struct Payload {
        session_id: String,
    }

    fn secrets(raw: &str) -> Result<CookieSecrets> {
        CookieSecrets::from_csv(raw)
    }

    #[test]
    fn seal_open_round_trip() -> Result<()> {
        let secrets = secrets("s3cret")?;
        let payload = Payload {
            session_id: "abc".to_string(),
        };
        let sealed = seal(&payload, &secrets)?;
        let opened: Option<Payload> = open(&sealed, &secrets);
        assert_eq!(opened, Some(payload));
        Ok(())
    }

    #[test]
    fn rotation_verifies_with_an_older_secret() -> Result<()> {
        let old = secrets("old-secret")?;
        let rotated = secrets("new-secret,old-secret")?;
        let payload = Payload {
            session_id: "abc".to_string(),
        };

        let sealed_with_old = seal(&payload, &old)?;
        let opened: Option<Payload> = open(&sealed_with_old, &rotated);
        assert_eq!(opened, Some(payload));
        Ok(())
    }

    #[test]
    fn new_envelopes_sign_with_the_first_secret() -> Result<()> {
        let rotated = secrets("new-secret,old-secret")?;
        let only_new = secrets("new-secret")?;
        let payload = Payload {
            session_id: "abc".to_string(),
        };

        let sealed = seal(&payload, &rotated)?;
        let opened: Option<Payload> = open(&sealed, &only_new);
        assert!(opened.is_some());
        Ok(())
    }

    #[test]
    fn tampered_payload_is_rejected() -> Result<()> {
        let secrets = secrets("s3cret")?;
        let sealed = seal(
            &Payload {
                session_id: "abc".to_string(),
            },
            &secrets,
        )?;

        let (payload_b64, signature_b64) = sealed.split_once('.').context("missing dot")?;
        let forged = format!("X{payload_b64}.{signature_b64}");
        let opened: Option<Payload> = open(&forged, &secrets);
        assert_eq!(opened, None);
        Ok(())
    }

    #[test]
    fn unknown_secret_and_garbage_are_rejected() -> Result<()> {
        let signer = secrets("one")?;
        let verifier = secrets("two")?;
        let sealed = seal(
            &Payload {
                session_id: "abc".to_string(),
            },
            &signer,
        )?;

        assert_eq!(open::<Payload>(&sealed, &verifier), None);
        assert_eq!(open::<Payload>("no-dot-here", &signer), None);
        assert_eq!(open::<Payload>("a.b", &signer), None);
        Ok(())
    }

    #[test]
    fn empty_secret_lists_are_rejected() {
        assert!(CookieSecrets::from_csv("").is_err());
        assert!(CookieSecrets::from_csv(" , ,").is_err());
        assert!(CookieSecrets::new(Vec::new()).is_err());
    }
}

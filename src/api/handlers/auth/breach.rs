//! Breach-password lookup against a k-anonymity range service.
//!
//! Only the first five characters of the password's SHA-1 fingerprint are
//! sent over the wire; the service answers with every known suffix in that
//! range and the match happens locally. The check is advisory: any failure
//! (timeout, non-2xx, transport error) resolves to "not breached" so an
//! unavailable corpus never blocks signup or reset.

use sha1::{Digest, Sha1};
use std::fmt::Write;
use std::time::Duration;
use tracing::warn;

use super::state::AuthState;

/// Split the uppercase SHA-1 hex of the raw password into the 5-character
/// range prefix and the 35-character suffix.
pub(super) fn password_hash_parts(password: &str) -> (String, String) {
    let digest = Sha1::digest(password.as_bytes());
    let hex = digest.iter().fold(String::new(), |mut hex, byte| {
        let _ = write!(hex, "{byte:02X}");
        hex
    });
    let (prefix, suffix) = hex.split_at(5);
    (prefix.to_string(), suffix.to_string())
}

/// Scan the `suffix:count` lines returned by the range service.
fn suffix_in_range(body: &str, suffix: &str) -> bool {
    body.lines().any(|line| {
        line.split(':')
            .next()
            .is_some_and(|candidate| candidate.trim().eq_ignore_ascii_case(suffix))
    })
}

/// Whether the password appears in the compromised-password corpus.
///
/// Fails open: a `false` answer may simply mean the service was unreachable
/// within the timeout budget.
pub(crate) async fn is_common_password(state: &AuthState, password: &str) -> bool {
    let (prefix, suffix) = password_hash_parts(password);
    let url = format!(
        "{}/range/{prefix}",
        state.config().breach_range_url().trim_end_matches('/')
    );
    let timeout = Duration::from_millis(state.config().breach_timeout_millis());

    let response = match state.http_client().get(&url).timeout(timeout).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("breach range lookup failed: {err}");
            return false;
        }
    };

    if !response.status().is_success() {
        warn!(
            status = %response.status(),
            "breach range lookup returned an error status"
        );
        return false;
    }

    match response.text().await {
        Ok(body) => suffix_in_range(&body, &suffix),
        Err(err) => {
            warn!("breach range body read failed: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_parts_match_the_known_sha1_of_password() {
        // SHA-1("password") = 5BAA61E4C9B93F3F0682250B6CF8331B7EE68FD8
        let (prefix, suffix) = password_hash_parts("password");
        assert_eq!(prefix, "5BAA6");
        assert_eq!(suffix, "1E4C9B93F3F0682250B6CF8331B7EE68FD8");
    }

    #[test]
    fn hash_parts_have_fixed_widths() {
        let (prefix, suffix) = password_hash_parts("Sup3rSecret!");
        assert_eq!(prefix.len(), 5);
        assert_eq!(suffix.len(), 35);
    }

    #[test]
    fn suffix_scan_matches_exact_lines_only() {
        let body = "0018A45C4D1DEF81644B54AB7F969B88D65:1\n\
                    1E4C9B93F3F0682250B6CF8331B7EE68FD8:3861493\n\
                    011053FD0102E94D6AE2F8B83D76FAF94F6:1";
        assert!(suffix_in_range(body, "1E4C9B93F3F0682250B6CF8331B7EE68FD8"));
        assert!(suffix_in_range(
            body,
            "1e4c9b93f3f0682250b6cf8331b7ee68fd8"
        ));
        assert!(!suffix_in_range(body, "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF"));
    }

    #[test]
    fn suffix_scan_handles_crlf_and_garbage() {
        let body = "AAAA:1\r\nBBBB:2\r\nnot-a-line";
        assert!(suffix_in_range(body, "BBBB"));
        assert!(!suffix_in_range(body, "CCCC"));
    }
}

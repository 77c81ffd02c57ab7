//! Webhook request authentication.
//!
//! ClickUp deliveries are checked against a shared secret sent verbatim in
//! `X-Signature`. GitHub deliveries carry `X-Hub-Signature-256`, an
//! HMAC-SHA256 of the raw body. Both comparisons are constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const GITHUB_PREFIX: &str = "sha256=";

/// Compare a provided shared secret with the configured one.
pub fn verify_shared_secret(expected: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Compute the `X-Hub-Signature-256` header value for `body`.
pub fn github_signature(secret: &str, body: &[u8]) -> Result<String, String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| format!("invalid webhook secret: {err}"))?;
    mac.update(body);
    Ok(format!("{GITHUB_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Check a GitHub `X-Hub-Signature-256` header against `body`.
pub fn verify_github_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(provided) = header.and_then(|h| h.strip_prefix(GITHUB_PREFIX)) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    if computed.len() != provided.len() {
        return false;
    }
    computed.as_slice().ct_eq(provided.as_slice()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret() {
        assert!(verify_shared_secret("s3cret", Some("s3cret")));
        assert!(!verify_shared_secret("s3cret", Some("s3creT")));
        assert!(!verify_shared_secret("s3cret", Some("s3cret-longer")));
        assert!(!verify_shared_secret("s3cret", None));
    }

    #[test]
    fn test_github_signature_known_vector() {
        // Example from GitHub's webhook validation documentation.
        let signature = github_signature("It's a Secret to Everybody", b"Hello, World!").unwrap();
        assert_eq!(
            signature,
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_verify_github_signature() {
        let body = br#"{"action":"opened"}"#;
        let header = github_signature("topsecret", body).unwrap();
        assert!(verify_github_signature("topsecret", body, Some(&header)));
        assert!(!verify_github_signature("othersecret", body, Some(&header)));
        assert!(!verify_github_signature("topsecret", b"{}", Some(&header)));
        assert!(!verify_github_signature("topsecret", body, Some("sha256=zz")));
        assert!(!verify_github_signature("topsecret", body, Some("sha1=abcd")));
        assert!(!verify_github_signature("topsecret", body, None));
    }
}

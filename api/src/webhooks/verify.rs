//! Webhook signature verification (SPEC_FULL.md C10, §4.9 step 1).
//!
//! Each provider signs (or shares a secret for) the raw request body in a
//! different shape: GitHub sends a `sha256=<hex>`-prefixed HMAC, GitLab a
//! bare hex HMAC digest, Bitbucket a plain shared-secret header. A missing
//! *configured* secret is an explicit bypass (useful against providers a
//! deployment doesn't sign against locally), not a rejection; an unknown
//! provider is always rejected.
//!
//! Grounded on `mr-reviewer::errors`'s provider-aware error taxonomy style;
//! HMAC computation reuses the `sha2` dependency already in the workspace
//! (`mr-reviewer`'s `Cargo.toml`), adding `hmac` alongside it for the MAC.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookProvider {
    Github,
    Gitlab,
    Bitbucket,
}

/// Verifies `body` against the signature/secret header for `provider`.
///
/// Returns `true` when the signature checks out, no secret is configured
/// (bypass), or the specific scheme for `provider` doesn't require a
/// signature at all. Returns `false` on any mismatch.
pub fn verify_signature(
    provider: WebhookProvider,
    secret: Option<&str>,
    header_value: Option<&str>,
    body: &[u8],
) -> bool {
    let Some(secret) = secret else {
        // No secret configured for this provider: explicit opt-out.
        return true;
    };

    let Some(header_value) = header_value else {
        return false;
    };

    match provider {
        WebhookProvider::Github => {
            let Some(hex_digest) = header_value.strip_prefix("sha256=") else {
                return false;
            };
            verify_hmac_sha256(secret, body, hex_digest)
        }
        WebhookProvider::Gitlab => verify_hmac_sha256(secret, body, header_value),
        WebhookProvider::Bitbucket => constant_time_eq(secret.as_bytes(), header_value.as_bytes()),
    }
}

fn verify_hmac_sha256(secret: &str, body: &[u8], expected_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let computed = mac.finalize().into_bytes();
    let computed_hex = hex_encode(&computed);
    constant_time_eq(computed_hex.as_bytes(), expected_hex.as_bytes())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// Constant-time comparison: always walks the full length of `a` so the
/// comparison doesn't short-circuit on the first mismatching byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_sig(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex_encode(&mac.finalize().into_bytes()))
    }

    #[test]
    fn missing_secret_bypasses_verification() {
        assert!(verify_signature(WebhookProvider::Github, None, None, b"{}"));
    }

    #[test]
    fn github_accepts_matching_prefixed_hmac() {
        let body = br#"{"action":"opened"}"#;
        let sig = github_sig("s3cr3t", body);
        assert!(verify_signature(WebhookProvider::Github, Some("s3cr3t"), Some(&sig), body));
    }

    #[test]
    fn github_rejects_tampered_body() {
        let body = br#"{"action":"opened"}"#;
        let sig = github_sig("s3cr3t", body);
        assert!(!verify_signature(
            WebhookProvider::Github,
            Some("s3cr3t"),
            Some(&sig),
            b"{\"action\":\"closed\"}"
        ));
    }

    #[test]
    fn github_rejects_missing_prefix() {
        let body = br#"{"action":"opened"}"#;
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(body);
        let bare_hex = hex_encode(&mac.finalize().into_bytes());
        assert!(!verify_signature(WebhookProvider::Github, Some("s3cr3t"), Some(&bare_hex), body));
    }

    #[test]
    fn gitlab_accepts_bare_hmac_digest() {
        let body = br#"{"object_kind":"merge_request"}"#;
        let mut mac = HmacSha256::new_from_slice(b"glsecret").unwrap();
        mac.update(body);
        let bare_hex = hex_encode(&mac.finalize().into_bytes());
        assert!(verify_signature(WebhookProvider::Gitlab, Some("glsecret"), Some(&bare_hex), body));
    }

    #[test]
    fn bitbucket_accepts_exact_shared_secret() {
        assert!(verify_signature(
            WebhookProvider::Bitbucket,
            Some("shared"),
            Some("shared"),
            b"irrelevant"
        ));
        assert!(!verify_signature(
            WebhookProvider::Bitbucket,
            Some("shared"),
            Some("wrong"),
            b"irrelevant"
        ));
    }

    #[test]
    fn missing_header_with_configured_secret_is_rejected() {
        assert!(!verify_signature(WebhookProvider::Github, Some("s3cr3t"), None, b"{}"));
    }
}

//! Webhook credential verification.

use crate::types::Provider;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the shared secret verbatim on GitLab deliveries.
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";

/// Header carrying the body signature on GitHub deliveries.
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the body signature on Bitbucket deliveries.
pub const BITBUCKET_SIGNATURE_HEADER: &str = "x-hub-signature";

/// Proof of the shared secret presented by an inbound webhook.
#[derive(Clone, Copy)]
pub enum Credential<'a> {
    /// The secret itself.
    Token(&'a str),
    /// `sha256=<hex>` HMAC of the raw body, keyed by the secret.
    Signature {
        /// Signature header value.
        header: &'a str,
        /// Raw request body, exactly as received.
        payload: &'a [u8],
    },
}

impl std::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token([REDACTED])"),
            Self::Signature { payload, .. } => f
                .debug_struct("Signature")
                .field("header", &"[REDACTED]")
                .field("payload_len", &payload.len())
                .finish(),
        }
    }
}

impl<'a> Credential<'a> {
    /// Extracts the credential a provider sends with its deliveries.
    pub fn from_headers(provider: Provider, headers: &'a HeaderMap, payload: &'a [u8]) -> Option<Self> {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        match provider {
            Provider::GitLab => header(GITLAB_TOKEN_HEADER).map(Self::Token),
            Provider::GitHub => header(GITHUB_SIGNATURE_HEADER)
                .map(|header| Self::Signature { header, payload }),
            Provider::Bitbucket => header(BITBUCKET_SIGNATURE_HEADER)
                .map(|header| Self::Signature { header, payload }),
        }
    }

    /// Checks the credential against `secret` in constant time.
    pub fn verify(&self, secret: &str) -> bool {
        match self {
            Self::Token(token) => constant_time_eq(token.as_bytes(), secret.as_bytes()),
            Self::Signature { header, payload } => verify_signature(secret, header, payload),
        }
    }
}

fn verify_signature(secret: &str, header: &str, payload: &[u8]) -> bool {
    let Some(expected) = header.trim().strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(expected) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Computes the `sha256=<hex>` signature of a payload.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_verify_signature() {
        let payload = br#"{"action":"opened"}"#;
        let header = sign("test_secret", payload);

        let credential = Credential::Signature { header: &header, payload };
        assert!(credential.verify("test_secret"));
        assert!(!credential.verify("other_secret"));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let header = sign("secret", b"original");
        let credential = Credential::Signature {
            header: &header,
            payload: b"tampered",
        };
        assert!(!credential.verify("secret"));
    }

    #[test]
    fn test_malformed_signatures_fail() {
        for header in ["sha256=invalid", "sha1=abcd", "", "sha256="] {
            let credential = Credential::Signature { header, payload: b"payload" };
            assert!(!credential.verify("secret"), "accepted {:?}", header);
        }
    }

    #[test]
    fn test_token() {
        assert!(Credential::Token("s3cr3t").verify("s3cr3t"));
        assert!(!Credential::Token("s3cr3").verify("s3cr3t"));
        assert!(!Credential::Token("").verify("s3cr3t"));
    }

    #[test]
    fn test_from_headers_per_provider() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Gitlab-Token", HeaderValue::from_static("tok"));
        headers.insert("X-Hub-Signature-256", HeaderValue::from_static("sha256=00"));

        assert!(matches!(
            Credential::from_headers(Provider::GitLab, &headers, b""),
            Some(Credential::Token("tok"))
        ));
        assert!(matches!(
            Credential::from_headers(Provider::GitHub, &headers, b""),
            Some(Credential::Signature { header: "sha256=00", .. })
        ));
        assert!(Credential::from_headers(Provider::Bitbucket, &headers, b"").is_none());
    }

    #[test]
    fn test_debug_redacts() {
        let debug = format!("{:?}", Credential::Token("s3cr3t"));
        assert!(!debug.contains("s3cr3t"));
    }
}

//! HMAC presigned URLs for object reads.
//!
//! A presigned URL carries its own credential: an expiry timestamp and an
//! HMAC-SHA256 signature over `"{key}\n{expires}"`. The signed GET route
//! accepts any request whose signature checks out and whose expiry has not
//! passed, with no session involved.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use loandesk_common::{Error, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use sha2::Sha256;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Characters escaped inside key paths. `/` stays literal so keys keep
/// their segment structure in the URL.
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'?');

/// Signs and verifies object URLs with a per-deployment secret
#[derive(Debug, Clone)]
pub struct UrlSigner {
    secret: String,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            secret: secret.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Unsigned public URL for a key
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/objects/{}",
            self.base_url,
            utf8_percent_encode(key, KEY_ENCODE_SET)
        )
    }

    /// Time-limited signed URL for a key
    pub fn presign(&self, key: &str, ttl_seconds: i64, now: DateTime<Utc>) -> Result<String> {
        let expires = now.timestamp() + ttl_seconds;
        let signature = self.compute_signature(key, expires)?;
        Ok(format!(
            "{}?expires={}&signature={}",
            self.public_url(key),
            expires,
            signature
        ))
    }

    /// Check a signature presented with a read request.
    ///
    /// Covers the signature only; the caller compares `expires` against the
    /// clock separately.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> bool {
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(signing_input(key, expires).as_bytes());
        let Ok(presented) = hex::decode(signature) else {
            return false;
        };
        mac.verify_slice(&presented).is_ok()
    }

    fn compute_signature(&self, key: &str, expires: i64) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Internal(format!("HMAC setup failed: {}", e)))?;
        mac.update(signing_input(key, expires).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn signing_input(key: &str, expires: i64) -> String {
    format!("{}\n{}", key, expires)
}

/// Pull the object key out of a stored object URL.
///
/// Accepts any absolute URL whose path starts with an `objects` segment; the
/// rest of the path, percent-decoded, is the key. Anything else, including
/// unparseable URLs and empty keys, yields `None`.
pub fn extract_object_key(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let mut segments = url.path_segments()?;
    if segments.next()? != "objects" {
        return None;
    }

    let mut parts = Vec::new();
    for segment in segments {
        let decoded = percent_decode_str(segment).decode_utf8().ok()?;
        parts.push(decoded.into_owned());
    }

    let key = parts.join("/");
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("test-secret", "http://127.0.0.1:5780")
    }

    #[test]
    fn presign_verify_round_trips() {
        let signer = signer();
        let now = Utc::now();
        let url = signer.presign("docs/payslip.pdf", 3600, now).unwrap();

        let parsed = Url::parse(&url).unwrap();
        let expires: i64 = parsed
            .query_pairs()
            .find(|(k, _)| k == "expires")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        let signature = parsed
            .query_pairs()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert_eq!(expires, now.timestamp() + 3600);
        assert!(signer.verify("docs/payslip.pdf", expires, &signature));
    }

    #[test]
    fn tampering_invalidates_signature() {
        let signer = signer();
        let expires = Utc::now().timestamp() + 3600;
        let signature = signer.compute_signature("docs/a.pdf", expires).unwrap();

        assert!(!signer.verify("docs/b.pdf", expires, &signature));
        assert!(!signer.verify("docs/a.pdf", expires + 1, &signature));
        assert!(!signer.verify("docs/a.pdf", expires, "deadbeef"));
        assert!(!signer.verify("docs/a.pdf", expires, "not hex"));
    }

    #[test]
    fn different_secret_fails_verification() {
        let a = signer();
        let b = UrlSigner::new("other-secret", "http://127.0.0.1:5780");
        let expires = Utc::now().timestamp() + 60;
        let signature = a.compute_signature("k", expires).unwrap();

        assert!(!b.verify("k", expires, &signature));
    }

    #[test]
    fn public_url_escapes_spaces_but_not_slashes() {
        let signer = signer();
        assert_eq!(
            signer.public_url("uploads/my report.pdf"),
            "http://127.0.0.1:5780/objects/uploads/my%20report.pdf"
        );
    }

    #[test]
    fn trailing_slash_in_base_url_is_trimmed() {
        let signer = UrlSigner::new("s", "http://example.com/");
        assert_eq!(signer.public_url("k"), "http://example.com/objects/k");
    }

    #[test]
    fn extracts_key_from_object_url() {
        assert_eq!(
            extract_object_key("http://127.0.0.1:5780/objects/uploads/my%20report.pdf"),
            Some("uploads/my report.pdf".to_string())
        );
        assert_eq!(
            extract_object_key("https://cdn.example.com/objects/1712-a.pdf?expires=1&signature=x"),
            Some("1712-a.pdf".to_string())
        );
    }

    #[test]
    fn rejects_urls_outside_the_object_space() {
        assert!(extract_object_key("not a url").is_none());
        assert!(extract_object_key("http://h/other/a.pdf").is_none());
        assert!(extract_object_key("http://h/objects/").is_none());
        assert!(extract_object_key("http://h/objects").is_none());
    }
}

//! Shared-secret checks for the three provider conventions

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Prefix GitHub puts in front of the hex digest in `X-Hub-Signature`.
pub const GITHUB_SIGNATURE_PREFIX: &str = "sha1=";

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Lowercase hex HMAC-SHA1 of `payload`.
pub fn hmac_sha1_hex(secret: &str, payload: &[u8]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time equality. Only the length check short-circuits.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Gitea: `X-Gitea-Signature` is the bare hex HMAC-SHA256 of the body.
pub fn verify_gitea_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    match hmac_sha256_hex(secret, payload) {
        Some(expected) => constant_time_eq(expected.as_bytes(), signature.as_bytes()),
        None => false,
    }
}

/// GitHub: `X-Hub-Signature` is `sha1=` followed by the hex HMAC-SHA1 of the body.
pub fn verify_github_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    match hmac_sha1_hex(secret, payload) {
        Some(digest) => {
            let expected = format!("{}{}", GITHUB_SIGNATURE_PREFIX, digest);
            constant_time_eq(expected.as_bytes(), signature_header.as_bytes())
        }
        None => false,
    }
}

/// GitLab: the token is passed as-is and compared directly.
pub fn verify_token(secret: &str, token: &str) -> bool {
    constant_time_eq(secret.as_bytes(), token.as_bytes())
}

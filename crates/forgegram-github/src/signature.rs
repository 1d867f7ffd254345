//! `X-Hub-Signature-256` verification over the raw request body.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    MissingSecret,
    #[error("signature header is missing")]
    MissingSignature,
    #[error("signature must use sha256=<hex> format")]
    MalformedSignature,
    #[error("webhook signature verification failed")]
    Mismatch,
}

/// Checks `signature_header` against an HMAC-SHA256 of `payload` keyed by `secret`.
///
/// The comparison is constant-time. `payload` must be the body exactly as received.
pub fn verify_github_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let signature_header = signature_header
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(SignatureError::MissingSignature)?;
    let digest_hex = signature_header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::MalformedSignature)?;
    let signature_bytes =
        hex::decode(digest_hex).map_err(|_| SignatureError::MalformedSignature)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MissingSecret)?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| SignatureError::Mismatch)
}

/// Renders the header value GitHub would send for `payload`.
pub fn sign_github_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(mac.finalize().into_bytes())
    )
}

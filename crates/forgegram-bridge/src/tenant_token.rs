//! Opaque webhook path tokens that carry the destination chat id.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;

use crate::sealing::{SealError, SealingCipher};

/// Seals chat ids into URL path segments and opens them back.
///
/// Sealing is randomized, so two tokens for the same chat never match. Opening
/// rejects anything that does not authenticate or does not decode to a non-zero
/// canonical decimal chat id.
#[derive(Clone)]
pub struct TenantTokenCodec {
    cipher: Arc<dyn SealingCipher>,
}

impl TenantTokenCodec {
    pub fn new(cipher: Arc<dyn SealingCipher>) -> Self {
        Self { cipher }
    }

    pub fn encode(&self, chat_id: i64) -> Result<String, SealError> {
        let sealed = self.cipher.seal(chat_id.to_string().as_bytes())?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn decode(&self, token: &str) -> Option<i64> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        // Padded standard base64 tokens resolve too, so hook URLs minted with
        // that encoding keep working.
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .or_else(|_| BASE64_STANDARD.decode(token))
            .ok()?;
        let plaintext = String::from_utf8(self.cipher.open(&raw)?).ok()?;
        let chat_id = plaintext.parse::<i64>().ok()?;
        if chat_id == 0 || chat_id.to_string() != plaintext {
            return None;
        }
        Some(chat_id)
    }
}

impl std::fmt::Debug for TenantTokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantTokenCodec").finish_non_exhaustive()
    }
}

//! AES-GCM sealing used for tenant tokens and OAuth tokens at rest.
//!
//! Sealed layout is `nonce(12) || ciphertext || tag(16)` with no associated data.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::rand_core::RngCore as _;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use thiserror::Error;

type Aes192Gcm = AesGcm<Aes192, U12>;

const NONCE_BYTES: usize = 12;
const TAG_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherKeyError {
    #[error("invalid key length {0}: expected 16, 24 or 32 raw bytes or 64 hex chars")]
    InvalidLength(usize),
    #[error("64-character key is not valid hex")]
    InvalidHex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sealing failed")]
pub struct SealError;

/// Authenticated symmetric cipher. `open` fails closed on any tampering.
pub trait SealingCipher: Send + Sync {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError>;
    fn open(&self, sealed: &[u8]) -> Option<Vec<u8>>;
}

enum AesGcmVariant {
    Aes128(Box<Aes128Gcm>),
    Aes192(Box<Aes192Gcm>),
    Aes256(Box<Aes256Gcm>),
}

pub struct AesGcmSealer {
    variant: AesGcmVariant,
}

impl AesGcmSealer {
    /// Accepts 64 hex chars (AES-256) or a raw 16/24/32-byte string.
    pub fn from_key_string(key: &str) -> Result<Self, CipherKeyError> {
        if key.len() == 64 {
            let bytes = hex::decode(key).map_err(|_| CipherKeyError::InvalidHex)?;
            return Self::from_key_bytes(&bytes);
        }
        Self::from_key_bytes(key.as_bytes())
    }

    pub fn from_key_bytes(key: &[u8]) -> Result<Self, CipherKeyError> {
        let invalid = || CipherKeyError::InvalidLength(key.len());
        let variant = match key.len() {
            16 => AesGcmVariant::Aes128(Box::new(
                Aes128Gcm::new_from_slice(key).map_err(|_| invalid())?,
            )),
            24 => AesGcmVariant::Aes192(Box::new(
                Aes192Gcm::new_from_slice(key).map_err(|_| invalid())?,
            )),
            32 => AesGcmVariant::Aes256(Box::new(
                Aes256Gcm::new_from_slice(key).map_err(|_| invalid())?,
            )),
            _ => return Err(invalid()),
        };
        Ok(Self { variant })
    }

    pub fn key_bits(&self) -> usize {
        match self.variant {
            AesGcmVariant::Aes128(_) => 128,
            AesGcmVariant::Aes192(_) => 192,
            AesGcmVariant::Aes256(_) => 256,
        }
    }
}

impl std::fmt::Debug for AesGcmSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmSealer")
            .field("key_bits", &self.key_bits())
            .finish()
    }
}

impl SealingCipher for AesGcmSealer {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
        match &self.variant {
            AesGcmVariant::Aes128(cipher) => seal_with(cipher.as_ref(), plaintext),
            AesGcmVariant::Aes192(cipher) => seal_with(cipher.as_ref(), plaintext),
            AesGcmVariant::Aes256(cipher) => seal_with(cipher.as_ref(), plaintext),
        }
    }

    fn open(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        match &self.variant {
            AesGcmVariant::Aes128(cipher) => open_with(cipher.as_ref(), sealed),
            AesGcmVariant::Aes192(cipher) => open_with(cipher.as_ref(), sealed),
            AesGcmVariant::Aes256(cipher) => open_with(cipher.as_ref(), sealed),
        }
    }
}

fn seal_with<C>(cipher: &C, plaintext: &[u8]) -> Result<Vec<u8>, SealError>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    let nonce = random_bytes::<NONCE_BYTES>();
    let ciphertext = cipher
        .encrypt(Nonce::<C>::from_slice(&nonce), plaintext)
        .map_err(|_| SealError)?;
    let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open_with<C>(cipher: &C, sealed: &[u8]) -> Option<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    if sealed.len() < NONCE_BYTES + TAG_BYTES {
        return None;
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
    cipher.decrypt(Nonce::<C>::from_slice(nonce), ciphertext).ok()
}

/// Fills `N` bytes from the operating system CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Seals UTF-8 text into standard base64, the at-rest form of OAuth tokens.
pub fn seal_text(cipher: &dyn SealingCipher, plaintext: &str) -> Result<String, SealError> {
    cipher
        .seal(plaintext.as_bytes())
        .map(|sealed| BASE64_STANDARD.encode(sealed))
}

pub fn open_text(cipher: &dyn SealingCipher, sealed: &str) -> Option<String> {
    let raw = BASE64_STANDARD.decode(sealed.trim()).ok()?;
    String::from_utf8(cipher.open(&raw)?).ok()
}

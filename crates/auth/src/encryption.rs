//! Field-level encryption for secrets stored at rest (TOTP seeds, API keys).
//!
//! AES-256-GCM with a random 96-bit nonce per message. The stored form is
//! `base64(nonce || ciphertext || tag)`, so a value is self-contained.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be 32 bytes of base64, got {0} bytes")]
    InvalidKey(usize),

    #[error("encryption key is not valid base64")]
    KeyEncoding,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong key or tampered value)")]
    Decrypt,
}

/// Symmetric cipher for individual fields.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Build from the `ENCRYPTION_KEY` representation (base64, 32 bytes).
    pub fn from_base64_key(encoded: &str) -> Result<Self, CryptoError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CryptoError::KeyEncoding)?;
        let key: [u8; KEY_LEN] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(raw.len()))?;
        Ok(Self::new(key))
    }

    /// Derive a key from an arbitrary passphrase (SHA-256).
    ///
    /// Only for local development, where no `ENCRYPTION_KEY` is configured.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&digest);
        Self::new(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let raw = STANDARD.decode(token.trim()).map_err(|_| CryptoError::Decrypt)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}

impl core::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt() {
        let cipher = FieldCipher::new([7u8; KEY_LEN]);
        let token = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_ne!(token, "JBSWY3DPEHPK3PXP");
        assert_eq!(cipher.decrypt(&token).unwrap(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn nonces_differ_between_calls() {
        let cipher = FieldCipher::new([1u8; KEY_LEN]);
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let a = FieldCipher::new([1u8; KEY_LEN]);
        let b = FieldCipher::new([2u8; KEY_LEN]);
        let token = a.encrypt("secret").unwrap();
        assert_eq!(b.decrypt(&token), Err(CryptoError::Decrypt));
    }

    #[test]
    fn tampering_is_detected() {
        let cipher = FieldCipher::new([3u8; KEY_LEN]);
        let token = cipher.encrypt("secret").unwrap();
        let mut raw = STANDARD.decode(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert_eq!(cipher.decrypt(&STANDARD.encode(raw)), Err(CryptoError::Decrypt));
        assert_eq!(cipher.decrypt("%%%"), Err(CryptoError::Decrypt));
    }

    #[test]
    fn key_length_is_validated() {
        let short = STANDARD.encode([0u8; 16]);
        assert_eq!(
            FieldCipher::from_base64_key(&short).unwrap_err(),
            CryptoError::InvalidKey(16)
        );
        let good = STANDARD.encode([0u8; 32]);
        assert!(FieldCipher::from_base64_key(&good).is_ok());
        assert_eq!(
            FieldCipher::from_base64_key("not base64!").unwrap_err(),
            CryptoError::KeyEncoding
        );
    }

    #[test]
    fn passphrase_keys_are_deterministic() {
        let a = FieldCipher::from_passphrase("dev-secret");
        let b = FieldCipher::from_passphrase("dev-secret");
        let token = a.encrypt("x").unwrap();
        assert_eq!(b.decrypt(&token).unwrap(), "x");
    }
}

//! Symmetric envelope encryption.
//!
//! Payloads are encrypted with AES-CBC (PKCS#7 padding) and carried as
//! base64 text. Both peers derive the same material from the connector
//! credentials:
//!
//! - key: the hex text of `sha256(shared_key)`, truncated to the cipher's key length
//! - iv: the first 16 hex characters of `sha256(identifier)`
//!
//! The same credentials always yield the same ciphertext, so encryption is a
//! deterministic bijection for a given key/iv pair.

use std::fmt;
use std::str::FromStr;

use aes::{Aes128, Aes256};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

/// IV length shared by every supported cipher (AES block size).
pub const IV_LEN: usize = 16;

/// Cipher and mode used for envelope encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CipherKind {
    /// AES-256 in CBC mode.
    #[default]
    Aes256Cbc,
    /// AES-128 in CBC mode.
    Aes128Cbc,
}

impl CipherKind {
    /// Key length in bytes.
    pub const fn key_len(self) -> usize {
        match self {
            CipherKind::Aes256Cbc => 32,
            CipherKind::Aes128Cbc => 16,
        }
    }

    /// Canonical cipher name, as found in configuration.
    pub const fn name(self) -> &'static str {
        match self {
            CipherKind::Aes256Cbc => "AES-256-CBC",
            CipherKind::Aes128Cbc => "AES-128-CBC",
        }
    }
}

impl FromStr for CipherKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AES-256-CBC" => Ok(CipherKind::Aes256Cbc),
            "AES-128-CBC" => Ok(CipherKind::Aes128Cbc),
            _ => Err(CoreError::UnknownCipher(s.to_string())),
        }
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a [`crypt`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptDirection {
    Encrypt,
    Decrypt,
}

/// Hex text of the SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Key and IV derived from connector credentials.
#[derive(Clone)]
pub struct CipherMaterial {
    kind: CipherKind,
    key: Vec<u8>,
    iv: [u8; IV_LEN],
}

impl CipherMaterial {
    /// Derive key and IV from the shared key and the connector identifier.
    pub fn derive(kind: CipherKind, shared_key: &str, identifier: &str) -> Self {
        let key_hex = sha256_hex(shared_key.as_bytes());
        let iv_hex = sha256_hex(identifier.as_bytes());

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&iv_hex.as_bytes()[..IV_LEN]);

        Self {
            kind,
            key: key_hex.as_bytes()[..kind.key_len()].to_vec(),
            iv,
        }
    }

    /// The cipher this material is for.
    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    /// Encrypt and return base64 text.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CoreError> {
        let ciphertext = match self.kind {
            CipherKind::Aes256Cbc => cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|e| CoreError::Crypto(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            CipherKind::Aes128Cbc => cbc::Encryptor::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|e| CoreError::Crypto(e.to_string()))?
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(STANDARD.encode(ciphertext))
    }

    /// Decrypt base64 text back to the original bytes.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, CoreError> {
        let ciphertext = STANDARD.decode(encoded.trim())?;
        let plaintext = match self.kind {
            CipherKind::Aes256Cbc => cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &self.iv)
                .map_err(|e| CoreError::Crypto(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
            CipherKind::Aes128Cbc => cbc::Decryptor::<Aes128>::new_from_slices(&self.key, &self.iv)
                .map_err(|e| CoreError::Crypto(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext),
        };
        plaintext.map_err(|_| CoreError::Crypto("bad padding or wrong key".into()))
    }
}

impl fmt::Debug for CipherMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherMaterial")
            .field("kind", &self.kind)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// One-shot encryption or decryption with the given credentials.
///
/// `Encrypt` returns base64 text as bytes; `Decrypt` expects base64 text and
/// returns the original bytes.
pub fn crypt(
    direction: CryptDirection,
    payload: &[u8],
    kind: CipherKind,
    shared_key: &str,
    identifier: &str,
) -> Result<Vec<u8>, CoreError> {
    let material = CipherMaterial::derive(kind, shared_key, identifier);
    match direction {
        CryptDirection::Encrypt => material.encrypt(payload).map(String::into_bytes),
        CryptDirection::Decrypt => {
            let text = std::str::from_utf8(payload)
                .map_err(|e| CoreError::Crypto(format!("ciphertext is not text: {}", e)))?;
            material.decrypt(text)
        }
    }
}

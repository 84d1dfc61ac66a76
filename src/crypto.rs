//! Credential encryption module using AES-256-GCM
//!
//! This module provides the [`CredentialVault`] used to encrypt and decrypt
//! tenant OAuth secrets stored in the database, using AES-256-GCM with
//! additional authenticated data (AAD) for context binding. The symmetric key
//! is derived from a configured secret with HKDF-SHA256 and a fixed salt, so
//! the same secret always yields the same key across restarts.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Fixed HKDF salt; changing it invalidates every stored ciphertext.
const KDF_SALT: &[u8] = b"ratesync-credential-vault-v1";
const KDF_INFO: &[u8] = b"tenant-credentials";

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    /// Create a new crypto key from raw bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(CryptoKey(bytes))
    }

    /// Derive a key from a secret string using HKDF-SHA256 with the fixed salt
    pub fn derive_from_secret(secret: &str) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), secret.as_bytes());
        let mut key = vec![0u8; 32];
        hk.expand(KDF_INFO, &mut key)
            .expect("32 bytes is a valid HKDF-SHA256 output length");
        CryptoKey(key)
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypts and decrypts tenant secrets with one process-scoped derived key.
///
/// Constructed explicitly and injected wherever secrets are handled; there is
/// no global instance, so tests can run with isolated keys.
#[derive(Clone)]
pub struct CredentialVault {
    key: CryptoKey,
}

impl CredentialVault {
    /// Create a vault from an already-derived key
    pub fn new(key: CryptoKey) -> Self {
        Self { key }
    }

    /// Create a vault by deriving the key from a secret string
    pub fn from_secret(secret: &str) -> Self {
        Self::new(CryptoKey::derive_from_secret(secret))
    }

    /// Encrypt a secret string bound to the given AAD context
    pub fn encrypt(&self, aad: &[u8], plaintext: &str) -> Result<Vec<u8>, CryptoError> {
        encrypt_bytes(&self.key, aad, plaintext.as_bytes())
    }

    /// Decrypt a ciphertext bound to the given AAD context
    pub fn decrypt(&self, aad: &[u8], ciphertext: &[u8]) -> Result<String, CryptoError> {
        let bytes = decrypt_bytes(&self.key, aad, ciphertext)?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
    }
}

/// AAD context for a tenant-scoped secret field.
///
/// Binding the tenant id and field name prevents a ciphertext copied between
/// rows or columns from decrypting.
pub fn tenant_aad(tenant_id: Uuid, field: &str) -> Vec<u8> {
    format!("tenant|{}|{}", tenant_id, field).into_bytes()
}

/// Field names used in tenant AAD contexts.
pub mod fields {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const CLIENT_SECRET: &str = "client_secret";
}

/// Encrypt bytes using AES-256-GCM
fn encrypt_bytes(key: &CryptoKey, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
fn decrypt_bytes(key: &CryptoKey, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

//! Cryptographic primitives for vault operations

pub mod cryptor;
pub mod key_wrap;
pub mod keys;

use thiserror::Error;

/// Errors that can occur while unlocking key material.
///
/// A wrong passphrase and a tampered masterkey file are indistinguishable:
/// both produce the wrong key encryption key and fail the RFC 3394 check.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// The version MAC in the masterkey file does not match its version field.
    #[error("Version MAC verification failed - masterkey file tampered or unsupported")]
    HmacVerificationFailed,

    /// The master key file's integrity check failed during unwrapping.
    #[error("Key unwrap failed - incorrect passphrase or corrupted/tampered vault")]
    KeyUnwrapIntegrityFailed,

    /// Key derivation failed, typically due to scrypt computation error.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// Invalid scrypt parameters in the master key file.
    #[error("Invalid scrypt parameters: {0}")]
    InvalidScryptParams(String),

    /// The ciphertext length is invalid for AES key unwrapping.
    #[error("Invalid ciphertext length for key unwrap")]
    InvalidCiphertextLength,

    /// Array conversion failed due to unexpected length.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}

impl From<key_wrap::UnwrapError> for CryptoError {
    fn from(err: key_wrap::UnwrapError) -> Self {
        match err {
            key_wrap::UnwrapError::InvalidCiphertextLength
            | key_wrap::UnwrapError::CiphertextTooShort => CryptoError::InvalidCiphertextLength,
            key_wrap::UnwrapError::InvalidIntegrityCheck => CryptoError::KeyUnwrapIntegrityFailed,
        }
    }
}

// Re-export commonly used types
pub use cryptor::{Cryptor, CryptorError, CtrMacCryptor};
pub use keys::MasterKey;

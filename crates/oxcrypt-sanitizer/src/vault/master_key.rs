#![forbid(unsafe_code)]

use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;
use zeroize::Zeroizing;

use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use unicode_normalization::UnicodeNormalization;

use crate::crypto::{CryptoError, key_wrap, keys::MasterKey};

/// The only vault version this crate checks and writes.
pub const VAULT_VERSION: u32 = 6;

/// Default scrypt parameters of format 6 vaults.
const DEFAULT_SCRYPT_SALT_LENGTH: usize = 8;
pub const DEFAULT_SCRYPT_COST_PARAM_LOG2: u8 = 15; // 2^15 = 32768
const DEFAULT_SCRYPT_BLOCK_SIZE: u32 = 8;
const DEFAULT_SCRYPT_PARALLELIZATION: u32 = 1;

/// Errors that can occur when creating a master key file.
#[derive(Error, Debug)]
pub enum MasterKeyCreationError {
    #[error("RNG failed: {0}")]
    Rng(String),

    #[error("Invalid scrypt parameters: {0}")]
    InvalidScryptParams(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Key wrap failed: {0}")]
    KeyWrap(#[from] key_wrap::WrapError),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur when reading a master key file.
#[derive(Error, Debug)]
pub enum MasterKeyFileError {
    #[error("Masterkey file is not valid JSON of the expected shape: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The master key file format (`masterkey.cryptomator`).
///
/// Contains the encrypted master keys (AES and MAC) wrapped with a key encryption key (KEK)
/// derived from the user's passphrase via scrypt.
#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterKeyFile {
    /// Vault format version; must be [`VAULT_VERSION`] to unlock.
    pub version: u32,

    /// Salt for scrypt key derivation.
    #[serde_as(as = "Base64")]
    pub scrypt_salt: Vec<u8>,

    /// Scrypt cost parameter N (must be a power of 2).
    pub scrypt_cost_param: i32,

    /// Scrypt block size parameter r.
    pub scrypt_block_size: i32,

    /// The RFC 3394 wrapped AES master key.
    #[serde_as(as = "Base64")]
    pub primary_master_key: Vec<u8>,

    /// The RFC 3394 wrapped MAC master key.
    #[serde_as(as = "Base64")]
    pub hmac_master_key: Vec<u8>,

    /// HMAC-SHA256 of the vault version (as big-endian 4-byte integer).
    #[serde_as(as = "Base64")]
    pub version_mac: Vec<u8>,
}

impl MasterKeyFile {
    /// Parse the JSON content of a masterkey file.
    ///
    /// Only the structure is checked; nothing is decrypted.
    pub fn parse(bytes: &[u8]) -> Result<Self, MasterKeyFileError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Derive a key encryption key (KEK) from a passphrase using scrypt.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidScryptParams`: Invalid scrypt parameters in the master key file
    /// - `CryptoError::KeyDerivationFailed`: Scrypt key derivation failed
    pub fn derive_key(&self, passphrase: &str) -> Result<SecretBox<[u8; 32]>, CryptoError> {
        let normalized_passphrase = Zeroizing::new(passphrase.nfc().collect::<String>());

        let log2_n = cost_param_log2(self.scrypt_cost_param)?;
        let r = u32::try_from(self.scrypt_block_size).map_err(|_| {
            CryptoError::InvalidScryptParams(format!(
                "negative block size {}",
                self.scrypt_block_size
            ))
        })?;
        let p = DEFAULT_SCRYPT_PARALLELIZATION;

        let scrypt_params = scrypt::Params::new(log2_n, r, p, 32).map_err(|e| {
            CryptoError::InvalidScryptParams(format!(
                "Invalid scrypt parameters (N=2^{log2_n}, r={r}, p={p}): {e}"
            ))
        })?;

        let mut kek = Zeroizing::new([0u8; 32]);
        scrypt::scrypt(
            normalized_passphrase.as_bytes(),
            &self.scrypt_salt,
            &scrypt_params,
            &mut kek[..],
        )
        .map_err(|e| CryptoError::KeyDerivationFailed(format!("Scrypt derivation failed: {e}")))?;

        Ok(SecretBox::new(Box::new(*kek)))
    }

    /// Unlock the vault with a passphrase, deriving the KEK and unwrapping the master keys.
    ///
    /// # Errors
    ///
    /// - `CryptoError::InvalidScryptParams`: Invalid scrypt parameters
    /// - `CryptoError::KeyDerivationFailed`: Scrypt key derivation failed
    /// - `CryptoError::KeyUnwrapIntegrityFailed`: Wrong passphrase or corrupted/tampered vault
    /// - `CryptoError::HmacVerificationFailed`: The version field was tampered with
    pub fn unlock(&self, passphrase: &str) -> Result<MasterKey, CryptoError> {
        let kek = self.derive_key(passphrase)?;
        self.unlock_with_kek(&kek)
    }

    fn unlock_with_kek(&self, kek: &SecretBox<[u8; 32]>) -> Result<MasterKey, CryptoError> {
        let aes_key = Zeroizing::new(key_wrap::unwrap_key(&self.primary_master_key, kek)?);
        let aes_key: [u8; 32] =
            aes_key
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: aes_key.len(),
                })?;

        let hmac_key = Zeroizing::new(key_wrap::unwrap_key(&self.hmac_master_key, kek)?);
        let hmac_key: [u8; 32] =
            hmac_key
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: hmac_key.len(),
                })?;
        let hmac_key = SecretBox::new(Box::new(hmac_key));

        self.check_vault_version(&hmac_key)?;

        Ok(MasterKey::new(aes_key, *hmac_key.expose_secret()))
    }

    /// Verify the version MAC using HMAC-SHA256 over the big-endian version.
    fn check_vault_version(&self, mac_key: &SecretBox<[u8; 32]>) -> Result<(), CryptoError> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key.expose_secret());
        hmac::verify(&key, &self.version.to_be_bytes(), &self.version_mac)
            .map_err(|_| CryptoError::HmacVerificationFailed)
    }
}

/// log2 of a scrypt cost parameter, which must be a power of two above 1.
fn cost_param_log2(cost: i32) -> Result<u8, CryptoError> {
    if cost <= 1 || cost.count_ones() != 1 {
        return Err(CryptoError::InvalidScryptParams(format!(
            "cost parameter {cost} is not a power of two above 1"
        )));
    }
    // trailing_zeros of a positive i32 is at most 30
    #[allow(clippy::cast_possible_truncation)]
    Ok(cost.trailing_zeros() as u8)
}

/// Create masterkey file content with the default scrypt cost (N = 2^15).
pub fn create_masterkey_file(
    master_key: &MasterKey,
    passphrase: &str,
) -> Result<String, MasterKeyCreationError> {
    create_masterkey_file_with_cost(master_key, passphrase, DEFAULT_SCRYPT_COST_PARAM_LOG2)
}

/// Create masterkey file content with an explicit scrypt cost `N = 2^log2_n`.
///
/// Low costs are only meant for tests.
pub fn create_masterkey_file_with_cost(
    master_key: &MasterKey,
    passphrase: &str,
    log2_n: u8,
) -> Result<String, MasterKeyCreationError> {
    use crate::crypto::key_wrap::wrap_key;

    let mut salt = vec![0u8; DEFAULT_SCRYPT_SALT_LENGTH];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| MasterKeyCreationError::Rng("Failed to generate salt".to_string()))?;

    let r = DEFAULT_SCRYPT_BLOCK_SIZE;
    let p = DEFAULT_SCRYPT_PARALLELIZATION;
    if log2_n == 0 || log2_n > 30 {
        return Err(MasterKeyCreationError::InvalidScryptParams(format!(
            "cost exponent {log2_n} out of range"
        )));
    }

    let normalized_passphrase = Zeroizing::new(passphrase.nfc().collect::<String>());
    let scrypt_params = scrypt::Params::new(log2_n, r, p, 32).map_err(|e| {
        MasterKeyCreationError::InvalidScryptParams(format!(
            "Invalid scrypt parameters (N=2^{log2_n}, r={r}, p={p}): {e}"
        ))
    })?;
    let mut kek = Zeroizing::new([0u8; 32]);
    scrypt::scrypt(
        normalized_passphrase.as_bytes(),
        &salt,
        &scrypt_params,
        &mut kek[..],
    )
    .map_err(|e| MasterKeyCreationError::KeyDerivation(format!("Scrypt derivation failed: {e}")))?;
    let kek_secret = SecretBox::new(Box::new(*kek));

    // Encryption key first, then MAC key
    let wrapped_aes = master_key.with_aes_key(|key| wrap_key(key, &kek_secret))?;
    let wrapped_mac = master_key.with_mac_key(|key| wrap_key(key, &kek_secret))?;

    let version = VAULT_VERSION;
    let version_mac = master_key.with_mac_key(|key| {
        let hmac_key = hmac::Key::new(hmac::HMAC_SHA256, key);
        hmac::sign(&hmac_key, &version.to_be_bytes()).as_ref().to_vec()
    });

    let masterkey_file = MasterKeyFile {
        version,
        scrypt_salt: salt,
        scrypt_cost_param: 1i32 << log2_n,
        scrypt_block_size: 8,
        primary_master_key: wrapped_aes,
        hmac_master_key: wrapped_mac,
        version_mac,
    };

    Ok(serde_json::to_string_pretty(&masterkey_file)?)
}

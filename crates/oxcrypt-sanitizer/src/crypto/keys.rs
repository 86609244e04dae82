#![forbid(unsafe_code)]

use generic_array::{GenericArray, typenum::U64};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox};
use zeroize::Zeroize;

/// Master key pair for Cryptomator vault operations.
///
/// This struct holds both the AES encryption key and MAC authentication key,
/// each 256 bits (32 bytes) for a total of 512 bits of key material.
///
/// # Security
///
/// The keys live in `secrecy::SecretBox` containers, which zeroize on drop and
/// keep the material out of `Debug` output. Access is only possible through
/// the scoped `with_*` methods so key bytes never escape a callback.
pub struct MasterKey {
    aes_master_key: SecretBox<[u8; 32]>,
    mac_master_key: SecretBox<[u8; 32]>,
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("aes_master_key", &"[REDACTED]")
            .field("mac_master_key", &"[REDACTED]")
            .finish()
    }
}

impl Clone for MasterKey {
    fn clone(&self) -> Self {
        Self::new(
            *self.aes_master_key.expose_secret(),
            *self.mac_master_key.expose_secret(),
        )
    }
}

impl MasterKey {
    /// Generate a new random master key pair using a cryptographically secure RNG.
    pub fn random() -> Self {
        let mut aes_master_key = [0u8; 32];
        let mut mac_master_key = [0u8; 32];
        rand::rng().fill_bytes(&mut aes_master_key);
        rand::rng().fill_bytes(&mut mac_master_key);
        let key = Self::new(aes_master_key, mac_master_key);
        aes_master_key.zeroize();
        mac_master_key.zeroize();
        key
    }

    /// Create a new master key pair from raw key material.
    ///
    /// The caller is responsible for zeroing the original arrays if they
    /// contain sensitive data.
    ///
    /// # Example
    ///
    /// ```
    /// # use oxcrypt_sanitizer::crypto::keys::MasterKey;
    /// let master_key = MasterKey::new([0u8; 32], [1u8; 32]);
    /// master_key.with_mac_key(|key| assert_eq!(key, &[1u8; 32]));
    /// ```
    pub fn new(aes_key: [u8; 32], mac_key: [u8; 32]) -> Self {
        MasterKey {
            aes_master_key: SecretBox::new(Box::new(aes_key)),
            mac_master_key: SecretBox::new(Box::new(mac_key)),
        }
    }

    /// Execute a function with access to just the AES key.
    pub fn with_aes_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        f(self.aes_master_key.expose_secret())
    }

    /// Execute a function with access to just the MAC key.
    pub fn with_mac_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        f(self.mac_master_key.expose_secret())
    }

    /// Execute a function with access to both keys in AES-SIV order (MAC || AES).
    ///
    /// The 64-byte combined key is zeroed after the callback completes.
    pub fn with_siv_key<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&GenericArray<u8, U64>) -> R,
    {
        // GenericArray doesn't implement DefaultIsZeroes
        struct ZeroizeOnDrop(GenericArray<u8, U64>);

        impl Drop for ZeroizeOnDrop {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }

        let mut key = ZeroizeOnDrop(GenericArray::<u8, U64>::default());
        key.0[..32].copy_from_slice(self.mac_master_key.expose_secret());
        key.0[32..].copy_from_slice(self.aes_master_key.expose_secret());

        f(&key.0)
    }

    /// Create an AES-SIV cipher for filename encryption/decryption.
    pub fn create_name_cipher(&self) -> aes_siv::siv::Aes256Siv {
        self.with_siv_key(|key| {
            use aes_siv::KeyInit;
            aes_siv::siv::Aes256Siv::new(key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ordering() {
        let master_key = MasterKey::new([1u8; 32], [2u8; 32]);

        master_key.with_aes_key(|key| assert_eq!(key, &[1u8; 32]));
        master_key.with_mac_key(|key| assert_eq!(key, &[2u8; 32]));

        // SIV key order is MAC || AES
        master_key.with_siv_key(|key| {
            assert_eq!(&key[..32], &[2u8; 32]);
            assert_eq!(&key[32..], &[1u8; 32]);
        });
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let master_key = MasterKey::new([0xAB; 32], [0xCD; 32]);
        let rendered = format!("{master_key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }

    #[test]
    fn test_random_keys_differ() {
        let a = MasterKey::random();
        let b = MasterKey::random();
        let a_bytes = a.with_aes_key(|k| *k);
        let b_bytes = b.with_aes_key(|k| *k);
        assert_ne!(a_bytes, b_bytes);
    }
}

use aes_siv::{KeyInit, siv::Aes256Siv};
use data_encoding::{BASE32, BASE32_NOPAD};
use ring::digest;
use std::fmt;
use thiserror::Error;

use crate::crypto::keys::MasterKey;

/// Encrypted names longer than this many characters are stored as a hashed
/// `.lng` stub plus a metadata file under `m/`.
pub const SHORTENING_THRESHOLD: usize = 129;

/// Extension of shortened name stubs and metadata files.
pub const LONG_NAME_SUFFIX: &str = ".lng";

/// Prefix that marks a ciphertext name as a directory file.
pub const DIR_PREFIX: &str = "0";

/// Context for filename operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct NameContext {
    /// The encrypted filename (if available)
    pub encrypted_name: Option<String>,
    /// The cleartext filename (if available, e.g., during encryption)
    pub cleartext_name: Option<String>,
    /// The parent directory ID
    pub dir_id: Option<String>,
}

impl NameContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_encrypted_name(mut self, name: impl Into<String>) -> Self {
        self.encrypted_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_cleartext_name(mut self, name: impl Into<String>) -> Self {
        self.cleartext_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_dir_id(mut self, dir_id: impl Into<String>) -> Self {
        self.dir_id = Some(dir_id.into());
        self
    }
}

impl fmt::Display for NameContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref name) = self.cleartext_name {
            parts.push(format!("filename '{name}'"));
        } else if let Some(ref enc_name) = self.encrypted_name {
            // Truncate long encrypted names for readability
            let display_name = if enc_name.chars().count() > 40 {
                format!("{}...", char_prefix(enc_name, 37))
            } else {
                enc_name.clone()
            };
            parts.push(format!("encrypted name '{display_name}'"));
        }

        if let Some(ref dir_id) = self.dir_id {
            let display_id = if dir_id.is_empty() {
                "<root>".to_string()
            } else if dir_id.chars().count() > 12 {
                format!("{}...", char_prefix(dir_id, 12))
            } else {
                dir_id.clone()
            };
            parts.push(format!("in directory {display_id}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// The first `max_chars` characters of `s`.
///
/// Ids read from damaged directory files need not be ASCII, so byte slicing
/// could split a character.
pub(crate) fn char_prefix(s: &str, max_chars: usize) -> &str {
    s.char_indices().nth(max_chars).map_or(s, |(end, _)| &s[..end])
}

/// Errors that can occur during filename encryption/decryption.
///
/// Decryption failures are integrity failures: AES-SIV is authenticated, so a
/// failure means tampering, the wrong key, or the wrong parent directory ID.
#[derive(Error, Debug)]
pub enum NameError {
    #[error("Failed to decrypt {context}: authentication failed")]
    DecryptionFailed { context: NameContext },

    #[error("Invalid base32 encoding for {context}: {reason}")]
    Base32Decode { reason: String, context: NameContext },

    #[error("Invalid UTF-8 after decryption for {context}: {reason}")]
    Utf8Decode { reason: String, context: NameContext },

    #[error("Unexpected encryption failure for {context}")]
    EncryptionFailed { context: NameContext },

    #[error("Failed to hash directory ID '{dir_id}': encryption error")]
    DirIdHashFailed { dir_id: String },
}

impl NameError {
    /// Add or update context on an existing error
    #[must_use]
    pub fn with_context(self, new_context: NameContext) -> Self {
        match self {
            NameError::DecryptionFailed { .. } => {
                NameError::DecryptionFailed { context: new_context }
            }
            NameError::Base32Decode { reason, .. } => {
                NameError::Base32Decode { reason, context: new_context }
            }
            NameError::Utf8Decode { reason, .. } => {
                NameError::Utf8Decode { reason, context: new_context }
            }
            NameError::EncryptionFailed { .. } => {
                NameError::EncryptionFailed { context: new_context }
            }
            NameError::DirIdHashFailed { dir_id } => NameError::DirIdHashFailed { dir_id },
        }
    }
}

/// Hash a directory ID into its 32-character storage name.
///
/// `BASE32(SHA1(AES-SIV(dir_id)))` with no associated data. The result is
/// split into a 2-character shard and a 30-character container under `d/`.
pub fn hash_dir_id(dir_id: &str, master_key: &MasterKey) -> Result<String, NameError> {
    master_key.with_siv_key(|key| {
        let mut cipher = Aes256Siv::new(key);

        let associated_data: &[&[u8]] = &[];
        let encrypted = cipher
            .encrypt(associated_data, dir_id.as_bytes())
            .map_err(|_| NameError::DirIdHashFailed {
                dir_id: dir_id.to_string(),
            })?;

        let hashed = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &encrypted);
        Ok(BASE32.encode(hashed.as_ref()))
    })
}

/// Encrypt a filename using AES-SIV with the parent directory ID as context.
///
/// The name is encrypted exactly as given. Normalization is the caller's
/// business, which lets tooling plant and detect non-NFC names.
///
/// Returns uppercase, `=`-padded base32 without any directory prefix.
pub fn encrypt_filename(
    name: &str,
    parent_dir_id: &str,
    master_key: &MasterKey,
) -> Result<String, NameError> {
    let context = NameContext::new()
        .with_cleartext_name(name)
        .with_dir_id(parent_dir_id);

    master_key.with_siv_key(|key| {
        let mut cipher = Aes256Siv::new(key);

        let associated_data: &[&[u8]] = &[parent_dir_id.as_bytes()];
        let encrypted = cipher
            .encrypt(associated_data, name.as_bytes())
            .map_err(|_| NameError::EncryptionFailed { context })?;

        Ok(BASE32.encode(&encrypted))
    })
}

/// Decrypt a base32 filename using AES-SIV with the parent directory ID as context.
///
/// Padding is optional: trailing `=` are stripped before decoding, so names
/// that lost their padding still decrypt. Input must be uppercase.
///
/// # Errors
///
/// - `NameError::Base32Decode`: the name is not base32
/// - `NameError::DecryptionFailed`: wrong key, wrong parent or tampered ciphertext
/// - `NameError::Utf8Decode`: the decrypted bytes are not UTF-8
pub fn decrypt_filename(
    encrypted_name: &str,
    parent_dir_id: &str,
    master_key: &MasterKey,
) -> Result<String, NameError> {
    let context = NameContext::new()
        .with_encrypted_name(encrypted_name)
        .with_dir_id(parent_dir_id);

    let unpadded = encrypted_name.trim_end_matches('=');
    let decoded = BASE32_NOPAD
        .decode(unpadded.as_bytes())
        .map_err(|e| NameError::Base32Decode {
            reason: e.to_string(),
            context: context.clone(),
        })?;

    master_key.with_siv_key(|key| {
        let mut cipher = Aes256Siv::new(key);

        let associated_data: &[&[u8]] = &[parent_dir_id.as_bytes()];
        let decrypted = cipher
            .decrypt(associated_data, &decoded)
            .map_err(|_| NameError::DecryptionFailed { context: context.clone() })?;

        String::from_utf8(decrypted.to_vec()).map_err(|e| NameError::Utf8Decode {
            reason: e.to_string(),
            context,
        })
    })
}

/// Hash a full ciphertext name into its shortened form, without extension.
///
/// `BASE32(SHA1(name))`, always 32 characters.
pub fn long_name_hash(full_ciphertext_name: &str) -> String {
    let hash = digest::digest(
        &digest::SHA1_FOR_LEGACY_USE_ONLY,
        full_ciphertext_name.as_bytes(),
    );
    BASE32.encode(hash.as_ref())
}

/// Stub filename for a full ciphertext name: `<hash>.lng`.
pub fn long_name_stub(full_ciphertext_name: &str) -> String {
    format!("{}{LONG_NAME_SUFFIX}", long_name_hash(full_ciphertext_name))
}

/// Whether a full ciphertext name (including any `0` prefix) must be shortened.
pub fn needs_shortening(full_ciphertext_name: &str) -> bool {
    full_ciphertext_name.len() > SHORTENING_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_master_key() -> MasterKey {
        let mut aes_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        for i in 0..32 {
            aes_key[i] = i as u8;
            mac_key[i] = (32 + i) as u8;
        }
        MasterKey::new(aes_key, mac_key)
    }

    fn create_different_master_key() -> MasterKey {
        let mut aes_key = [0u8; 32];
        let mut mac_key = [0u8; 32];
        for i in 0..32 {
            aes_key[i] = (i + 100) as u8;
            mac_key[i] = (i + 200) as u8;
        }
        MasterKey::new(aes_key, mac_key)
    }

    #[test]
    fn test_deterministic_encryption_of_filenames() {
        let master_key = create_test_master_key();
        let encrypted1 = encrypt_filename("test.txt", "", &master_key).unwrap();
        let encrypted2 = encrypt_filename("test.txt", "", &master_key).unwrap();
        assert_eq!(encrypted1, encrypted2, "Encryption should be deterministic");

        let decrypted = decrypt_filename(&encrypted1, "", &master_key).unwrap();
        assert_eq!("test.txt", decrypted);
    }

    #[test]
    fn test_filename_roundtrip() {
        let master_key = create_test_master_key();
        let test_cases = vec![
            ("simple.txt", ""),
            ("file with spaces.doc", "e9250eb8-078d-4fc0-8835-be92a313360c"),
            ("unicode-caf\u{00E9}.txt", ""),
            ("special!@#$%^&*()_+-=[]{}|;':\",./<>?.tmp", ""),
            (".hidden", "some-dir"),
        ];

        for (original, parent_dir_id) in test_cases {
            let encrypted = encrypt_filename(original, parent_dir_id, &master_key)
                .unwrap_or_else(|e| panic!("Failed to encrypt '{original}': {e}"));
            let decrypted = decrypt_filename(&encrypted, parent_dir_id, &master_key)
                .unwrap_or_else(|e| panic!("Failed to decrypt '{original}': {e}"));
            assert_eq!(original, decrypted, "Roundtrip failed for '{original}'");
        }
    }

    #[test]
    fn test_encrypted_names_are_uppercase_base32() {
        let master_key = create_test_master_key();
        for name in ["a", "ab", "abc", "test.txt", "document.pdf"] {
            let encrypted = encrypt_filename(name, "", &master_key).unwrap();
            assert_eq!(encrypted.len() % 8, 0, "base32 output is padded to 8");
            for ch in encrypted.chars() {
                assert!(
                    ch.is_ascii_uppercase() || ('2'..='7').contains(&ch) || ch == '=',
                    "unexpected character {ch} in {encrypted}"
                );
            }
        }
    }

    #[test]
    fn test_decrypt_accepts_missing_padding() {
        let master_key = create_test_master_key();
        let encrypted = encrypt_filename("test.txt", "", &master_key).unwrap();
        assert!(encrypted.ends_with('='), "16+8 bytes of SIV output need padding");

        let unpadded = encrypted.trim_end_matches('=');
        assert_eq!(decrypt_filename(unpadded, "", &master_key).unwrap(), "test.txt");
    }

    #[test]
    fn test_nfd_names_are_not_normalized() {
        let master_key = create_test_master_key();
        let nfd = "cafe\u{0301}.txt";
        let nfc = "caf\u{00E9}.txt";

        let from_nfd = encrypt_filename(nfd, "", &master_key).unwrap();
        let from_nfc = encrypt_filename(nfc, "", &master_key).unwrap();
        assert_ne!(from_nfd, from_nfc);
        assert_eq!(decrypt_filename(&from_nfd, "", &master_key).unwrap(), nfd);
    }

    #[test]
    fn test_filename_decryption_with_wrong_parent_dir_fails() {
        let master_key = create_test_master_key();
        let encrypted = encrypt_filename("test.txt", "correct-parent", &master_key).unwrap();

        let result = decrypt_filename(&encrypted, "wrong-parent", &master_key);
        assert!(matches!(result, Err(NameError::DecryptionFailed { .. })));
    }

    #[test]
    fn test_filename_decryption_with_wrong_key_fails() {
        let encrypted = encrypt_filename("test.txt", "", &create_test_master_key()).unwrap();
        let result = decrypt_filename(&encrypted, "", &create_different_master_key());
        assert!(matches!(result, Err(NameError::DecryptionFailed { .. })));
    }

    #[test]
    fn test_lowercase_input_is_not_base32() {
        let master_key = create_test_master_key();
        let encrypted = encrypt_filename("test.txt", "", &master_key).unwrap();
        let result = decrypt_filename(&encrypted.to_lowercase(), "", &master_key);
        assert!(matches!(result, Err(NameError::Base32Decode { .. })));
    }

    #[test]
    fn test_directory_id_hashing() {
        let master_key = create_test_master_key();

        let hash1 = hash_dir_id("test-directory-id", &master_key).unwrap();
        let hash2 = hash_dir_id("test-directory-id", &master_key).unwrap();
        assert_eq!(hash1, hash2);

        let hash3 = hash_dir_id("different-directory-id", &master_key).unwrap();
        assert_ne!(hash1, hash3);

        let root_hash = hash_dir_id("", &master_key).unwrap();
        assert_eq!(root_hash.len(), 32);
        assert!(root_hash.chars().all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn test_directory_id_hashing_with_different_keys() {
        let hash1 = hash_dir_id("id", &create_test_master_key()).unwrap();
        let hash2 = hash_dir_id("id", &create_different_master_key()).unwrap();
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_dir_id_algorithm_verification() {
        let master_key = MasterKey::new([0u8; 32], [0u8; 32]);

        let encrypted = master_key.with_siv_key(|key| {
            let mut cipher = Aes256Siv::new(key);
            let associated_data: &[&[u8]] = &[];
            cipher.encrypt(associated_data, b"").unwrap()
        });
        assert_eq!(encrypted.len(), 16, "AES-SIV of empty plaintext is the tag only");

        let hashed = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &encrypted);
        let expected = BASE32.encode(hashed.as_ref());
        assert_eq!(hash_dir_id("", &master_key).unwrap(), expected);
    }

    #[test]
    fn test_long_name_hash_known_vectors() {
        // SHA1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        assert_eq!(long_name_hash(""), "3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ");
        assert_eq!(long_name_stub(""), "3I42H3S6NNFQ2MSVX7XZKYAYSCX5QBYJ.lng");
    }

    #[test]
    fn test_context_display_truncates_non_ascii_dir_id() {
        let err = NameError::DecryptionFailed {
            context: NameContext::new()
                .with_encrypted_name("\u{e9}".repeat(50))
                .with_dir_id("abcdefghijk\u{e9}-corrupt"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("in directory abcdefghijk\u{e9}..."), "{rendered}");
        assert!(rendered.contains(&format!("'{}...'", "\u{e9}".repeat(37))), "{rendered}");
    }

    #[test]
    fn test_char_prefix() {
        assert_eq!(char_prefix("abc", 12), "abc");
        assert_eq!(char_prefix("caf\u{e9}-id", 4), "caf\u{e9}");
        assert_eq!(char_prefix("", 3), "");
    }

    #[test]
    fn test_shortening_threshold() {
        assert!(!needs_shortening(&"A".repeat(SHORTENING_THRESHOLD)));
        assert!(needs_shortening(&"A".repeat(SHORTENING_THRESHOLD + 1)));
    }
}

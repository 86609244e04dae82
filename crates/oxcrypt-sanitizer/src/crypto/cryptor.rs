//! The cryptographic capability consumed by checks, solutions and reconstruction.
//!
//! Everything above this module talks to a `&dyn Cryptor`, never to keys
//! directly. [`CtrMacCryptor`] is the vault format 6 implementation.

use thiserror::Error;

use crate::crypto::keys::MasterKey;
use crate::fs::file::FileContext;
use crate::fs::file_ctrmac::{self, CtrMacError, FileHeader};
use crate::fs::name::{self, NameError};

#[derive(Error, Debug)]
pub enum CryptorError {
    #[error(transparent)]
    Name(#[from] NameError),

    #[error(transparent)]
    Content(#[from] CtrMacError),
}

impl CryptorError {
    /// True when a MAC or SIV tag failed to verify.
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            CryptorError::Name(NameError::DecryptionFailed { .. }) => true,
            CryptorError::Name(_) => false,
            CryptorError::Content(e) => e.is_authentication_failure(),
        }
    }
}

/// Unlocked cryptographic capability of a vault.
pub trait Cryptor: Send + Sync {
    /// `BASE32(SHA1(AES-SIV(dir_id)))`, 32 characters.
    fn hash_directory_id(&self, dir_id: &str) -> Result<String, CryptorError>;

    fn encrypt_filename(&self, cleartext: &str, parent_dir_id: &str) -> Result<String, CryptorError>;

    fn decrypt_filename(&self, ciphertext: &str, parent_dir_id: &str)
    -> Result<String, CryptorError>;

    fn header_size(&self) -> usize;

    fn cleartext_chunk_size(&self) -> usize;

    fn ciphertext_chunk_size(&self) -> usize;

    /// A new header with random nonce and content key and an unknown legacy size.
    fn create_header(&self) -> FileHeader;

    /// Encrypt a header, keeping its nonce.
    fn encrypt_header(&self, header: &FileHeader) -> Vec<u8>;

    fn decrypt_header(&self, ciphertext: &[u8]) -> Result<FileHeader, CryptorError>;

    fn encrypt_chunk(&self, cleartext: &[u8], chunk_number: u64, header: &FileHeader) -> Vec<u8>;

    fn decrypt_chunk(
        &self,
        ciphertext: &[u8],
        chunk_number: u64,
        header: &FileHeader,
        authenticate: bool,
    ) -> Result<Vec<u8>, CryptorError>;

    /// Ciphertext length (excluding the header) of a cleartext of the given size.
    fn ciphertext_size(&self, cleartext_size: u64) -> u64 {
        let payload = self.cleartext_chunk_size() as u64;
        let overhead = (self.ciphertext_chunk_size() - self.cleartext_chunk_size()) as u64;
        cleartext_size + cleartext_size.div_ceil(payload) * overhead
    }
}

/// AES-SIV names with AES-CTR + HMAC-SHA256 content.
#[derive(Debug, Clone)]
pub struct CtrMacCryptor {
    master_key: MasterKey,
}

impl CtrMacCryptor {
    pub fn new(master_key: MasterKey) -> Self {
        Self { master_key }
    }

    pub fn master_key(&self) -> &MasterKey {
        &self.master_key
    }
}

impl Cryptor for CtrMacCryptor {
    fn hash_directory_id(&self, dir_id: &str) -> Result<String, CryptorError> {
        Ok(name::hash_dir_id(dir_id, &self.master_key)?)
    }

    fn encrypt_filename(&self, cleartext: &str, parent_dir_id: &str) -> Result<String, CryptorError> {
        Ok(name::encrypt_filename(cleartext, parent_dir_id, &self.master_key)?)
    }

    fn decrypt_filename(
        &self,
        ciphertext: &str,
        parent_dir_id: &str,
    ) -> Result<String, CryptorError> {
        Ok(name::decrypt_filename(ciphertext, parent_dir_id, &self.master_key)?)
    }

    fn header_size(&self) -> usize {
        file_ctrmac::HEADER_SIZE
    }

    fn cleartext_chunk_size(&self) -> usize {
        file_ctrmac::PAYLOAD_SIZE
    }

    fn ciphertext_chunk_size(&self) -> usize {
        file_ctrmac::CHUNK_SIZE
    }

    fn create_header(&self) -> FileHeader {
        FileHeader::random()
    }

    fn encrypt_header(&self, header: &FileHeader) -> Vec<u8> {
        file_ctrmac::encrypt_header(header, &self.master_key)
    }

    fn decrypt_header(&self, ciphertext: &[u8]) -> Result<FileHeader, CryptorError> {
        Ok(file_ctrmac::decrypt_header(
            ciphertext,
            &self.master_key,
            &FileContext::new(),
        )?)
    }

    fn encrypt_chunk(&self, cleartext: &[u8], chunk_number: u64, header: &FileHeader) -> Vec<u8> {
        file_ctrmac::encrypt_chunk(cleartext, chunk_number, header, &self.master_key)
    }

    fn decrypt_chunk(
        &self,
        ciphertext: &[u8],
        chunk_number: u64,
        header: &FileHeader,
        authenticate: bool,
    ) -> Result<Vec<u8>, CryptorError> {
        Ok(file_ctrmac::decrypt_chunk(
            ciphertext,
            chunk_number,
            header,
            &self.master_key,
            authenticate,
            &FileContext::new(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ciphertext_size_matches_format() {
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        assert_eq!(cryptor.ciphertext_size(0), 0);
        assert_eq!(cryptor.ciphertext_size(10), 58);
        assert_eq!(cryptor.ciphertext_size(32768), 32816);
        assert_eq!(cryptor.ciphertext_size(32769), 32816 + 49);
        assert_eq!(
            cryptor.ciphertext_size(100_000),
            file_ctrmac::ciphertext_size(100_000)
        );
    }

    #[test]
    fn test_authentication_failures_are_classified() {
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let other = CtrMacCryptor::new(MasterKey::random());

        let name = cryptor.encrypt_filename("a.txt", "").unwrap();
        let err = other.decrypt_filename(&name, "").unwrap_err();
        assert!(err.is_authentication_failure());

        let err = cryptor.decrypt_filename("not base32!", "").unwrap_err();
        assert!(!err.is_authentication_failure());

        let header = cryptor.create_header();
        let encrypted = cryptor.encrypt_header(&header);
        let err = other.decrypt_header(&encrypted).unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_usable_as_trait_object() {
        let cryptor: Box<dyn Cryptor> = Box::new(CtrMacCryptor::new(MasterKey::random()));
        let header = cryptor.create_header();
        let chunk = cryptor.encrypt_chunk(b"payload", 0, &header);
        let decrypted = cryptor.decrypt_chunk(&chunk, 0, &header, true).unwrap();
        assert_eq!(decrypted, b"payload");
    }
}

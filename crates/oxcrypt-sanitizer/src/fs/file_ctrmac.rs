//! AES-CTR + HMAC-SHA256 file content encryption, vault format 6.
//!
//! # File Header Format (88 bytes)
//!
//! | Offset | Size | Description |
//! |--------|------|-------------|
//! | 0      | 16   | Nonce (IV for AES-CTR) |
//! | 16     | 40   | Encrypted payload (8-byte signed filesize + 32-byte content key) |
//! | 56     | 32   | HMAC-SHA256 over nonce + encrypted payload |
//!
//! The filesize is a legacy field. Current writers store `-1` ("unknown");
//! older ones stored the cleartext length, which can disagree with the content.
//!
//! # Content Chunk Format (up to 32816 bytes)
//!
//! | Offset | Size | Description |
//! |--------|------|-------------|
//! | 0      | 16   | Chunk nonce |
//! | 16     | n    | AES-CTR encrypted payload (up to 32768 bytes) |
//! | 16+n   | 32   | HMAC-SHA256 over (header_nonce + chunk_number + nonce + ciphertext) |

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use ring::hmac;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};
use zeroize::Zeroizing;

use crate::crypto::keys::MasterKey;

use super::file::FileContext;

// ============================================================================
// Constants
// ============================================================================

/// Nonce size for AES-CTR (16 bytes)
pub const NONCE_SIZE: usize = 16;

/// HMAC-SHA256 output size (32 bytes)
pub const MAC_SIZE: usize = 32;

/// Cleartext payload size per chunk (32 KiB)
pub const PAYLOAD_SIZE: usize = 32 * 1024;

/// Total encrypted chunk size: nonce + payload + MAC
pub const CHUNK_SIZE: usize = NONCE_SIZE + PAYLOAD_SIZE + MAC_SIZE;

/// Per-chunk overhead: nonce + MAC
pub const CHUNK_OVERHEAD: usize = NONCE_SIZE + MAC_SIZE;

/// File header size: nonce + encrypted payload + MAC
pub const HEADER_SIZE: usize = NONCE_SIZE + HEADER_PAYLOAD_SIZE + MAC_SIZE; // 88 bytes

/// Header payload size (8-byte filesize + 32-byte content key)
const HEADER_PAYLOAD_SIZE: usize = 40;

/// Filesize value meaning "not recorded".
pub const UNKNOWN_FILESIZE: i64 = -1;

// ============================================================================
// Type Aliases
// ============================================================================

/// AES-256-CTR with big-endian 128-bit counter
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Error, Debug)]
pub enum CtrMacError {
    /// HMAC verification failed - possible tampering
    #[error("HMAC verification failed for {context}: possible tampering or wrong key")]
    HmacVerification { context: FileContext },

    /// Invalid header structure
    #[error("Invalid header for {context}: {reason}")]
    InvalidHeader { reason: String, context: FileContext },

    /// Invalid chunk structure
    #[error("Invalid chunk for {context}: {reason}")]
    InvalidChunk { reason: String, context: FileContext },
}

impl CtrMacError {
    /// True when a MAC did not verify, as opposed to malformed input.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, CtrMacError::HmacVerification { .. })
    }
}

// ============================================================================
// File Header
// ============================================================================

/// Decrypted file header.
///
/// The nonce is kept so the header can be re-encrypted in place: chunk MACs
/// cover it, so changing it would invalidate every chunk of the file.
#[derive(Clone)]
pub struct FileHeader {
    /// The nonce from the header (needed for chunk MAC calculation)
    pub nonce: [u8; NONCE_SIZE],
    content_key: Zeroizing<[u8; 32]>,
    /// Legacy cleartext size, `-1` when unknown
    pub filesize: i64,
}

impl fmt::Debug for FileHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHeader")
            .field("nonce", &hex::encode(self.nonce))
            .field("content_key", &"[REDACTED]")
            .field("filesize", &self.filesize)
            .finish()
    }
}

impl FileHeader {
    /// A fresh header with random nonce and content key and an unknown filesize.
    pub fn random() -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);
        let mut content_key = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(&mut *content_key);
        Self {
            nonce,
            content_key,
            filesize: UNKNOWN_FILESIZE,
        }
    }

    pub fn content_key(&self) -> &[u8; 32] {
        &self.content_key
    }
}

/// Decrypt a file header using AES-CTR + HMAC-SHA256.
#[instrument(level = "debug", skip(encrypted_header, master_key), fields(header_size = encrypted_header.len()))]
pub fn decrypt_header(
    encrypted_header: &[u8],
    master_key: &MasterKey,
    context: &FileContext,
) -> Result<FileHeader, CtrMacError> {
    trace!("Decrypting file header");

    if encrypted_header.len() != HEADER_SIZE {
        warn!(
            actual_size = encrypted_header.len(),
            expected_size = HEADER_SIZE,
            "Invalid header size"
        );
        return Err(CtrMacError::InvalidHeader {
            reason: format!(
                "expected {} bytes, got {} bytes",
                HEADER_SIZE,
                encrypted_header.len()
            ),
            context: context.clone(),
        });
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&encrypted_header[..NONCE_SIZE]);
    let ciphertext = &encrypted_header[NONCE_SIZE..NONCE_SIZE + HEADER_PAYLOAD_SIZE];
    let expected_mac = &encrypted_header[NONCE_SIZE + HEADER_PAYLOAD_SIZE..];

    // Authenticate before decrypting
    master_key.with_mac_key(|mac_key| {
        let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key);
        let computed_mac = hmac::sign(&key, &encrypted_header[..NONCE_SIZE + HEADER_PAYLOAD_SIZE]);

        if computed_mac.as_ref().ct_eq(expected_mac).into() {
            Ok(())
        } else {
            debug!("Header HMAC verification failed");
            Err(CtrMacError::HmacVerification {
                context: context.clone(),
            })
        }
    })?;

    let (filesize, content_key) = master_key.with_aes_key(|aes_key| {
        let mut cipher = Aes256Ctr::new(aes_key.into(), (&nonce).into());

        let mut plaintext = Zeroizing::new([0u8; HEADER_PAYLOAD_SIZE]);
        plaintext.copy_from_slice(ciphertext);
        cipher.apply_keystream(&mut *plaintext);

        let mut filesize_bytes = [0u8; 8];
        filesize_bytes.copy_from_slice(&plaintext[..8]);

        let mut content_key = Zeroizing::new([0u8; 32]);
        content_key.copy_from_slice(&plaintext[8..]);

        (i64::from_be_bytes(filesize_bytes), content_key)
    });

    debug!(filesize, "File header decrypted successfully");
    Ok(FileHeader {
        nonce,
        content_key,
        filesize,
    })
}

/// Encrypt a file header, reusing the header's own nonce.
pub fn encrypt_header(header: &FileHeader, master_key: &MasterKey) -> Vec<u8> {
    let mut plaintext = Zeroizing::new([0u8; HEADER_PAYLOAD_SIZE]);
    plaintext[..8].copy_from_slice(&header.filesize.to_be_bytes());
    plaintext[8..].copy_from_slice(header.content_key());

    let ciphertext = master_key.with_aes_key(|aes_key| {
        let mut cipher = Aes256Ctr::new(aes_key.into(), (&header.nonce).into());
        let mut encrypted = *plaintext;
        cipher.apply_keystream(&mut encrypted);
        encrypted
    });

    let mac = master_key.with_mac_key(|mac_key| {
        let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key);
        let mut mac_context = hmac::Context::with_key(&key);
        mac_context.update(&header.nonce);
        mac_context.update(&ciphertext);
        mac_context.sign()
    });

    let mut encrypted = Vec::with_capacity(HEADER_SIZE);
    encrypted.extend_from_slice(&header.nonce);
    encrypted.extend_from_slice(&ciphertext);
    encrypted.extend_from_slice(mac.as_ref());
    encrypted
}

// ============================================================================
// File Content
// ============================================================================

fn chunk_mac(
    hmac_key: &hmac::Key,
    header_nonce: &[u8; NONCE_SIZE],
    chunk_number: u64,
    chunk_nonce: &[u8],
    ciphertext: &[u8],
) -> hmac::Tag {
    // MAC(header_nonce || chunk_number_be || chunk_nonce || ciphertext)
    let mut mac_context = hmac::Context::with_key(hmac_key);
    mac_context.update(header_nonce);
    mac_context.update(&chunk_number.to_be_bytes());
    mac_context.update(chunk_nonce);
    mac_context.update(ciphertext);
    mac_context.sign()
}

/// Encrypt one cleartext chunk of at most [`PAYLOAD_SIZE`] bytes.
pub fn encrypt_chunk(
    cleartext: &[u8],
    chunk_number: u64,
    header: &FileHeader,
    master_key: &MasterKey,
) -> Vec<u8> {
    let mut chunk_nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut chunk_nonce);

    let mut cipher = Aes256Ctr::new(header.content_key().into(), (&chunk_nonce).into());
    let mut ciphertext = cleartext.to_vec();
    cipher.apply_keystream(&mut ciphertext);

    let mac = master_key.with_mac_key(|mac_key| {
        let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key);
        chunk_mac(&key, &header.nonce, chunk_number, &chunk_nonce, &ciphertext)
    });

    let mut chunk = Vec::with_capacity(ciphertext.len() + CHUNK_OVERHEAD);
    chunk.extend_from_slice(&chunk_nonce);
    chunk.extend_from_slice(&ciphertext);
    chunk.extend_from_slice(mac.as_ref());
    chunk
}

/// Decrypt one ciphertext chunk, optionally verifying its MAC first.
pub fn decrypt_chunk(
    chunk: &[u8],
    chunk_number: u64,
    header: &FileHeader,
    master_key: &MasterKey,
    authenticate: bool,
    base_context: &FileContext,
) -> Result<Vec<u8>, CtrMacError> {
    #[allow(clippy::cast_possible_truncation)]
    let context = || base_context.clone().with_chunk(chunk_number as usize);

    if chunk.len() < CHUNK_OVERHEAD || chunk.len() > CHUNK_SIZE {
        debug!(
            chunk = chunk_number,
            actual_size = chunk.len(),
            "Chunk has invalid size"
        );
        return Err(CtrMacError::InvalidChunk {
            reason: format!(
                "expected between {} and {} bytes, got {}",
                CHUNK_OVERHEAD,
                CHUNK_SIZE,
                chunk.len()
            ),
            context: context(),
        });
    }

    let chunk_nonce = &chunk[..NONCE_SIZE];
    let ciphertext = &chunk[NONCE_SIZE..chunk.len() - MAC_SIZE];
    let expected_mac = &chunk[chunk.len() - MAC_SIZE..];

    if authenticate {
        let verified = master_key.with_mac_key(|mac_key| {
            let key = hmac::Key::new(hmac::HMAC_SHA256, mac_key);
            let computed = chunk_mac(&key, &header.nonce, chunk_number, chunk_nonce, ciphertext);
            bool::from(computed.as_ref().ct_eq(expected_mac))
        });
        if !verified {
            debug!(chunk = chunk_number, "Chunk HMAC verification failed");
            return Err(CtrMacError::HmacVerification { context: context() });
        }
    }

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(chunk_nonce);
    let mut cipher = Aes256Ctr::new(header.content_key().into(), (&nonce).into());
    let mut plaintext = ciphertext.to_vec();
    cipher.apply_keystream(&mut plaintext);

    trace!(chunk = chunk_number, decrypted_size = plaintext.len(), "Chunk decrypted");
    Ok(plaintext)
}

/// Encrypt a whole cleartext buffer. Empty input yields no chunks.
pub fn encrypt_content(content: &[u8], header: &FileHeader, master_key: &MasterKey) -> Vec<u8> {
    let mut encrypted = Vec::with_capacity(ciphertext_size(content.len() as u64) as usize);
    for (chunk_number, chunk) in content.chunks(PAYLOAD_SIZE).enumerate() {
        encrypted.extend(encrypt_chunk(chunk, chunk_number as u64, header, master_key));
    }
    encrypted
}

/// Decrypt and authenticate a whole ciphertext buffer (everything after the header).
pub fn decrypt_content(
    encrypted_content: &[u8],
    header: &FileHeader,
    master_key: &MasterKey,
    base_context: &FileContext,
) -> Result<Vec<u8>, CtrMacError> {
    let mut decrypted = Vec::with_capacity(encrypted_content.len());
    for (chunk_number, chunk) in encrypted_content.chunks(CHUNK_SIZE).enumerate() {
        decrypted.extend(decrypt_chunk(
            chunk,
            chunk_number as u64,
            header,
            master_key,
            true,
            base_context,
        )?);
    }
    Ok(decrypted)
}

/// Size of the encrypted content (excluding header) for a cleartext size.
pub fn ciphertext_size(cleartext_size: u64) -> u64 {
    let payload = PAYLOAD_SIZE as u64;
    cleartext_size + cleartext_size.div_ceil(payload) * CHUNK_OVERHEAD as u64
}

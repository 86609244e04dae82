use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::crypto::cryptor::{Cryptor, CryptorError};
use crate::fs::name::char_prefix;

/// Context for file operations, providing debugging information.
#[derive(Debug, Clone, Default)]
pub struct FileContext {
    /// The cleartext filename (if known)
    pub filename: Option<String>,
    /// The encrypted path on disk
    pub encrypted_path: Option<PathBuf>,
    /// The parent directory ID
    pub dir_id: Option<String>,
    /// The chunk number (for content errors)
    pub chunk_number: Option<usize>,
}

impl FileContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.encrypted_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_dir_id(mut self, dir_id: impl Into<String>) -> Self {
        self.dir_id = Some(dir_id.into());
        self
    }

    #[must_use]
    pub fn with_chunk(mut self, chunk_number: usize) -> Self {
        self.chunk_number = Some(chunk_number);
        self
    }
}

impl fmt::Display for FileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(ref filename) = self.filename {
            parts.push(format!("file '{filename}'"));
        }
        if let Some(ref dir_id) = self.dir_id {
            let display_id = if dir_id.is_empty() {
                "<root>".to_string()
            } else if dir_id.chars().count() > 8 {
                format!("{}...", char_prefix(dir_id, 8))
            } else {
                dir_id.clone()
            };
            parts.push(format!("in directory {display_id}"));
        }
        if let Some(chunk) = self.chunk_number {
            parts.push(format!("chunk {chunk}"));
        }
        if let Some(ref path) = self.encrypted_path {
            parts.push(format!("at {:?}", path.display()));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("File is too small for {context}: expected at least {expected} bytes, got {actual}")]
    Truncated {
        expected: usize,
        actual: usize,
        context: FileContext,
    },

    #[error("Failed to decrypt header for {context}: {source}")]
    Header {
        #[source]
        source: CryptorError,
        context: FileContext,
    },

    #[error("Failed to decrypt content for {context}: {source}")]
    Content {
        #[source]
        source: CryptorError,
        context: FileContext,
    },

    #[error("IO error for {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: FileContext,
    },
}

impl FileError {
    /// Create an IO error with context
    #[must_use]
    pub fn io_with_context(source: io::Error, context: FileContext) -> Self {
        FileError::Io { source, context }
    }

    /// True when a header or chunk MAC failed to verify.
    pub fn is_authentication_failure(&self) -> bool {
        match self {
            FileError::Header { source, .. } | FileError::Content { source, .. } => {
                source.is_authentication_failure()
            }
            FileError::Truncated { .. } | FileError::Io { .. } => false,
        }
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read.
pub(crate) fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Stream a ciphertext file into a newly created cleartext file.
///
/// Every chunk is authenticated before it is written. On failure, whatever was
/// decrypted up to the failing chunk stays in `target`. The target must not
/// exist yet. Returns the number of cleartext bytes written.
#[instrument(level = "info", skip(cryptor), fields(source = %source.display(), target = %target.display()))]
pub fn decrypt_file(cryptor: &dyn Cryptor, source: &Path, target: &Path) -> Result<u64, FileError> {
    let context = FileContext::new().with_path(source);
    let io_err = |e| FileError::io_with_context(e, context.clone());

    let mut input = File::open(source).map_err(io_err)?;

    let mut header_bytes = vec![0u8; cryptor.header_size()];
    let read = read_up_to(&mut input, &mut header_bytes).map_err(io_err)?;
    if read != header_bytes.len() {
        warn!(actual_size = read, "File too small for a header");
        return Err(FileError::Truncated {
            expected: header_bytes.len(),
            actual: read,
            context: context.clone(),
        });
    }

    let header = cryptor
        .decrypt_header(&header_bytes)
        .map_err(|source| FileError::Header {
            source,
            context: context.clone(),
        })?;

    let output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| FileError::io_with_context(e, FileContext::new().with_path(target)))?;
    let mut output = BufWriter::new(output);

    let mut chunk = vec![0u8; cryptor.ciphertext_chunk_size()];
    let mut chunk_number: u64 = 0;
    let mut written: u64 = 0;
    loop {
        let read = read_up_to(&mut input, &mut chunk).map_err(io_err)?;
        if read == 0 {
            break;
        }

        let cleartext = match cryptor.decrypt_chunk(&chunk[..read], chunk_number, &header, true) {
            Ok(cleartext) => cleartext,
            Err(source) => {
                output.flush().map_err(io_err)?;
                #[allow(clippy::cast_possible_truncation)]
                let context = context.clone().with_chunk(chunk_number as usize);
                return Err(FileError::Content { source, context });
            }
        };
        trace!(chunk = chunk_number, size = cleartext.len(), "Chunk decrypted");

        output.write_all(&cleartext).map_err(io_err)?;
        written += cleartext.len() as u64;
        chunk_number += 1;
    }

    output.flush().map_err(io_err)?;
    debug!(chunks = chunk_number, bytes = written, "File decrypted");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CtrMacCryptor, MasterKey};
    use tempfile::TempDir;

    fn write_ciphertext(cryptor: &CtrMacCryptor, path: &Path, content: &[u8]) {
        let header = cryptor.create_header();
        let mut bytes = cryptor.encrypt_header(&header);
        for (i, chunk) in content.chunks(cryptor.cleartext_chunk_size()).enumerate() {
            bytes.extend(cryptor.encrypt_chunk(chunk, i as u64, &header));
        }
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_decrypt_file_multi_chunk() {
        let temp = TempDir::new().unwrap();
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let content: Vec<u8> = (0..70_000).map(|i| (i % 251) as u8).collect();
        let source = temp.path().join("cipher");
        let target = temp.path().join("clear");
        write_ciphertext(&cryptor, &source, &content);

        let written = decrypt_file(&cryptor, &source, &target).unwrap();
        assert_eq!(written, 70_000);
        assert_eq!(std::fs::read(&target).unwrap(), content);
    }

    #[test]
    fn test_decrypt_file_refuses_existing_target() {
        let temp = TempDir::new().unwrap();
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let source = temp.path().join("cipher");
        let target = temp.path().join("clear");
        write_ciphertext(&cryptor, &source, b"hi");
        std::fs::write(&target, b"keep me").unwrap();

        let err = decrypt_file(&cryptor, &source, &target).unwrap_err();
        assert!(matches!(err, FileError::Io { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"keep me");
    }

    #[test]
    fn test_decrypt_file_keeps_prefix_on_tampered_chunk() {
        let temp = TempDir::new().unwrap();
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let content = vec![7u8; 40_000];
        let source = temp.path().join("cipher");
        let target = temp.path().join("clear");
        write_ciphertext(&cryptor, &source, &content);

        let mut bytes = std::fs::read(&source).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        std::fs::write(&source, bytes).unwrap();

        let err = decrypt_file(&cryptor, &source, &target).unwrap_err();
        assert!(err.is_authentication_failure());
        assert_eq!(std::fs::read(&target).unwrap().len(), 32 * 1024);
    }

    #[test]
    fn test_context_display_truncates_non_ascii_dir_id() {
        let context = FileContext::new()
            .with_filename("notes.txt")
            .with_dir_id("abcdefg\u{e9}-corrupt")
            .with_chunk(2);
        assert_eq!(
            context.to_string(),
            "file 'notes.txt', in directory abcdefg\u{e9}..., chunk 2"
        );
    }

    #[test]
    fn test_decrypt_file_too_small() {
        let temp = TempDir::new().unwrap();
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let source = temp.path().join("cipher");
        std::fs::write(&source, [0u8; 10]).unwrap();

        let err = decrypt_file(&cryptor, &source, &temp.path().join("clear")).unwrap_err();
        assert!(matches!(err, FileError::Truncated { actual: 10, .. }));
    }
}

//! Solutions that rewrite the legacy size field of a file header.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};

use tracing::debug;

use crate::fs::file::read_up_to;
use crate::fs::file_ctrmac::{FileHeader, UNKNOWN_FILESIZE};
use crate::problem::SensitivePath;

use super::{SolutionContext, SolutionError};

fn open(ctx: &dyn SolutionContext, file: &SensitivePath) -> Result<File, SolutionError> {
    OpenOptions::new()
        .read(true)
        .write(!ctx.dry_run())
        .open(file.path())
        .map_err(SolutionError::io(file))
}

fn read_header(
    ctx: &dyn SolutionContext,
    file: &SensitivePath,
    handle: &mut File,
) -> Result<FileHeader, SolutionError> {
    let mut bytes = vec![0u8; ctx.cryptor().header_size()];
    let read = read_up_to(handle, &mut bytes).map_err(SolutionError::io(file))?;
    if read != bytes.len() {
        return Err(SolutionError::TruncatedHeader(file.to_string()));
    }
    Ok(ctx.cryptor().decrypt_header(&bytes)?)
}

/// Re-encrypt `header` with an unknown size over the first bytes of the
/// file. The nonce is kept so existing chunks stay valid.
fn write_cleared_header(
    ctx: &dyn SolutionContext,
    file: &SensitivePath,
    handle: &mut File,
    mut header: FileHeader,
) -> Result<(), SolutionError> {
    header.filesize = UNKNOWN_FILESIZE;
    let bytes = ctx.cryptor().encrypt_header(&header);
    if !ctx.dry_run() {
        handle.seek(SeekFrom::Start(0)).map_err(SolutionError::io(file))?;
        handle.write_all(&bytes).map_err(SolutionError::io(file))?;
        handle.flush().map_err(SolutionError::io(file))?;
    }
    Ok(())
}

pub(super) fn clear_zero_size(
    ctx: &mut dyn SolutionContext,
    file: &SensitivePath,
) -> Result<(), SolutionError> {
    let mut handle = open(ctx, file)?;
    let header = read_header(ctx, file, &mut handle)?;
    write_cleared_header(ctx, file, &mut handle, header)
}

/// Cut the file to the cleartext size stored in its header, then clear the
/// stored size.
///
/// Content beyond the stored size is dropped. When the new end falls inside
/// a chunk, that chunk is decrypted, cut and encrypted again.
pub(super) fn fix_file_size(
    ctx: &mut dyn SolutionContext,
    file: &SensitivePath,
) -> Result<(), SolutionError> {
    let mut handle = open(ctx, file)?;
    let header = read_header(ctx, file, &mut handle)?;
    let actual = handle.metadata().map_err(SolutionError::io(file))?.len();
    let stored = header.filesize;
    let cleartext_size = match u64::try_from(stored) {
        Ok(size) if size <= actual => size,
        _ => return Err(SolutionError::InvalidFileSize { stored, actual }),
    };

    let cryptor = ctx.cryptor();
    let header_size = cryptor.header_size() as u64;
    let chunk_size = cryptor.ciphertext_chunk_size() as u64;
    let payload_size = cryptor.cleartext_chunk_size() as u64;
    let new_ciphertext_size = cryptor.ciphertext_size(cleartext_size);
    let new_end = header_size + new_ciphertext_size;
    let full_chunks = new_ciphertext_size / chunk_size;

    if new_ciphertext_size % chunk_size == 0 {
        debug!(new_end, "Truncating at a chunk boundary");
        if !ctx.dry_run() {
            handle.set_len(new_end).map_err(SolutionError::io(file))?;
        }
    } else {
        let last_chunk = full_chunks;
        let chunk_start = header_size + last_chunk * chunk_size;
        #[allow(clippy::cast_possible_truncation)]
        let last_len = (cleartext_size % payload_size) as usize;

        handle
            .seek(SeekFrom::Start(chunk_start))
            .map_err(SolutionError::io(file))?;
        #[allow(clippy::cast_possible_truncation)]
        let mut buf = vec![0u8; chunk_size as usize];
        let read = read_up_to(&mut handle, &mut buf).map_err(SolutionError::io(file))?;
        if read == 0 {
            return Err(SolutionError::UnexpectedEof {
                position: chunk_start,
                expected_end: new_end,
            });
        }
        let cleartext = cryptor.decrypt_chunk(&buf[..read], last_chunk, &header, true)?;
        if cleartext.len() < last_len {
            return Err(SolutionError::InvalidFileSize { stored, actual });
        }
        let ciphertext = cryptor.encrypt_chunk(&cleartext[..last_len], last_chunk, &header);
        debug!(chunk = last_chunk, new_end, "Re-encrypting last chunk");
        if !ctx.dry_run() {
            handle
                .seek(SeekFrom::Start(chunk_start))
                .map_err(SolutionError::io(file))?;
            handle.write_all(&ciphertext).map_err(SolutionError::io(file))?;
            handle
                .set_len(chunk_start + ciphertext.len() as u64)
                .map_err(SolutionError::io(file))?;
        }
    }

    write_cleared_header(ctx, file, &mut handle, header)
}

//! Header and content authentication of encrypted files.

use std::fs::File;
use std::path::Path;

use tracing::trace;

use crate::fs::file::read_up_to;
use crate::fs::file_ctrmac::UNKNOWN_FILESIZE;
use crate::problem::ProblemSink;

use super::{CheckContext, CheckError};

/// Authenticate the header of `path`, and every chunk when checking deep.
///
/// A header that does not authenticate ends the check for the node. Chunk
/// failures are reported one by one and do not stop the scan.
pub(super) fn authentic(
    ctx: &CheckContext<'_>,
    problems: &mut ProblemSink,
    path: &Path,
) -> Result<(), CheckError> {
    let cryptor = ctx.cryptor;
    let mut file = File::open(path).map_err(CheckError::io(path))?;

    let mut header_bytes = vec![0u8; cryptor.header_size()];
    let read = read_up_to(&mut file, &mut header_bytes).map_err(CheckError::io(path))?;
    if read != header_bytes.len() {
        problems.report_size_mismatch(path, "at least 88 bytes", read as u64);
        return Ok(());
    }

    let Ok(header) = cryptor.decrypt_header(&header_bytes) else {
        problems.report_unauthentic_header(path);
        return Ok(());
    };

    if header.filesize != UNKNOWN_FILESIZE {
        problems.report_size_in_header(path, header.filesize);
    }

    if !ctx.deep {
        return Ok(());
    }

    let mut chunk = vec![0u8; cryptor.ciphertext_chunk_size()];
    let mut chunk_number: u64 = 0;
    loop {
        let read = read_up_to(&mut file, &mut chunk).map_err(CheckError::io(path))?;
        if read == 0 {
            break;
        }
        if let Err(e) = cryptor.decrypt_chunk(&chunk[..read], chunk_number, &header, true) {
            trace!(path = %path.display(), chunk = chunk_number, error = %e, "Chunk failed to authenticate");
            problems.report_unauthentic_content(path, chunk_number);
        }
        chunk_number += 1;
    }
    Ok(())
}

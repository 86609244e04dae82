//! Checks that only look at a node's own name, size or content.

use std::fs::{self, File};
use std::path::Path;

use crate::fs::file::read_up_to;
use crate::grammar::{self, MAX_NAME_LENGTH, NameShape, NodePattern};
use crate::problem::{ProblemSink, Severity};
use crate::vault::master_key::MasterKeyFile;

use super::{CheckContext, CheckError};

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn size_of(path: &Path) -> Result<u64, CheckError> {
    Ok(fs::metadata(path).map_err(CheckError::io(path))?.len())
}

pub(super) fn has_name(
    pattern: NodePattern,
    problems: &mut ProblemSink,
    path: &Path,
) -> Result<(), CheckError> {
    if !pattern.matches(&file_name(path)) {
        problems.report_name_problem(format!("^{}$", pattern.source()), path);
    }
    Ok(())
}

/// The ciphertext part of a name must be uppercase. Names without one, such
/// as shard directories, are checked as a whole.
pub(super) fn no_lowercase(problems: &mut ProblemSink, path: &Path) -> Result<(), CheckError> {
    let name = file_name(path);
    let relevant = grammar::ciphertext_core(&name).map_or(name.as_str(), |core| &name[core]);
    if relevant.chars().any(char::is_lowercase) {
        problems.report_lowercased_file(path);
    }
    Ok(())
}

pub(super) fn no_uppercase(problems: &mut ProblemSink, path: &Path) -> Result<(), CheckError> {
    if file_name(path).chars().any(char::is_uppercase) {
        problems.report_uppercased_file(path);
    }
    Ok(())
}

pub(super) fn has_size(size: u64, problems: &mut ProblemSink, path: &Path) -> Result<(), CheckError> {
    let actual = size_of(path)?;
    if actual != size {
        problems.report_size_mismatch(path, format!("= {size}"), actual);
    }
    Ok(())
}

pub(super) fn has_min_size(
    min_size: u64,
    problems: &mut ProblemSink,
    path: &Path,
) -> Result<(), CheckError> {
    let actual = size_of(path)?;
    if actual < min_size {
        problems.report_size_mismatch(path, format!(">= {min_size}"), actual);
    }
    Ok(())
}

pub(super) fn contains_uuid(problems: &mut ProblemSink, path: &Path) -> Result<(), CheckError> {
    let mut file = File::open(path).map_err(CheckError::io(path))?;
    let mut buf = [0u8; grammar::DIRECTORY_ID_FILE_SIZE as usize];
    let read = read_up_to(&mut file, &mut buf).map_err(CheckError::io(path))?;
    let content = String::from_utf8_lossy(&buf[..read]);
    if !grammar::is_uuid(&content) {
        problems.report_content_mismatch(path, "a uuid", content);
    }
    Ok(())
}

pub(super) fn contains_valid_name(
    shape: NameShape,
    problems: &mut ProblemSink,
    path: &Path,
) -> Result<(), CheckError> {
    const DESCRIPTION: &str = "a valid name";
    if size_of(path)? > MAX_NAME_LENGTH {
        problems.report_content_mismatch(
            path,
            DESCRIPTION,
            format!("a value longer {MAX_NAME_LENGTH} bytes"),
        );
        return Ok(());
    }
    let bytes = fs::read(path).map_err(CheckError::io(path))?;
    let content = String::from_utf8_lossy(&bytes);
    if !shape.matches(&content) {
        problems.report_content_mismatch(path, DESCRIPTION, content);
    }
    Ok(())
}

/// A file of exactly one header holds no content.
pub(super) fn empty_encrypted_file_if_empty(
    ctx: &CheckContext<'_>,
    problems: &mut ProblemSink,
    path: &Path,
) -> Result<(), CheckError> {
    if size_of(path)? == ctx.cryptor.header_size() as u64 {
        problems.report_empty_encrypted_file(path);
    }
    Ok(())
}

/// Only the structure of the backup is checked; the keys in it are not
/// unlocked.
pub(super) fn masterkey_backup(problems: &mut ProblemSink, path: &Path) -> Result<(), CheckError> {
    let bytes = fs::read(path).map_err(CheckError::io(path))?;
    if MasterKeyFile::parse(&bytes).is_err() {
        problems.report_invalid_masterkey_file(path, Severity::Warn);
    }
    Ok(())
}

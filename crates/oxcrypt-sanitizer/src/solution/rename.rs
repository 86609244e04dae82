//! Solutions that move, rename or delete nodes.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::fs::name::{DIR_PREFIX, long_name_stub, needs_shortening};
use crate::grammar::{self, decryptable_part};
use crate::problem::{EncryptedNodeInfo, SensitivePath};
use crate::vault::m_file_path;

use super::{SolutionContext, SolutionError};

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or(Path::new(""))
}

/// `name` with its ciphertext part uppercased. Names without a ciphertext
/// part are uppercased as a whole.
fn uppercase_ciphertext(name: &str) -> String {
    match grammar::ciphertext_core(name) {
        Some(core) => format!(
            "{}{}{}",
            &name[..core.start],
            name[core.clone()].to_ascii_uppercase(),
            &name[core.end..]
        ),
        None => name.to_uppercase(),
    }
}

/// Whether `dir` holds a node named exactly `name`, regardless of how the
/// filesystem compares case.
fn exact_name_exists(dir: &Path, name: &str, display: &SensitivePath) -> Result<bool, SolutionError> {
    for entry in fs::read_dir(dir).map_err(SolutionError::io(display))? {
        let entry = entry.map_err(SolutionError::io(display))?;
        if entry.file_name().to_string_lossy() == name {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Move `file` to `target_name` next to it via a random temporary name, so
/// case-only renames work on case-insensitive filesystems.
fn change_case(
    ctx: &mut dyn SolutionContext,
    file: &SensitivePath,
    target_name: &str,
) -> Result<(), SolutionError> {
    let path = file.path();
    let name = file_name(path);
    if name == target_name {
        return Ok(());
    }
    let parent = parent_of(path);
    let target = parent.join(target_name);
    if exact_name_exists(parent, target_name, file)? {
        return Err(SolutionError::TargetExists(ctx.sensitive(&target).to_string()));
    }
    if ctx.dry_run() {
        return Ok(());
    }

    let temp = loop {
        let candidate = parent.join(format!("{name}_{}", ctx.temp_suffix()));
        if !candidate.exists() {
            break candidate;
        }
    };
    debug!(from = %path.display(), via = %temp.display(), to = %target.display(), "Changing case");
    fs::rename(path, &temp).map_err(SolutionError::io(file))?;
    fs::rename(&temp, &target).map_err(SolutionError::io(file))?;
    Ok(())
}

pub(super) fn fix_lowercase(
    ctx: &mut dyn SolutionContext,
    file: &SensitivePath,
) -> Result<(), SolutionError> {
    let target = uppercase_ciphertext(&file_name(file.path()));
    change_case(ctx, file, &target)
}

pub(super) fn fix_uppercase(
    ctx: &mut dyn SolutionContext,
    file: &SensitivePath,
) -> Result<(), SolutionError> {
    let target = file_name(file.path()).to_lowercase();
    change_case(ctx, file, &target)
}

pub(super) fn append_padding(
    ctx: &mut dyn SolutionContext,
    file: &SensitivePath,
) -> Result<(), SolutionError> {
    let path = file.path();
    let name = file_name(path);
    let missing = grammar::missing_padding(&name);
    if missing == 0 {
        return Ok(());
    }
    let target = parent_of(path).join(format!("{name}{}", "=".repeat(missing)));
    if target.exists() {
        return Err(SolutionError::TargetExists(ctx.sensitive(&target).to_string()));
    }
    if !ctx.dry_run() {
        fs::rename(path, &target).map_err(SolutionError::io(file))?;
    }
    Ok(())
}

pub(super) fn delete_orphan_m_file(
    ctx: &mut dyn SolutionContext,
    m_file: &SensitivePath,
) -> Result<(), SolutionError> {
    if !m_file.path().is_file() {
        return Err(SolutionError::Io {
            path: m_file.to_string(),
            source: std::io::ErrorKind::NotFound.into(),
        });
    }
    if !ctx.dry_run() {
        fs::remove_file(m_file.path()).map_err(SolutionError::io(m_file))?;
    }
    Ok(())
}

/// Where a renamed node goes: its new name in the container and, for
/// shortened names, the m-file holding the full name.
struct Placement {
    node: PathBuf,
    m_file: Option<PathBuf>,
    full_name: String,
}

/// Re-encrypt the NFC form of a node's name, appending ` (n)` until the
/// result is free.
///
/// A shortened node stays shortened and gets a new m-file; the old m-file
/// is left behind and shows up as an orphan in the next check.
pub(super) fn renormalize(
    ctx: &mut dyn SolutionContext,
    node: &EncryptedNodeInfo,
) -> Result<(), SolutionError> {
    let path = node.file.path();
    let stored_name = match &node.m_file {
        Some(m_file) => {
            let bytes = fs::read(m_file.path()).map_err(SolutionError::io(m_file))?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
        None => file_name(path),
    };
    let ciphertext = decryptable_part(&stored_name)
        .ok_or_else(|| SolutionError::NoDecryptablePart(node.file.to_string()))?;
    let is_directory_file = stored_name.starts_with(DIR_PREFIX);

    let cleartext = ctx
        .cryptor()
        .decrypt_filename(&ciphertext, &node.directory_id)?;
    let normalized: String = cleartext.nfc().collect();

    let parent = parent_of(path);
    let mut counter = 0u32;
    let placement = loop {
        let candidate = if counter == 0 {
            normalized.clone()
        } else {
            format!("{normalized} ({counter})")
        };
        let encrypted = ctx
            .cryptor()
            .encrypt_filename(&candidate, &node.directory_id)?;
        let full_name = if is_directory_file {
            format!("{DIR_PREFIX}{encrypted}")
        } else {
            encrypted
        };
        let placement = if node.m_file.is_some() || needs_shortening(&full_name) {
            let stub = long_name_stub(&full_name);
            Placement {
                node: parent.join(&stub),
                m_file: Some(m_file_path(ctx.vault_root(), &stub)),
                full_name,
            }
        } else {
            Placement {
                node: parent.join(&full_name),
                m_file: None,
                full_name,
            }
        };
        if !placement.node.exists() {
            break placement;
        }
        counter += 1;
    };

    debug!(to = %placement.node.display(), attempts = counter + 1, "Normalized name placed");
    if ctx.dry_run() {
        return Ok(());
    }
    fs::rename(path, &placement.node).map_err(SolutionError::io(&node.file))?;
    if let Some(m_file) = &placement.m_file {
        let display = ctx.sensitive(m_file);
        if let Some(dir) = m_file.parent() {
            fs::create_dir_all(dir).map_err(SolutionError::io(&display))?;
        }
        fs::write(m_file, placement.full_name.as_bytes()).map_err(SolutionError::io(&display))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uppercase_ciphertext_keeps_suffixes() {
        assert_eq!(
            uppercase_ciphertext("abcdefghijklmnopqrstuvwxyz234567.lng"),
            "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567.lng"
        );
        assert_eq!(
            uppercase_ciphertext("0abcdefghijklmnopqrstuvwxyz234567 (copy)"),
            "0ABCDEFGHIJKLMNOPQRSTUVWXYZ234567 (copy)"
        );
        assert_eq!(uppercase_ciphertext("ab"), "AB");
    }
}

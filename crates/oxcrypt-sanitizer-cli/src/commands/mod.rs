pub mod check;
pub mod decrypt_file;
pub mod decrypt_vault;
pub mod encrypt_path;

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;
use tracing::debug;

use oxcrypt_sanitizer::crypto::CtrMacCryptor;
use oxcrypt_sanitizer::problem::{Problem, ProblemSink};
use oxcrypt_sanitizer::vault::load_cryptor;

use crate::auth::{PasswordOptions, get_passphrase};

/// Why a vault could not be opened at all.
#[derive(Error, Debug)]
pub enum VaultAccessError {
    #[error("Vault path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Vault path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Masterkey file not found in {}", .0.display())]
    MasterkeyMissing(PathBuf),

    #[error("Cannot use the masterkey file: {0}")]
    MasterkeyUnusable(String),
}

/// Check that `path` is an existing directory.
pub fn resolve_vault_path(path: &Path) -> Result<PathBuf, VaultAccessError> {
    if !path.exists() {
        return Err(VaultAccessError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(VaultAccessError::NotADirectory(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

/// Unlock the vault at `vault`, turning masterkey findings into errors.
///
/// Used by the commands that need a cryptor but do not report problems.
pub fn unlock_vault(vault: &Path, password_opts: &PasswordOptions) -> Result<CtrMacCryptor> {
    let passphrase = get_passphrase(password_opts)?;
    let mut problems = ProblemSink::new(vault);
    if let Some(cryptor) = load_cryptor(&mut problems, vault, &passphrase)? {
        return Ok(cryptor);
    }

    let problems = problems.into_set();
    debug!(problems = problems.len(), "Vault could not be unlocked");
    let error = if problems
        .iter()
        .any(|p| matches!(p, Problem::MissingFile { .. }))
    {
        VaultAccessError::MasterkeyMissing(vault.to_path_buf())
    } else {
        let reasons: Vec<String> = problems.iter().map(ToString::to_string).collect();
        VaultAccessError::MasterkeyUnusable(reasons.join("; "))
    };
    Err(error.into())
}

/// Strip a leading `/` so both `/a/b` and `a/b` name the same vault path.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/docs/a.txt"), "docs/a.txt");
        assert_eq!(normalize_path("docs"), "docs");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn test_resolve_missing_vault() {
        let err = resolve_vault_path(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, VaultAccessError::NotFound(_)));
    }
}

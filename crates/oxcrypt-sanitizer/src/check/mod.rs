//! Integrity check of a format 6 vault.
//!
//! The check is a tree of [`Rule`]s that mirrors the vault layout. It is
//! walked in lock-step with the real directory tree: every child of a
//! directory is matched against the rules of that directory, the first
//! matching rule validates it, and anything unmatched is suspect.
//!
//! Errors are two-level. An [`AbortError`] ends the run and is returned to
//! the caller. Every other [`CheckError`] is recorded as a FATAL
//! `Exception` problem where it occurred, and the walk continues with the
//! next check.

pub mod auth;
pub mod name;
pub mod node;
pub mod reference;
pub mod rule;
pub mod vault;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

use crate::crypto::{Cryptor, CryptorError};
use crate::index::{CrossReferenceIndexes, IndexError};
use crate::problem::{ProblemSet, ProblemSink};
use crate::vault::unlock::{AbortError, load_cryptor};

pub use rule::{Check, NodeKind, Rule};
pub use vault::vault_rules;

/// Options of one check run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Authenticate every content chunk, not only file headers.
    pub deep: bool,
}

/// Why a single check could not complete.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Ends the whole run.
    #[error(transparent)]
    Abort(#[from] AbortError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Cryptor(#[from] CryptorError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl CheckError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> CheckError + '_ {
        move |source| CheckError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// State shared by all checks of one run.
pub struct CheckContext<'a> {
    pub cryptor: &'a dyn Cryptor,
    pub vault_root: PathBuf,
    pub deep: bool,
    pub indexes: CrossReferenceIndexes,
}

impl<'a> CheckContext<'a> {
    pub fn new(cryptor: &'a dyn Cryptor, vault_root: &Path, options: CheckOptions) -> Self {
        Self {
            cryptor,
            vault_root: vault_root.to_path_buf(),
            deep: options.deep,
            indexes: CrossReferenceIndexes::new(vault_root),
        }
    }
}

/// Check the vault at `vault_root` with an already unlocked cryptor.
#[instrument(level = "info", skip(cryptor, problems), fields(vault = %vault_root.display(), deep = options.deep))]
pub fn check_vault(
    cryptor: &dyn Cryptor,
    vault_root: &Path,
    options: CheckOptions,
    problems: &mut ProblemSink,
) -> Result<(), AbortError> {
    let mut ctx = CheckContext::new(cryptor, vault_root, options);
    let rules = vault_rules();
    rules.apply(&mut ctx, problems, vault_root)?;
    info!(problems = problems.len(), "Vault checked");
    Ok(())
}

/// Entry point combining key loading and the check.
pub struct IntegrityCheck;

impl IntegrityCheck {
    /// Unlock the vault with `passphrase` and check it.
    ///
    /// A missing or unreadable masterkey file yields a problem set holding
    /// only that finding.
    pub fn run(
        vault_root: &Path,
        passphrase: &str,
        options: CheckOptions,
    ) -> Result<ProblemSet, AbortError> {
        let mut problems = ProblemSink::new(vault_root);
        if let Some(cryptor) = load_cryptor(&mut problems, vault_root, passphrase)? {
            check_vault(&cryptor, vault_root, options, &mut problems)?;
        }
        Ok(problems.into_set())
    }
}

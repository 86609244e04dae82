//! Encrypt-path command - find the ciphertext node of a cleartext path.
//!
//! Handy for locating a file a check reported by its cleartext name. When a
//! directory-id file on the way is missing, the id is asked for on the
//! terminal.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;
use tracing::warn;

use oxcrypt_sanitizer::vault::CiphertextPathResolver;

use super::{normalize_path, unlock_vault};
use crate::auth::{PasswordOptions, prompt_directory_id};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Cleartext path inside the vault, e.g. /docs/report.txt
    pub path: String,
}

pub fn execute(vault: &Path, args: &Args, password_opts: &PasswordOptions) -> Result<()> {
    let cleartext = normalize_path(&args.path);
    if cleartext.is_empty() {
        bail!("The vault root has no ciphertext node");
    }

    let cryptor = unlock_vault(vault, password_opts)?;
    let mut resolver = CiphertextPathResolver::new(&cryptor, vault, prompt_directory_id);
    let node = resolver
        .resolve(&cleartext)
        .with_context(|| format!("Failed to resolve {}", args.path))?;

    if !node.exists() {
        warn!(node = %node.display(), "Resolved node does not exist");
    }
    println!("Resolved: {}", node.display());
    Ok(())
}

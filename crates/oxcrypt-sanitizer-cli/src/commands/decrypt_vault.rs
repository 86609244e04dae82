//! Decrypt-vault command - rebuild the cleartext tree of a damaged vault.
//!
//! Everything reachable from the root lands under `<target>/root`, trees
//! whose parent is lost under `<target>/lost+found`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::warn;

use oxcrypt_sanitizer::reconstruct::reconstruct;

use super::unlock_vault;
use crate::auth::PasswordOptions;
use crate::output::export_table;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory to decrypt into, created if missing
    pub target: PathBuf,
}

pub fn execute(vault: &Path, args: &Args, password_opts: &PasswordOptions) -> Result<()> {
    let cryptor = unlock_vault(vault, password_opts)?;

    let summary = reconstruct(&cryptor, vault, &args.target)
        .with_context(|| format!("Failed to decrypt vault into {}", args.target.display()))?;

    for failed in &summary.failed_files {
        warn!(file = %failed.source.display(), reason = %failed.reason, "File not decrypted");
        eprintln!("Could not decrypt {}: {}", failed.source.display(), failed.reason);
    }
    println!("{}", export_table(&summary));
    println!("Decrypted vault into {}.", args.target.display());
    Ok(())
}

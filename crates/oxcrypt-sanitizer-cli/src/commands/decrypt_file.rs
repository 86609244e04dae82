use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args as ClapArgs;

use oxcrypt_sanitizer::fs::decrypt_file;

use super::unlock_vault;
use crate::auth::PasswordOptions;
use crate::output::format_size;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Encrypted file below the vault's `d` directory
    pub ciphertext: PathBuf,

    /// Where to write the cleartext, must not exist yet
    pub output: PathBuf,
}

pub fn execute(vault: &Path, args: &Args, password_opts: &PasswordOptions) -> Result<()> {
    let cryptor = unlock_vault(vault, password_opts)?;

    let written = decrypt_file(&cryptor, &args.ciphertext, &args.output)
        .with_context(|| format!("Failed to decrypt {}", args.ciphertext.display()))?;

    println!(
        "Decrypted {} to {} ({})",
        args.ciphertext.display(),
        args.output.display(),
        format_size(written)
    );
    Ok(())
}

#![deny(unsafe_code)]

mod auth;
mod commands;
mod exit_code;
mod output;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use oxcrypt_sanitizer::error::{AbortError, FileError, ResolveError};

use crate::auth::PasswordOptions;
use crate::commands::{VaultAccessError, check, decrypt_file, decrypt_vault, encrypt_path, resolve_vault_path};

/// Integrity checker and recovery tool for Cryptomator format 6 vaults
#[derive(Parser)]
#[command(name = "oxsan")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Check a vault, writing vault.structure.txt and vault.check.txt
    oxsan check ~/vault

    # Authenticate all content and repair names
    oxsan check ~/vault --deep --solve MissingEqualsSign --solve LowercasedFile

    # Rescue whatever can still be decrypted
    echo \"$SECRET\" | oxsan --password-stdin decrypt-vault ~/vault ~/rescued

    # Find the encrypted file behind a cleartext path
    oxsan encrypt-path ~/vault /docs/report.txt
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress log output and error messages
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Vault passphrase (insecure, prefer --password-stdin or OXSAN_PASSWORD)
    #[arg(long, env = "OXSAN_PASSWORD", hide_env_values = true, global = true)]
    password: Option<String>,

    /// Read passphrase from stdin (single line)
    #[arg(long, conflicts_with = "password", global = true)]
    password_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

impl From<&Cli> for PasswordOptions {
    fn from(cli: &Cli) -> Self {
        Self {
            password: cli.password.clone(),
            password_stdin: cli.password_stdin,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check a vault for problems and optionally solve them
    Check(VaultCommand<check::Args>),

    /// Decrypt a whole, possibly damaged, vault into a directory
    DecryptVault(VaultCommand<decrypt_vault::Args>),

    /// Decrypt a single encrypted file
    DecryptFile(VaultCommand<decrypt_file::Args>),

    /// Print the encrypted path of a cleartext path
    EncryptPath(VaultCommand<encrypt_path::Args>),
}

/// Wrapper for commands that operate on a vault
#[derive(Parser, Clone)]
pub struct VaultCommand<T: clap::Args> {
    /// Path to the vault directory
    #[arg(value_name = "VAULT")]
    pub vault: PathBuf,

    #[command(flatten)]
    pub args: T,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    if !quiet {
        setup_tracing(cli.verbose);
    }

    match run(cli) {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            if !quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let password_opts = PasswordOptions::from(&cli);

    match cli.command {
        Commands::Check(cmd) => {
            let vault = resolve_vault_path(&cmd.vault)?;
            check::execute(&vault, &cmd.args, &password_opts)
        }
        Commands::DecryptVault(cmd) => {
            let vault = resolve_vault_path(&cmd.vault)?;
            decrypt_vault::execute(&vault, &cmd.args, &password_opts)
        }
        Commands::DecryptFile(cmd) => {
            let vault = resolve_vault_path(&cmd.vault)?;
            decrypt_file::execute(&vault, &cmd.args, &password_opts)
        }
        Commands::EncryptPath(cmd) => {
            let vault = resolve_vault_path(&cmd.vault)?;
            encrypt_path::execute(&vault, &cmd.args, &password_opts)
        }
    }
}

fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Map an error chain to the exit code scripts see.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(abort) = cause.downcast_ref::<AbortError>() {
            return match abort {
                AbortError::InvalidPassphrase => exit_code::AUTH_FAILED,
                AbortError::VersionMismatch { .. }
                | AbortError::VersionMacMismatch
                | AbortError::CryptoUnavailable(_) => exit_code::VAULT_INVALID,
            };
        }

        if let Some(access) = cause.downcast_ref::<VaultAccessError>() {
            return match access {
                VaultAccessError::NotFound(_) | VaultAccessError::MasterkeyMissing(_) => {
                    exit_code::NOT_FOUND
                }
                VaultAccessError::NotADirectory(_) | VaultAccessError::MasterkeyUnusable(_) => {
                    exit_code::VAULT_INVALID
                }
            };
        }

        if let Some(ResolveError::MissingDirectoryId(_)) = cause.downcast_ref::<ResolveError>() {
            return exit_code::NOT_FOUND;
        }

        if let Some(FileError::Header { .. } | FileError::Content { .. }) = cause.downcast_ref::<FileError>() {
            return exit_code::VAULT_INVALID;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && io_err.kind() == io::ErrorKind::NotFound
        {
            return exit_code::NOT_FOUND;
        }
    }

    exit_code::GENERAL_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_categorize_abort_errors() {
        let e = anyhow::Error::new(AbortError::InvalidPassphrase);
        assert_eq!(categorize_error(&e), exit_code::AUTH_FAILED);

        let e = anyhow::Error::new(AbortError::VersionMismatch { expected: 6, actual: 7 });
        assert_eq!(categorize_error(&e), exit_code::VAULT_INVALID);
    }

    #[test]
    fn test_categorize_wrapped_not_found() {
        let e = anyhow::Error::new(io::Error::from(io::ErrorKind::NotFound)).context("Failed to open");
        assert_eq!(categorize_error(&e), exit_code::NOT_FOUND);

        let e = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&e), exit_code::GENERAL_ERROR);
    }

    #[test]
    fn test_solve_rejects_unsolvable_names() {
        let result = Cli::try_parse_from(["oxsan", "check", "v", "--solve", "Conflict"]);
        assert!(result.is_err());

        let result = Cli::try_parse_from(["oxsan", "check", "v", "--solve", "OrphanMFile", "--dry-run"]);
        assert!(result.is_ok());
    }

    #[test]
    fn test_dry_run_requires_solve() {
        let result = Cli::try_parse_from(["oxsan", "check", "v", "--dry-run"]);
        assert!(result.is_err());
    }
}

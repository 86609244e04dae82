use std::io::{self, IsTerminal, Write};

use anyhow::{Result, bail};
use rpassword::read_password;

/// Where the passphrase comes from, as given on the command line.
#[derive(Clone, Default)]
pub struct PasswordOptions {
    /// From `OXSAN_PASSWORD` or `--password`.
    pub password: Option<String>,
    pub password_stdin: bool,
}

/// Get the passphrase using the priority chain:
/// 1. `OXSAN_PASSWORD` / `--password`
/// 2. `--password-stdin`
/// 3. Interactive prompt
pub fn get_passphrase(opts: &PasswordOptions) -> Result<String> {
    if let Some(password) = &opts.password {
        Ok(password.clone())
    } else if opts.password_stdin {
        read_password_from_stdin()
    } else {
        prompt_passphrase()
    }
}

/// Prompt the user for the vault passphrase securely.
/// Input is hidden and not echoed to the terminal.
pub fn prompt_passphrase() -> Result<String> {
    if !io::stdin().is_terminal() {
        bail!("No terminal to prompt for the passphrase; set OXSAN_PASSWORD or use --password-stdin");
    }
    eprint!("Vault passphrase: ");
    io::stderr().flush()?;

    let passphrase = read_password()?;

    if passphrase.is_empty() {
        bail!("Passphrase cannot be empty");
    }

    Ok(passphrase)
}

/// Read the passphrase from the first line of stdin.
fn read_password_from_stdin() -> Result<String> {
    if io::stdin().is_terminal() {
        bail!(
            "--password-stdin requires the passphrase to be piped in.\n\
             Example: echo \"$SECRET\" | oxsan --password-stdin check ~/vault"
        );
    }

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    let password = password.trim_end_matches('\n').trim_end_matches('\r');

    if password.is_empty() {
        bail!("Passphrase from stdin is empty");
    }

    Ok(password.to_string())
}

/// Ask for the id of a directory whose directory-id file is gone. Returns
/// `None` when nobody can answer or the answer is empty.
pub fn prompt_directory_id(directory_file: &std::path::Path) -> Option<String> {
    if !io::stdin().is_terminal() {
        return None;
    }
    eprintln!("Directory-id file {} is missing.", directory_file.display());
    eprint!("Enter the directory id (empty to give up): ");
    io::stderr().flush().ok()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer).ok()?;
    let answer = answer.trim();
    (!answer.is_empty()).then(|| answer.to_string())
}

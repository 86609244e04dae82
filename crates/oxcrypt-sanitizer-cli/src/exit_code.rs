//! Exit codes for the CLI.
//!
//! Scripts can tell a bad passphrase from a missing vault or a vault the
//! checker refused to work on.

/// Successful execution, whether or not problems were found
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Authentication failed (wrong passphrase)
pub const AUTH_FAILED: u8 = 2;

/// Vault, masterkey or file not found
pub const NOT_FOUND: u8 = 3;

/// Vault invalid, of an unsupported version, or the run was aborted
pub const VAULT_INVALID: u8 = 4;

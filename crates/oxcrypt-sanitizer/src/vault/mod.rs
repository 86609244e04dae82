//! Vault layout, key loading and the conforming writer

pub mod master_key;
pub mod path;
pub mod resolve;
pub mod structure;
pub mod unlock;
pub mod writer;

use std::path::{Path, PathBuf};

/// Name of the masterkey file in the vault root.
pub const MASTERKEY_FILE: &str = "masterkey.cryptomator";

/// Name of the masterkey backup written next to [`MASTERKEY_FILE`].
pub const MASTERKEY_BACKUP_FILE: &str = "masterkey.cryptomator.bkup";

/// Ciphertext data directory.
pub const DATA_DIR: &str = "d";

/// Long-name metadata directory.
pub const METADATA_DIR: &str = "m";

/// Location of the m-file named `file_name`: `m/<name[0..2]>/<name[2..4]>/<name>`.
///
/// Names shorter than four characters land in shorter shard directories.
pub fn m_file_path(vault_root: &Path, file_name: &str) -> PathBuf {
    let first = file_name.get(..2).unwrap_or_default();
    let second = file_name.get(2..4).unwrap_or_default();
    vault_root
        .join(METADATA_DIR)
        .join(first)
        .join(second)
        .join(file_name)
}

// Re-export commonly used types
pub use master_key::{
    MasterKeyCreationError, MasterKeyFile, MasterKeyFileError, VAULT_VERSION,
    create_masterkey_file, create_masterkey_file_with_cost,
};
pub use path::{DirId, VaultPath};
pub use resolve::{CiphertextPathResolver, ResolveError};
pub use structure::write_structure;
pub use unlock::{AbortError, load_cryptor};
pub use writer::{VaultWriteError, VaultWriter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m_file_path_layout() {
        let path = m_file_path(Path::new("/vault"), "ABCDEFGH.lng");
        assert_eq!(path, Path::new("/vault/m/AB/CD/ABCDEFGH.lng"));
    }

    #[test]
    fn test_m_file_path_short_name() {
        let path = m_file_path(Path::new("/vault"), "A");
        assert_eq!(path, Path::new("/vault/m/A"));
    }
}

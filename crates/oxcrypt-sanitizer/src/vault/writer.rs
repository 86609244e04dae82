//! Creation of well-formed format 6 vaults.
//!
//! The writer produces exactly the layout the integrity check accepts, so a
//! vault written here checks clean.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::crypto::{Cryptor, CryptorError, CtrMacCryptor, MasterKey};
use crate::fs::name::{DIR_PREFIX, long_name_stub, needs_shortening};

use super::master_key::{
    DEFAULT_SCRYPT_COST_PARAM_LOG2, MasterKeyCreationError, create_masterkey_file_with_cost,
};
use super::path::DirId;
use super::{DATA_DIR, MASTERKEY_FILE, m_file_path};

#[derive(Error, Debug)]
pub enum VaultWriteError {
    #[error("Vault already exists at path: {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("{0} already exists in the vault")]
    NodeExists(PathBuf),

    #[error("Failed to create masterkey file: {0}")]
    MasterKey(#[from] MasterKeyCreationError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Cryptor(#[from] CryptorError),
}

impl VaultWriteError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> VaultWriteError + '_ {
        move |source| VaultWriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Writes directories and files into a format 6 vault.
///
/// # Example
///
/// ```no_run
/// use oxcrypt_sanitizer::vault::{DirId, VaultWriter};
/// use std::path::Path;
///
/// let writer = VaultWriter::create(Path::new("/tmp/vault"), "passphrase").unwrap();
/// let docs = writer.create_directory(&DirId::root(), "docs").unwrap();
/// writer.write_file(&docs, "hello.txt", b"Hello, World!").unwrap();
/// ```
pub struct VaultWriter {
    root: PathBuf,
    cryptor: CtrMacCryptor,
}

impl VaultWriter {
    /// Create a new vault at `root` with the default scrypt cost.
    pub fn create(root: &Path, passphrase: &str) -> Result<Self, VaultWriteError> {
        Self::create_with_cost(root, passphrase, DEFAULT_SCRYPT_COST_PARAM_LOG2)
    }

    /// Create a new vault at `root`, deriving the key encryption key with
    /// scrypt cost `N = 2^log2_n`.
    #[instrument(level = "info", skip(passphrase), fields(root = %root.display()))]
    pub fn create_with_cost(
        root: &Path,
        passphrase: &str,
        log2_n: u8,
    ) -> Result<Self, VaultWriteError> {
        let masterkey_path = root.join(MASTERKEY_FILE);
        if masterkey_path.exists() {
            return Err(VaultWriteError::VaultAlreadyExists(root.to_path_buf()));
        }
        fs::create_dir_all(root).map_err(VaultWriteError::io(root))?;

        let master_key = MasterKey::random();
        let content = create_masterkey_file_with_cost(&master_key, passphrase, log2_n)?;
        fs::write(&masterkey_path, content).map_err(VaultWriteError::io(&masterkey_path))?;

        let writer = Self::open(root, CtrMacCryptor::new(master_key));
        let container = DirId::root().container_path(&writer.cryptor, root)?;
        fs::create_dir_all(&container).map_err(VaultWriteError::io(&container))?;
        info!("Vault created");
        Ok(writer)
    }

    /// Write into an existing vault with an already unlocked cryptor.
    pub fn open(root: &Path, cryptor: CtrMacCryptor) -> Self {
        Self {
            root: root.to_path_buf(),
            cryptor,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cryptor(&self) -> &CtrMacCryptor {
        &self.cryptor
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Container directory of `directory`.
    pub fn container(&self, directory: &DirId) -> Result<PathBuf, VaultWriteError> {
        Ok(directory.container_path(&self.cryptor, &self.root)?)
    }

    /// Ciphertext node for `full_name` in `parent`, writing the m-file when
    /// the name has to be shortened.
    fn place_node(&self, parent: &DirId, full_name: &str) -> Result<PathBuf, VaultWriteError> {
        let container = self.container(parent)?;
        if !needs_shortening(full_name) {
            return Ok(container.join(full_name));
        }
        let stub = long_name_stub(full_name);
        let m_file = m_file_path(&self.root, &stub);
        if let Some(dir) = m_file.parent() {
            fs::create_dir_all(dir).map_err(VaultWriteError::io(dir))?;
        }
        fs::write(&m_file, full_name).map_err(VaultWriteError::io(&m_file))?;
        debug!(stub = %stub, "Name shortened");
        Ok(container.join(stub))
    }

    /// Create `name` in `parent`: a directory-id file pointing at a new,
    /// empty container.
    pub fn create_directory(&self, parent: &DirId, name: &str) -> Result<DirId, VaultWriteError> {
        let encrypted = self.cryptor.encrypt_filename(name, parent.as_str())?;
        let node = self.place_node(parent, &format!("{DIR_PREFIX}{encrypted}"))?;
        if node.exists() {
            return Err(VaultWriteError::NodeExists(node));
        }

        let id = DirId::random();
        let container = self.container(&id)?;
        fs::create_dir_all(&container).map_err(VaultWriteError::io(&container))?;
        fs::write(&node, id.as_str()).map_err(VaultWriteError::io(&node))?;
        debug!(name, id = %id, "Directory created");
        Ok(id)
    }

    /// Encrypt `content` into a new file `name` in `parent`. Returns the
    /// ciphertext path.
    pub fn write_file(
        &self,
        parent: &DirId,
        name: &str,
        content: &[u8],
    ) -> Result<PathBuf, VaultWriteError> {
        let encrypted = self.cryptor.encrypt_filename(name, parent.as_str())?;
        let node = self.place_node(parent, &encrypted)?;
        if node.exists() {
            return Err(VaultWriteError::NodeExists(node));
        }
        fs::write(&node, self.encrypt_content(content)).map_err(VaultWriteError::io(&node))?;
        debug!(name, size = content.len(), "File written");
        Ok(node)
    }

    /// Header followed by the encrypted chunks of `content`.
    pub fn encrypt_content(&self, content: &[u8]) -> Vec<u8> {
        let header = self.cryptor.create_header();
        let mut ciphertext = self.cryptor.encrypt_header(&header);
        for (chunk_number, chunk) in content.chunks(self.cryptor.cleartext_chunk_size()).enumerate() {
            ciphertext.extend(self.cryptor.encrypt_chunk(chunk, chunk_number as u64, &header));
        }
        ciphertext
    }
}

//! Mapping cleartext vault paths to ciphertext nodes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::{Cryptor, CryptorError};
use crate::fs::name::{DIR_PREFIX, long_name_stub, needs_shortening};

use super::path::{DirId, VaultPath};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Cannot resolve the vault root")]
    EmptyPath,

    #[error("No directory id for {0}")]
    MissingDirectoryId(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Cryptor(#[from] CryptorError),
}

/// Resolves cleartext paths by reading directory-id files along the way.
///
/// When a directory-id file is missing, `ask` is called with its path and
/// may supply the id from elsewhere, e.g. a backup or the user.
pub struct CiphertextPathResolver<'a, F>
where
    F: FnMut(&Path) -> Option<String>,
{
    cryptor: &'a dyn Cryptor,
    vault_root: PathBuf,
    ask: F,
}

impl<'a, F> CiphertextPathResolver<'a, F>
where
    F: FnMut(&Path) -> Option<String>,
{
    pub fn new(cryptor: &'a dyn Cryptor, vault_root: &Path, ask: F) -> Self {
        Self {
            cryptor,
            vault_root: vault_root.to_path_buf(),
            ask,
        }
    }

    /// Ciphertext node of `cleartext`, a `/`-separated path inside the
    /// vault. The node itself need not exist.
    pub fn resolve(&mut self, cleartext: &str) -> Result<PathBuf, ResolveError> {
        let path = VaultPath::new(cleartext);
        let components: Vec<&str> = path.components().collect();
        let Some((file, directories)) = components.split_last() else {
            return Err(ResolveError::EmptyPath);
        };

        let mut directory = DirId::root();
        for name in directories {
            let directory_file = self.node(&directory, name, true)?;
            directory = self.directory_id(&directory_file)?;
        }
        self.node(&directory, file, false)
    }

    fn node(&self, parent: &DirId, name: &str, is_directory: bool) -> Result<PathBuf, ResolveError> {
        let encrypted = self.cryptor.encrypt_filename(name, parent.as_str())?;
        let full_name = if is_directory {
            format!("{DIR_PREFIX}{encrypted}")
        } else {
            encrypted
        };
        let node_name = if needs_shortening(&full_name) {
            long_name_stub(&full_name)
        } else {
            full_name
        };
        Ok(parent
            .container_path(self.cryptor, &self.vault_root)?
            .join(node_name))
    }

    fn directory_id(&mut self, directory_file: &Path) -> Result<DirId, ResolveError> {
        match fs::read(directory_file) {
            Ok(bytes) => {
                debug!(file = %directory_file.display(), "Directory id read");
                Ok(DirId::from_raw(String::from_utf8_lossy(&bytes)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(file = %directory_file.display(), "Directory-id file missing");
                (self.ask)(directory_file)
                    .map(DirId::from_raw)
                    .ok_or_else(|| ResolveError::MissingDirectoryId(directory_file.to_path_buf()))
            }
            Err(source) => Err(ResolveError::Io {
                path: directory_file.to_path_buf(),
                source,
            }),
        }
    }
}

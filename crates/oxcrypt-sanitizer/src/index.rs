//! Cross-reference indexes over the `d/` tree.
//!
//! Both indexes are built by one walk of the two shard levels below `d/` the
//! first time they are asked for, and are only read afterwards.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, trace};
use walkdir::WalkDir;

use crate::crypto::{Cryptor, CryptorError};
use crate::grammar;
use crate::fs::name::LONG_NAME_SUFFIX;
use crate::vault::DATA_DIR;

/// Depth of entry nodes below `d/`: shard, container, node.
const NODE_DEPTH: usize = 3;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to hash a directory id: {0}")]
    Cryptor(#[from] CryptorError),
}

/// Hashed directory id → cleartext directory id.
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    cleartext_ids: HashMap<String, String>,
}

impl DirectoryIndex {
    pub fn cleartext_id(&self, hashed_id: &str) -> Option<&str> {
        self.cleartext_ids.get(hashed_id).map(String::as_str)
    }

    pub fn contains(&self, hashed_id: &str) -> bool {
        self.cleartext_ids.contains_key(hashed_id)
    }

    pub fn len(&self) -> usize {
        self.cleartext_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cleartext_ids.is_empty()
    }

    fn build(vault_root: &Path, cryptor: &dyn Cryptor) -> Result<Self, IndexError> {
        let mut cleartext_ids = HashMap::new();
        cleartext_ids.insert(cryptor.hash_directory_id("")?, String::new());

        for file in node_files(&vault_root.join(DATA_DIR))? {
            let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if !grammar::may_reference_directory(&name) {
                continue;
            }
            let size = fs::metadata(&file).map_err(|source| io_error(&file, source))?.len();
            if size != grammar::DIRECTORY_ID_FILE_SIZE {
                trace!(file = %file.display(), size, "Skipping directory reference of unexpected size");
                continue;
            }
            let bytes = fs::read(&file).map_err(|source| io_error(&file, source))?;
            let dir_id = String::from_utf8_lossy(&bytes).into_owned();
            cleartext_ids.insert(cryptor.hash_directory_id(&dir_id)?, dir_id);
        }

        Ok(Self { cleartext_ids })
    }
}

/// Exactly cased `.lng` stub name → its path under `d/`.
#[derive(Debug, Default)]
pub struct LongNameIndex {
    stubs: HashMap<String, PathBuf>,
}

impl LongNameIndex {
    pub fn contains(&self, stub_name: &str) -> bool {
        self.stubs.contains_key(stub_name)
    }

    /// Stub in `d/` an m-file belongs to, looked up by the m-file's name.
    pub fn stub_for_m_file(&self, m_file_name: &str) -> Option<&Path> {
        let mut key = grammar::decryptable_part(m_file_name).unwrap_or_default();
        key.push_str(LONG_NAME_SUFFIX);
        self.stubs.get(&key).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    fn build(vault_root: &Path) -> Result<Self, IndexError> {
        let stubs = node_files(&vault_root.join(DATA_DIR))?
            .into_iter()
            .filter_map(|file| {
                let name = file.file_name()?.to_str()?.to_string();
                grammar::is_exact_long_name_stub(&name).then_some((name, file))
            })
            .collect();
        Ok(Self { stubs })
    }
}

/// The value in `slot`, built on first request and reused afterwards.
fn get_or_build<T>(
    slot: &mut Option<T>,
    build: impl FnOnce() -> Result<T, IndexError>,
) -> Result<&T, IndexError> {
    let value = match slot.take() {
        Some(value) => value,
        None => build()?,
    };
    Ok(slot.insert(value))
}

/// Lazily built directory and long-name indexes of one check run.
#[derive(Debug)]
pub struct CrossReferenceIndexes {
    vault_root: PathBuf,
    directories: Option<DirectoryIndex>,
    long_names: Option<LongNameIndex>,
}

impl CrossReferenceIndexes {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: vault_root.into(),
            directories: None,
            long_names: None,
        }
    }

    /// The directory index, built on first call.
    #[instrument(level = "debug", skip_all)]
    pub fn directories(&mut self, cryptor: &dyn Cryptor) -> Result<&DirectoryIndex, IndexError> {
        let vault_root = &self.vault_root;
        let index = get_or_build(&mut self.directories, || {
            let index = DirectoryIndex::build(vault_root, cryptor)?;
            debug!(directories = index.len(), "Directory index built");
            Ok(index)
        })?;
        Ok(index)
    }

    /// The long-name index, built on first call.
    #[instrument(level = "debug", skip_all)]
    pub fn long_names(&mut self) -> Result<&LongNameIndex, IndexError> {
        let vault_root = &self.vault_root;
        let index = get_or_build(&mut self.long_names, || {
            let index = LongNameIndex::build(vault_root)?;
            debug!(stubs = index.len(), "Long name index built");
            Ok(index)
        })?;
        Ok(index)
    }
}

/// Regular files exactly [`NODE_DEPTH`] levels below `data_dir`.
fn node_files(data_dir: &Path) -> Result<Vec<PathBuf>, IndexError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(NODE_DEPTH).max_depth(NODE_DEPTH) {
        let entry = entry.map_err(|source| IndexError::Walk {
            root: data_dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn io_error(path: &Path, source: io::Error) -> IndexError {
    IndexError::Io {
        path: path.to_path_buf(),
        source,
    }
}

//! Best-effort decryption of a whole vault into a cleartext tree.
//!
//! The scan classifies every path below `d/` on its own, so a vault with
//! missing directory-id files, m-files or containers still yields all the
//! content that can be decrypted. Containers nothing references end up
//! under `lost+found/root-N` in the target.

pub mod entry;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, info, instrument, trace, warn};
use walkdir::WalkDir;

use crate::crypto::{Cryptor, CryptorError};
use crate::fs::file::decrypt_file;
use crate::fs::name::{DIR_PREFIX, LONG_NAME_SUFFIX};
use crate::grammar::{self, DataName};
use crate::vault::path::container_path_for_hash;
use crate::vault::{DATA_DIR, m_file_path};

pub use entry::{DirectoryNode, Entry, FileNode, UNKNOWN_FILE, UNKNOWN_FOLDER};

/// Directory in the target holding trees without a known parent.
pub const LOST_AND_FOUND: &str = "lost+found";

/// Target name of the vault root.
pub const ROOT: &str = "root";

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Cryptor(#[from] CryptorError),
}

impl ReconstructError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> ReconstructError + '_ {
        move |source| ReconstructError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A file that could not be decrypted during export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub source: PathBuf,
    pub reason: String,
}

/// What an export wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub directories: usize,
    pub files: usize,
    /// Trees exported under `lost+found`.
    pub lost_and_found: usize,
    pub failed_files: Vec<FailedFile>,
}

/// A container as collected during the scan.
#[derive(Debug, Default)]
struct DirectoryBuilder {
    path: PathBuf,
    directory_id: Option<String>,
    encrypted_name: Option<String>,
    suffix: String,
    files: Vec<PendingFile>,
    children: Vec<usize>,
    attached: bool,
}

#[derive(Debug)]
struct PendingFile {
    path: PathBuf,
    encrypted_name: String,
    suffix: String,
}

/// Everything learned about a vault's `d/` tree, before it is linked.
pub struct ScannedVault<'a> {
    cryptor: &'a dyn Cryptor,
    vault_root: PathBuf,
    data_dir: PathBuf,
    root_hash: String,
    builders: Vec<DirectoryBuilder>,
    by_path: HashMap<PathBuf, usize>,
    /// Containers no directory-id file has claimed yet, keyed by hash.
    potential_roots: BTreeMap<String, usize>,
}

impl<'a> ScannedVault<'a> {
    pub fn new(cryptor: &'a dyn Cryptor, vault_root: &Path) -> Result<Self, ReconstructError> {
        Ok(Self {
            cryptor,
            vault_root: vault_root.to_path_buf(),
            data_dir: vault_root.join(DATA_DIR),
            root_hash: cryptor.hash_directory_id("")?,
            builders: Vec::new(),
            by_path: HashMap::new(),
            potential_roots: BTreeMap::new(),
        })
    }

    /// Walk `d/` and [`add`](Self::add) every path, parents first.
    #[instrument(level = "info", skip(cryptor), fields(vault = %vault_root.display()))]
    pub fn scan(cryptor: &'a dyn Cryptor, vault_root: &Path) -> Result<Self, ReconstructError> {
        let mut vault = Self::new(cryptor, vault_root)?;
        let data_dir = vault.data_dir.clone();
        for entry in WalkDir::new(&data_dir).sort_by_file_name() {
            let entry = entry.map_err(|source| ReconstructError::Walk {
                root: data_dir.clone(),
                source,
            })?;
            vault.add(entry.path())?;
        }
        info!(
            containers = vault.builders.len(),
            unclaimed = vault.potential_roots.len(),
            "Vault scanned"
        );
        Ok(vault)
    }

    /// `path` below `d/` with `/` separators.
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.data_dir).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(parts.join("/"))
    }

    /// Classify one path below `d/`. Containers must be added before the
    /// files in them.
    pub fn add(&mut self, path: &Path) -> Result<(), ReconstructError> {
        let Some(relative) = self.relative(path) else {
            warn!(path = %path.display(), "Ignoring path outside the data directory");
            return Ok(());
        };
        let handled = self.add_as_container(path, &relative)
            || self.add_as_long_name(path, &relative)?
            || self.add_as_regular_file(path, &relative)
            || self.add_as_directory_file(path, &relative)?;
        if !handled && !self.by_path.contains_key(path) {
            if relative.matches('/').count() < 2 {
                trace!(path = %relative, "Skipping");
            } else {
                warn!(path = %relative, "Ignoring");
            }
        }
        Ok(())
    }

    fn add_as_container(&mut self, path: &Path, relative: &str) -> bool {
        let Some(hash) = grammar::match_container(relative) else {
            return false;
        };
        if !path.is_dir() {
            return false;
        }
        if self.by_path.contains_key(path) {
            return true;
        }
        let directory_id = (hash == self.root_hash).then(String::new);
        let index = self.new_builder(path.to_path_buf());
        self.builders[index].directory_id = directory_id;
        self.potential_roots.insert(hash, index);
        true
    }

    /// A shortened name: the m-file decides whether it is a file or a
    /// directory-id file. Without an m-file the stub is left to the
    /// regular-file pattern and keeps `.lng` as its suffix.
    fn add_as_long_name(&mut self, path: &Path, relative: &str) -> Result<bool, ReconstructError> {
        let Some(DataName { name, suffix }) = grammar::match_long_name(relative) else {
            return Ok(false);
        };
        if !path.is_file() {
            return Ok(false);
        }
        let m_file = m_file_path(&self.vault_root, &format!("{name}{LONG_NAME_SUFFIX}"));
        if !m_file.is_file() {
            return Ok(false);
        }
        let full_name = read_lossy(&m_file)?;
        match full_name.strip_prefix(DIR_PREFIX) {
            None => {
                self.add_file(path, full_name, suffix);
                Ok(true)
            }
            Some(encrypted_name) => {
                let directory_id = read_lossy(path)?;
                if directory_id.is_empty() {
                    return Ok(false);
                }
                self.add_directory_file(path, encrypted_name.to_string(), &directory_id, suffix)?;
                Ok(true)
            }
        }
    }

    fn add_as_regular_file(&mut self, path: &Path, relative: &str) -> bool {
        let Some(DataName { name, suffix }) = grammar::match_regular_file(relative) else {
            return false;
        };
        if !path.is_file() {
            return false;
        }
        self.add_file(path, name, suffix);
        true
    }

    fn add_as_directory_file(&mut self, path: &Path, relative: &str) -> Result<bool, ReconstructError> {
        let Some(DataName { name, suffix }) = grammar::match_directory_file(relative) else {
            return Ok(false);
        };
        if !path.is_file() {
            return Ok(false);
        }
        let directory_id = read_lossy(path)?;
        if directory_id.is_empty() {
            return Ok(false);
        }
        self.add_directory_file(path, name, &directory_id, suffix)?;
        Ok(true)
    }

    fn new_builder(&mut self, path: PathBuf) -> usize {
        let index = self.builders.len();
        self.by_path.insert(path.clone(), index);
        self.builders.push(DirectoryBuilder {
            path,
            ..DirectoryBuilder::default()
        });
        index
    }

    fn parent_builder(&self, path: &Path) -> Option<usize> {
        let index = path.parent().and_then(|p| self.by_path.get(p).copied());
        if index.is_none() {
            warn!(path = %path.display(), "No container collected for parent, ignoring");
        }
        index
    }

    fn add_file(&mut self, path: &Path, encrypted_name: String, suffix: &str) {
        let Some(parent) = self.parent_builder(path) else {
            return;
        };
        self.builders[parent].files.push(PendingFile {
            path: path.to_path_buf(),
            encrypted_name,
            suffix: suffix.to_string(),
        });
    }

    /// Link the container of `directory_id` below the container holding
    /// `path`, creating it if the scan has not seen it.
    fn add_directory_file(
        &mut self,
        path: &Path,
        encrypted_name: String,
        directory_id: &str,
        suffix: &str,
    ) -> Result<(), ReconstructError> {
        let hash = self.cryptor.hash_directory_id(directory_id)?;
        let container = container_path_for_hash(&self.vault_root, &hash);
        let index = match self.potential_roots.remove(&hash) {
            Some(index) => index,
            None if self.by_path.contains_key(&container) => {
                warn!(path = %path.display(), "Directory already referenced elsewhere, ignoring");
                return Ok(());
            }
            None => self.new_builder(container),
        };

        let builder = &mut self.builders[index];
        builder.directory_id = Some(directory_id.to_string());
        builder.encrypted_name = Some(encrypted_name);
        if !suffix.is_empty() {
            builder.suffix = suffix.to_string();
        }
        builder.attached = true;

        if let Some(parent) = self.parent_builder(path) {
            self.builders[parent].children.push(index);
        }
        Ok(())
    }

    /// Link the collected containers into trees: one per unclaimed
    /// container, then one per container no tree reached.
    fn into_trees(self) -> Vec<Rc<DirectoryNode>> {
        let mut visited = vec![false; self.builders.len()];
        let mut trees: Vec<_> = self
            .potential_roots
            .values()
            .map(|&index| link(&self.builders, index, Weak::new(), &mut visited))
            .collect();
        for index in 0..self.builders.len() {
            if !visited[index] {
                debug!(path = %self.builders[index].path.display(), "Container unreachable from any root");
                trees.push(link(&self.builders, index, Weak::new(), &mut visited));
            }
        }
        trees
    }

    /// Decrypt everything into `target`.
    #[instrument(level = "info", skip(self), fields(target = %target.display()))]
    pub fn export(self, target: &Path) -> Result<ExportSummary, ReconstructError> {
        let cryptor = self.cryptor;
        let vault_root = self.vault_root.clone();
        let mut exporter = Exporter {
            cryptor,
            vault_root: &vault_root,
            summary: ExportSummary::default(),
        };
        for tree in self.into_trees() {
            exporter.export_directory(&tree, target)?;
        }
        let summary = exporter.summary;
        info!(
            directories = summary.directories,
            files = summary.files,
            lost_and_found = summary.lost_and_found,
            failed = summary.failed_files.len(),
            "Vault exported"
        );
        Ok(summary)
    }
}

fn link(
    builders: &[DirectoryBuilder],
    index: usize,
    parent: Weak<DirectoryNode>,
    visited: &mut [bool],
) -> Rc<DirectoryNode> {
    visited[index] = true;
    let builder = &builders[index];
    Rc::new_cyclic(|me| {
        let mut entries = Vec::with_capacity(builder.children.len() + builder.files.len());
        for &child in &builder.children {
            if visited[child] {
                warn!(path = %builders[child].path.display(), "Directory cycle, skipping");
                continue;
            }
            entries.push(Entry::Directory(link(builders, child, me.clone(), visited)));
        }
        entries.extend(builder.files.iter().map(|file| {
            Entry::File(FileNode {
                path: file.path.clone(),
                encrypted_name: file.encrypted_name.clone(),
                suffix: file.suffix.clone(),
                parent: me.clone(),
            })
        }));
        DirectoryNode {
            path: builder.path.clone(),
            directory_id: builder.directory_id.clone(),
            encrypted_name: builder.encrypted_name.clone(),
            suffix: builder.suffix.clone(),
            parent,
            entries,
        }
    })
}

struct Exporter<'a> {
    cryptor: &'a dyn Cryptor,
    vault_root: &'a Path,
    summary: ExportSummary,
}

impl Exporter<'_> {
    fn export_directory(&mut self, directory: &DirectoryNode, target: &Path) -> Result<(), ReconstructError> {
        let destination = if directory.is_real_root() {
            target.join(ROOT)
        } else if !directory.has_parent() {
            self.summary.lost_and_found += 1;
            next_free_name(&target.join(LOST_AND_FOUND), ROOT, "")
        } else {
            let name = directory
                .decrypted_name(self.cryptor)
                .unwrap_or_else(|| UNKNOWN_FOLDER.to_string());
            first_free_name(target, &name, &directory.suffix)
        };
        debug!(from = %directory.path.display(), to = %destination.display(), "Exporting directory");
        fs::create_dir_all(&destination).map_err(ReconstructError::io(&destination))?;
        self.summary.directories += 1;

        for entry in &directory.entries {
            match entry {
                Entry::Directory(child) => self.export_directory(child, &destination)?,
                Entry::File(file) => self.export_file(file, &destination),
            }
        }
        Ok(())
    }

    fn export_file(&mut self, file: &FileNode, target: &Path) {
        let name = file
            .decrypted_name(self.cryptor)
            .unwrap_or_else(|| UNKNOWN_FILE.to_string());
        let destination = first_free_name(target, &name, &file.suffix);
        match decrypt_file(self.cryptor, &file.path, &destination) {
            Ok(_) => self.summary.files += 1,
            Err(e) => {
                warn!(file = %file.path.display(), error = %e, "Failed to decrypt file");
                let source = file
                    .path
                    .strip_prefix(self.vault_root)
                    .unwrap_or(&file.path)
                    .to_path_buf();
                self.summary.failed_files.push(FailedFile {
                    source,
                    reason: e.to_string(),
                });
            }
        }
    }
}

fn read_lossy(path: &Path) -> Result<String, ReconstructError> {
    let bytes = fs::read(path).map_err(ReconstructError::io(path))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// `prefix + suffix` in `dir` if nothing is there, else [`next_free_name`].
pub fn first_free_name(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let candidate = dir.join(format!("{prefix}{suffix}"));
    if candidate.symlink_metadata().is_err() {
        candidate
    } else {
        next_free_name(dir, prefix, suffix)
    }
}

/// The first free `prefix-N + suffix` in `dir`, counting from 1.
pub fn next_free_name(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let mut counter = 1u64;
    loop {
        let candidate = dir.join(format!("{prefix}-{counter}{suffix}"));
        if candidate.symlink_metadata().is_err() {
            return candidate;
        }
        counter += 1;
    }
}

/// Scan the vault at `vault_root` and decrypt it into `target`.
pub fn reconstruct(
    cryptor: &dyn Cryptor,
    vault_root: &Path,
    target: &Path,
) -> Result<ExportSummary, ReconstructError> {
    ScannedVault::scan(cryptor, vault_root)?.export(target)
}

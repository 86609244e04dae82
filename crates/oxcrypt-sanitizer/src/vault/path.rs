//! Directory identifiers and cleartext vault paths.
//!
//! `DirId` is the opaque id stored in directory-id files; `VaultPath` is a
//! cleartext path inside the vault such as `docs/report.txt`.

use relative_path::{RelativePath, RelativePathBuf};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::crypto::{Cryptor, CryptorError};

use super::DATA_DIR;

/// Opaque directory identifier.
///
/// The root directory has the empty id; every other directory gets a random
/// UUID string when created.
///
/// # Examples
///
/// ```
/// use oxcrypt_sanitizer::vault::path::DirId;
///
/// assert!(DirId::root().is_root());
/// let id = DirId::random();
/// assert_eq!(id.as_str().len(), 36);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirId(String);

impl DirId {
    #[inline]
    pub fn root() -> Self {
        DirId(String::new())
    }

    /// A fresh hyphenated UUID v4.
    pub fn random() -> Self {
        DirId(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an id read from a directory-id file.
    #[inline]
    pub fn from_raw(id: impl Into<String>) -> Self {
        DirId(id.into())
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Container directory of this id: `d/<hash[..2]>/<hash[2..]>`.
    pub fn container_path(
        &self,
        cryptor: &dyn Cryptor,
        vault_root: &Path,
    ) -> Result<PathBuf, CryptorError> {
        let hash = cryptor.hash_directory_id(&self.0)?;
        Ok(container_path_for_hash(vault_root, &hash))
    }
}

/// Container directory for an already hashed directory id.
pub fn container_path_for_hash(vault_root: &Path, hash: &str) -> PathBuf {
    let split = hash.len().min(2);
    vault_root
        .join(DATA_DIR)
        .join(&hash[..split])
        .join(&hash[split..])
}

impl AsRef<str> for DirId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Cleartext path within a vault, `/`-separated on every platform.
///
/// # Examples
///
/// ```
/// use oxcrypt_sanitizer::vault::path::VaultPath;
///
/// let path = VaultPath::new("/docs/report.txt");
/// assert_eq!(path.file_name(), Some("report.txt"));
/// assert_eq!(path, VaultPath::new("docs/report.txt"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VaultPath(RelativePathBuf);

impl VaultPath {
    #[inline]
    pub fn root() -> Self {
        VaultPath(RelativePathBuf::new())
    }

    /// Leading slashes are stripped and `.`/`..` are resolved lexically.
    pub fn new(path: impl AsRef<str>) -> Self {
        let s = path.as_ref().trim_start_matches('/');
        VaultPath(RelativePath::new(s).normalize())
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.as_str().is_empty()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn join(&self, component: impl AsRef<str>) -> Self {
        VaultPath(self.0.join(component.as_ref()))
    }

    pub fn parent(&self) -> Option<VaultPath> {
        if self.is_root() {
            return None;
        }
        self.0.parent().map(|p| VaultPath(p.to_relative_path_buf()))
    }

    pub fn file_name(&self) -> Option<&str> {
        self.0.file_name()
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.components().map(|c| c.as_str())
    }
}

impl fmt::Display for VaultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<&str> for VaultPath {
    fn from(s: &str) -> Self {
        VaultPath::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CtrMacCryptor, MasterKey};

    #[test]
    fn test_dir_id_root() {
        let root = DirId::root();
        assert!(root.is_root());
        assert_eq!(root.as_str(), "");
        assert_eq!(root.to_string(), "<root>");
    }

    #[test]
    fn test_random_dir_ids_are_uuids() {
        let a = DirId::random();
        let b = DirId::random();
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn test_container_path_layout() {
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let root = Path::new("/vault");
        let path = DirId::root().container_path(&cryptor, root).unwrap();

        let hash = cryptor.hash_directory_id("").unwrap();
        assert_eq!(path, root.join("d").join(&hash[..2]).join(&hash[2..]));
    }

    #[test]
    fn test_vault_path_normalization() {
        assert_eq!(VaultPath::new("/a/b.txt"), VaultPath::new("a/b.txt"));
        assert_eq!(VaultPath::new("a/./c/../b.txt").as_str(), "a/b.txt");
        assert!(VaultPath::new("/").is_root());
    }

    #[test]
    fn test_vault_path_parent_and_components() {
        let path = VaultPath::new("docs/photos/cat.jpg");
        assert_eq!(path.parent().unwrap().as_str(), "docs/photos");
        assert_eq!(path.components().collect::<Vec<_>>(), ["docs", "photos", "cat.jpg"]);
        assert!(VaultPath::root().parent().is_none());
    }

    #[test]
    fn test_vault_path_display() {
        assert_eq!(VaultPath::root().to_string(), "/");
        assert_eq!(VaultPath::new("docs/file.txt").to_string(), "/docs/file.txt");
    }
}

//! The linked tree a scanned vault is exported from.
//!
//! Directories own their entries; every entry points back to its parent
//! through a [`Weak`] so names can be decrypted with the parent's id.

use std::path::PathBuf;
use std::rc::{Rc, Weak};

use tracing::warn;

use crate::crypto::Cryptor;

/// Fallback name for a directory whose name cannot be decrypted.
pub const UNKNOWN_FOLDER: &str = "unknown-folder";

/// Fallback name for a file whose name cannot be decrypted.
pub const UNKNOWN_FILE: &str = "unknown-file";

/// An encrypted file found in a container.
#[derive(Debug)]
pub struct FileNode {
    pub path: PathBuf,
    pub encrypted_name: String,
    pub suffix: String,
    pub parent: Weak<DirectoryNode>,
}

/// A container directory, with whatever the scan learned about it.
#[derive(Debug)]
pub struct DirectoryNode {
    pub path: PathBuf,
    /// Cleartext id; `Some("")` for the vault root.
    pub directory_id: Option<String>,
    pub encrypted_name: Option<String>,
    pub suffix: String,
    pub parent: Weak<DirectoryNode>,
    pub entries: Vec<Entry>,
}

#[derive(Debug)]
pub enum Entry {
    Directory(Rc<DirectoryNode>),
    File(FileNode),
}

impl DirectoryNode {
    pub fn is_real_root(&self) -> bool {
        self.directory_id.as_deref() == Some("")
    }

    pub fn has_parent(&self) -> bool {
        self.parent.upgrade().is_some()
    }

    pub fn decrypted_name(&self, cryptor: &dyn Cryptor) -> Option<String> {
        decrypt_under_parent(cryptor, &self.parent, self.encrypted_name.as_deref()?)
    }
}

impl FileNode {
    pub fn decrypted_name(&self, cryptor: &dyn Cryptor) -> Option<String> {
        decrypt_under_parent(cryptor, &self.parent, &self.encrypted_name)
    }
}

/// Decrypt `encrypted_name` under the id of `parent`. Requires a parent
/// with a known id and a result usable as a single path component.
fn decrypt_under_parent(
    cryptor: &dyn Cryptor,
    parent: &Weak<DirectoryNode>,
    encrypted_name: &str,
) -> Option<String> {
    let parent = parent.upgrade()?;
    let directory_id = parent.directory_id.as_deref()?;
    match cryptor.decrypt_filename(encrypted_name, directory_id) {
        Ok(name) if is_single_component(&name) => Some(name),
        Ok(name) => {
            warn!(name = %name, "Decrypted name is not a plain file name");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to decrypt name");
            None
        }
    }
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CtrMacCryptor, MasterKey};

    fn directory(id: Option<&str>, name: Option<String>, parent: Weak<DirectoryNode>) -> DirectoryNode {
        DirectoryNode {
            path: PathBuf::from("d/AB/CD"),
            directory_id: id.map(str::to_owned),
            encrypted_name: name,
            suffix: String::new(),
            parent,
            entries: Vec::new(),
        }
    }

    #[test]
    fn test_name_needs_parent_with_id() {
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let encrypted = cryptor.encrypt_filename("docs", "").unwrap();

        let root = Rc::new(directory(Some(""), None, Weak::new()));
        let child = directory(Some("x"), Some(encrypted.clone()), Rc::downgrade(&root));
        assert_eq!(child.decrypted_name(&cryptor).as_deref(), Some("docs"));

        let orphan = directory(Some("x"), Some(encrypted.clone()), Weak::new());
        assert_eq!(orphan.decrypted_name(&cryptor), None);

        let unknown = Rc::new(directory(None, None, Weak::new()));
        let child = directory(Some("x"), Some(encrypted), Rc::downgrade(&unknown));
        assert_eq!(child.decrypted_name(&cryptor), None);
    }

    #[test]
    fn test_traversing_names_are_rejected() {
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let root = Rc::new(directory(Some(""), None, Weak::new()));
        for name in ["..", "a/b", "."] {
            let file = FileNode {
                path: PathBuf::from("d/AB/CD/X"),
                encrypted_name: cryptor.encrypt_filename(name, "").unwrap(),
                suffix: String::new(),
                parent: Rc::downgrade(&root),
            };
            assert_eq!(file.decrypted_name(&cryptor), None, "{name}");
        }
    }

    #[test]
    fn test_root_flag() {
        assert!(directory(Some(""), None, Weak::new()).is_real_root());
        assert!(!directory(None, None, Weak::new()).is_real_root());
        assert!(!directory(Some("x"), None, Weak::new()).has_parent());
    }
}

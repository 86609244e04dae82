//! Filesystem-level encryption for vault names and file contents

pub mod file;
pub mod file_ctrmac;
pub mod name;

// Re-export commonly used types
pub use file::{FileContext, FileError, decrypt_file};
pub use file_ctrmac::{CtrMacError, FileHeader};
pub use name::{
    NameContext, NameError, decrypt_filename, encrypt_filename, hash_dir_id, long_name_hash,
    long_name_stub,
};

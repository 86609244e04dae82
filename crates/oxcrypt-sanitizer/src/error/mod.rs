//! Error types for the sanitizer crate
//!
//! Every layer has its own error enum; this module gathers them for callers
//! that map errors to exit codes or messages.

pub use crate::check::CheckError;
pub use crate::crypto::CryptoError;
pub use crate::crypto::cryptor::CryptorError;
pub use crate::fs::file::{FileContext, FileError};
pub use crate::fs::name::{NameContext, NameError};
pub use crate::index::IndexError;
pub use crate::reconstruct::ReconstructError;
pub use crate::solution::SolutionError;
pub use crate::vault::master_key::{MasterKeyCreationError, MasterKeyFileError};
pub use crate::vault::resolve::ResolveError;
pub use crate::vault::unlock::AbortError;
pub use crate::vault::writer::VaultWriteError;

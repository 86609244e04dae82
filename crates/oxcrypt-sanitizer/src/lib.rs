//! Integrity checking, repair and reconstruction for Cryptomator format 6
//! vaults.
//!
//! A run unlocks the vault with [`vault::load_cryptor`], walks it against
//! the rule tree in [`check`] and collects findings into a
//! [`problem::ProblemSet`]. Solvable findings can be repaired with
//! [`solution::solve`]. Independently of the check, [`reconstruct`]
//! decrypts whatever content can be recovered into a cleartext tree.

pub mod check;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod grammar;
pub mod index;
pub mod problem;
pub mod reconstruct;
pub mod solution;
pub mod vault;

pub use check::{CheckOptions, IntegrityCheck};
pub use problem::{Problem, ProblemSet, Severity};
pub use solution::{SolveOptions, solve};

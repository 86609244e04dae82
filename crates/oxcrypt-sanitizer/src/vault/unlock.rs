//! Unlocking the cryptor a check or reconstruction run works with.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::crypto::{CryptoError, CtrMacCryptor};
use crate::problem::{ProblemSink, Severity};

use super::master_key::{MasterKeyFile, VAULT_VERSION};
use super::MASTERKEY_FILE;

/// Conditions that end a run at once instead of being reported as problems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    #[error("Vault version mismatch. Expected: {expected} Actual: {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Invalid passphrase")]
    InvalidPassphrase,

    #[error("Version MAC mismatch, masterkey file tampered with or of an unsupported version")]
    VersionMacMismatch,

    #[error("Cryptographic provider unavailable: {0}")]
    CryptoUnavailable(String),
}

/// Read `masterkey.cryptomator` below `vault_root` and unlock it.
///
/// A missing or unparseable masterkey file is reported into `problems` and
/// yields `Ok(None)`; the caller has nothing to check with and should stop.
#[instrument(level = "info", skip(problems, passphrase), fields(vault = %vault_root.display()))]
pub fn load_cryptor(
    problems: &mut ProblemSink,
    vault_root: &Path,
    passphrase: &str,
) -> Result<Option<CtrMacCryptor>, AbortError> {
    let masterkey_path = vault_root.join(MASTERKEY_FILE);
    if !masterkey_path.is_file() {
        warn!("Masterkey file missing");
        problems.report_missing_file(&masterkey_path, Severity::Fatal);
        return Ok(None);
    }

    let bytes = match fs::read(&masterkey_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "Failed to read masterkey file");
            problems.report_exception(&e);
            return Ok(None);
        }
    };

    let keyfile = match MasterKeyFile::parse(&bytes) {
        Ok(keyfile) => keyfile,
        Err(e) => {
            warn!(error = %e, "Masterkey file unparseable");
            problems.report_invalid_masterkey_file(&masterkey_path, Severity::Fatal);
            return Ok(None);
        }
    };

    if keyfile.version != VAULT_VERSION {
        return Err(AbortError::VersionMismatch {
            expected: VAULT_VERSION,
            actual: keyfile.version,
        });
    }

    debug!(cost = keyfile.scrypt_cost_param, "Deriving key encryption key");
    match keyfile.unlock(passphrase) {
        Ok(master_key) => {
            info!("Vault unlocked");
            Ok(Some(CtrMacCryptor::new(master_key)))
        }
        Err(CryptoError::KeyUnwrapIntegrityFailed) => Err(AbortError::InvalidPassphrase),
        Err(CryptoError::HmacVerificationFailed) => Err(AbortError::VersionMacMismatch),
        Err(CryptoError::KeyDerivationFailed(reason)) => Err(AbortError::CryptoUnavailable(reason)),
        Err(
            e @ (CryptoError::InvalidScryptParams(_)
            | CryptoError::InvalidCiphertextLength
            | CryptoError::InvalidKeyLength { .. }),
        ) => {
            warn!(error = %e, "Masterkey file holds unusable key material");
            problems.report_invalid_masterkey_file(&masterkey_path, Severity::Fatal);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MasterKey;
    use crate::problem::Problem;
    use crate::vault::master_key::create_masterkey_file_with_cost;
    use tempfile::TempDir;

    const PASSPHRASE: &str = "correct horse";

    fn write_masterkey(dir: &Path) {
        let content = create_masterkey_file_with_cost(&MasterKey::random(), PASSPHRASE, 10).unwrap();
        fs::write(dir.join(MASTERKEY_FILE), content).unwrap();
    }

    #[test]
    fn test_unlock_with_correct_passphrase() {
        let temp = TempDir::new().unwrap();
        write_masterkey(temp.path());
        let mut problems = ProblemSink::new(temp.path());

        let cryptor = load_cryptor(&mut problems, temp.path(), PASSPHRASE).unwrap();
        assert!(cryptor.is_some());
        assert!(problems.is_empty());
    }

    #[test]
    fn test_wrong_passphrase_aborts() {
        let temp = TempDir::new().unwrap();
        write_masterkey(temp.path());
        let mut problems = ProblemSink::new(temp.path());

        let result = load_cryptor(&mut problems, temp.path(), "wrong");
        assert_eq!(result.unwrap_err(), AbortError::InvalidPassphrase);
    }

    #[test]
    fn test_missing_masterkey_is_fatal_problem() {
        let temp = TempDir::new().unwrap();
        let mut problems = ProblemSink::new(temp.path());

        assert!(load_cryptor(&mut problems, temp.path(), PASSPHRASE).unwrap().is_none());
        let set = problems.into_set();
        let problem = set.iter().next().unwrap();
        assert!(matches!(problem, Problem::MissingFile { severity: Severity::Fatal, .. }));
        assert_eq!(problem.to_string(), "MissingFile masterkey.cryptomator");
    }

    #[test]
    fn test_garbage_masterkey_is_invalid() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(MASTERKEY_FILE), b"{ not json").unwrap();
        let mut problems = ProblemSink::new(temp.path());

        assert!(load_cryptor(&mut problems, temp.path(), PASSPHRASE).unwrap().is_none());
        let set = problems.into_set();
        assert_eq!(set.iter().next().unwrap().name(), "InvalidMasterkeyFile");
    }

    #[test]
    fn test_version_mismatch_aborts() {
        let temp = TempDir::new().unwrap();
        write_masterkey(temp.path());
        let path = temp.path().join(MASTERKEY_FILE);
        let mut json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        json["version"] = serde_json::json!(5);
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
        let mut problems = ProblemSink::new(temp.path());

        let err = load_cryptor(&mut problems, temp.path(), PASSPHRASE).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Vault version mismatch. Expected: 6 Actual: 5"
        );
    }
}

//! Accumulates problems during a check run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{EncryptedNodeInfo, Problem, ProblemSet, SensitivePath, Severity};

/// Placeholder for the vault location in exception messages.
const VAULT_PLACEHOLDER: &str = "<vault>";

/// De-duplicating collector with one reporting helper per problem kind.
#[derive(Debug)]
pub struct ProblemSink {
    vault_root: PathBuf,
    problems: HashSet<Problem>,
}

impl ProblemSink {
    pub fn new(vault_root: impl Into<PathBuf>) -> Self {
        Self {
            vault_root: vault_root.into(),
            problems: HashSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn report(&mut self, problem: Problem) {
        self.problems.insert(problem);
    }

    pub fn sensitive(&self, path: &Path) -> SensitivePath {
        SensitivePath::new(&self.vault_root, path)
    }

    pub fn into_set(self) -> ProblemSet {
        ProblemSet::new(self.problems)
    }

    pub fn report_name_problem(&mut self, expected: impl Into<String>, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::Name {
            path,
            expected: expected.into(),
        });
    }

    pub fn report_size_mismatch(&mut self, path: &Path, expected: impl Into<String>, actual: u64) {
        let path = self.sensitive(path);
        self.report(Problem::SizeMismatch {
            path,
            expected: expected.into(),
            actual,
        });
    }

    pub fn report_content_mismatch(
        &mut self,
        path: &Path,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) {
        let path = self.sensitive(path);
        self.report(Problem::ContentMismatch {
            path,
            expected: expected.into(),
            actual: actual.into(),
        });
    }

    pub fn report_missing_file(&mut self, path: &Path, severity: Severity) {
        let path = self.sensitive(path);
        self.report(Problem::MissingFile { path, severity });
    }

    pub fn report_missing_m_file(&mut self, file: &Path, m_file: &Path) {
        let file = self.sensitive(file);
        let m_file = self.sensitive(m_file);
        self.report(Problem::MissingMFile { file, m_file });
    }

    pub fn report_orphan_m_file(&mut self, m_file: &Path) {
        let m_file = self.sensitive(m_file);
        self.report(Problem::OrphanMFile { m_file });
    }

    pub fn report_missing_directory(&mut self, directory: &Path, dir_file: &Path, exists: bool) {
        let directory = self.sensitive(directory);
        let dir_file = self.sensitive(dir_file);
        self.report(Problem::MissingDirectory {
            directory,
            dir_file,
            exists,
        });
    }

    pub fn report_orphan_directory(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::OrphanDirectory { path });
    }

    pub fn report_unauthentic_header(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::UnauthenticHeader { path });
    }

    pub fn report_unauthentic_content(&mut self, path: &Path, chunk: u64) {
        let path = self.sensitive(path);
        self.report(Problem::UnauthenticContent { path, chunk });
    }

    pub fn report_size_in_header(&mut self, path: &Path, size: i64) {
        let path = self.sensitive(path);
        if size == 0 {
            self.report(Problem::FileSizeOfZeroInHeader { path });
        } else {
            self.report(Problem::FileSizeInHeader { path, size });
        }
    }

    pub fn report_conflict(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::Conflict { path });
    }

    pub fn report_suspect_file(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::SuspectFile { path });
    }

    pub fn report_lowercased_file(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::LowercasedFile { path });
    }

    pub fn report_uppercased_file(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::UppercasedFile { path });
    }

    pub fn report_missing_equals_sign(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::MissingEqualsSign { path });
    }

    pub fn report_name_normalization(
        &mut self,
        file: &Path,
        directory_id: impl Into<String>,
        m_file: Option<&Path>,
    ) {
        let node = EncryptedNodeInfo {
            file: self.sensitive(file),
            directory_id: directory_id.into(),
            m_file: m_file.map(|m| self.sensitive(m)),
        };
        self.report(Problem::NameNormalization { node });
    }

    pub fn report_invalid_masterkey_file(&mut self, path: &Path, severity: Severity) {
        let path = self.sensitive(path);
        self.report(Problem::InvalidMasterkeyFile { path, severity });
    }

    pub fn report_empty_encrypted_file(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::EmptyEncryptedFile { path });
    }

    pub fn report_root_exists(&mut self, path: &Path) {
        let path = self.sensitive(path);
        self.report(Problem::RootExists { path });
    }

    /// Record an error a check failed with. The vault location is redacted.
    pub fn report_exception(&mut self, error: &dyn std::error::Error) {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(&format!("\ncaused by: {cause}"));
            source = cause.source();
        }
        let root = self.vault_root.display().to_string();
        if !root.is_empty() {
            message = message.replace(&root, VAULT_PLACEHOLDER);
        }
        self.report(Problem::Exception { message });
    }
}

//! Repairs for solvable problems.
//!
//! Every solution announces itself on a [`SolutionContext`], attempts the
//! repair and then reports success or the reason it failed. In dry-run mode
//! every read and precondition runs but the final mutating step is skipped.

pub mod header;
pub mod rename;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::crypto::{Cryptor, CryptorError};
use crate::problem::{EncryptedNodeInfo, Problem, ProblemSet, SensitivePath};

/// Options of one repair pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolveOptions {
    /// Kind names of the problems to solve.
    pub problems: Vec<String>,
    pub dry_run: bool,
}

#[derive(Error, Debug)]
pub enum SolutionError {
    #[error("{0} exists")]
    TargetExists(String),

    #[error("Skipping file with invalid file size {stored}/{actual}")]
    InvalidFileSize { stored: i64, actual: u64 },

    #[error("Reached EOF at position {position}/{expected_end}")]
    UnexpectedEof { position: u64, expected_end: u64 },

    #[error("Failed to read all header bytes from {0}")]
    TruncatedHeader(String),

    #[error("{0} has no decryptable name")]
    NoDecryptablePart(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Cryptor(#[from] CryptorError),
}

impl SolutionError {
    pub(crate) fn io(path: &SensitivePath) -> impl FnOnce(io::Error) -> SolutionError + '_ {
        move |source| SolutionError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// What a solution needs from its environment, and where it reports to.
pub trait SolutionContext {
    fn start(&mut self, description: &str);

    fn finish(&mut self);

    fn fail(&mut self, reason: &str);

    fn dry_run(&self) -> bool;

    fn vault_root(&self) -> &Path;

    fn cryptor(&self) -> &dyn Cryptor;

    /// Random suffix for temporary names.
    fn temp_suffix(&mut self) -> u32;

    fn sensitive(&self, path: &Path) -> SensitivePath {
        SensitivePath::new(self.vault_root(), path)
    }
}

/// Prints `<description>... [OK]` or `[FAILED]` and the reason to a writer.
pub struct WriterSolutionContext<'a, W: Write> {
    out: W,
    vault_root: PathBuf,
    cryptor: &'a dyn Cryptor,
    dry_run: bool,
    rng: StdRng,
}

impl<'a, W: Write> WriterSolutionContext<'a, W> {
    pub fn new(out: W, vault_root: &Path, cryptor: &'a dyn Cryptor, dry_run: bool) -> Self {
        Self::with_rng(out, vault_root, cryptor, dry_run, StdRng::from_os_rng())
    }

    pub fn with_rng(
        out: W,
        vault_root: &Path,
        cryptor: &'a dyn Cryptor,
        dry_run: bool,
        rng: StdRng,
    ) -> Self {
        Self {
            out,
            vault_root: vault_root.to_path_buf(),
            cryptor,
            dry_run,
            rng,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(text).and_then(|()| self.out.flush()) {
            warn!(error = %e, "Failed to write solution progress");
        }
    }
}

impl<W: Write> SolutionContext for WriterSolutionContext<'_, W> {
    fn start(&mut self, description: &str) {
        self.emit(format_args!("{description}... "));
    }

    fn finish(&mut self) {
        self.emit(format_args!("[OK]\n"));
    }

    fn fail(&mut self, reason: &str) {
        self.emit(format_args!("[FAILED]\n{reason}\n"));
    }

    fn dry_run(&self) -> bool {
        self.dry_run
    }

    fn vault_root(&self) -> &Path {
        &self.vault_root
    }

    fn cryptor(&self) -> &dyn Cryptor {
        self.cryptor
    }

    fn temp_suffix(&mut self) -> u32 {
        self.rng.next_u32()
    }
}

/// A repair bound to one problem instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Solution {
    /// Uppercase the ciphertext part of a name.
    FixLowercase { file: SensitivePath },
    /// Lowercase a name that must be all lowercase.
    FixUppercase { file: SensitivePath },
    AppendPadding { file: SensitivePath },
    DeleteOrphanMFile { m_file: SensitivePath },
    /// Replace a legacy size of `0` with "unknown".
    ClearZeroSize { file: SensitivePath },
    /// Cut the file to the legacy size, then clear it.
    FixFileSizeInHeader { file: SensitivePath },
    /// Re-encrypt the NFC form of a name.
    Renormalize { node: EncryptedNodeInfo },
}

impl Solution {
    pub fn for_problem(problem: &Problem) -> Option<Self> {
        let solution = match problem {
            Problem::LowercasedFile { path } => Solution::FixLowercase { file: path.clone() },
            Problem::UppercasedFile { path } => Solution::FixUppercase { file: path.clone() },
            Problem::MissingEqualsSign { path } => Solution::AppendPadding { file: path.clone() },
            Problem::OrphanMFile { m_file } => Solution::DeleteOrphanMFile {
                m_file: m_file.clone(),
            },
            Problem::FileSizeOfZeroInHeader { path } => {
                Solution::ClearZeroSize { file: path.clone() }
            }
            Problem::FileSizeInHeader { path, .. } => {
                Solution::FixFileSizeInHeader { file: path.clone() }
            }
            Problem::NameNormalization { node } => Solution::Renormalize { node: node.clone() },
            _ => return None,
        };
        Some(solution)
    }

    pub fn description(&self) -> String {
        match self {
            Solution::FixLowercase { file } => format!("Fix lowercase file {file}"),
            Solution::FixUppercase { file } => format!("Fix uppercase file {file}"),
            Solution::AppendPadding { file } => format!("Fix missing equals sign for {file}"),
            Solution::DeleteOrphanMFile { m_file } => {
                format!("Remove orphan metadata file {m_file}")
            }
            Solution::ClearZeroSize { file } => format!("Fix zero file size in header for {file}"),
            Solution::FixFileSizeInHeader { file } => format!("Fix file size in header for {file}"),
            Solution::Renormalize { node } => format!("Fix non NFC file {}", node.file),
        }
    }

    /// Run the repair, reporting the outcome on `ctx`. Returns whether it
    /// succeeded.
    pub fn execute(&self, ctx: &mut dyn SolutionContext) -> bool {
        ctx.start(&self.description());
        match self.try_execute(ctx) {
            Ok(()) => {
                ctx.finish();
                true
            }
            Err(e) => {
                warn!(solution = %self.description(), error = %e, "Solution failed");
                ctx.fail(&e.to_string());
                false
            }
        }
    }

    fn try_execute(&self, ctx: &mut dyn SolutionContext) -> Result<(), SolutionError> {
        match self {
            Solution::FixLowercase { file } => rename::fix_lowercase(ctx, file),
            Solution::FixUppercase { file } => rename::fix_uppercase(ctx, file),
            Solution::AppendPadding { file } => rename::append_padding(ctx, file),
            Solution::DeleteOrphanMFile { m_file } => rename::delete_orphan_m_file(ctx, m_file),
            Solution::ClearZeroSize { file } => header::clear_zero_size(ctx, file),
            Solution::FixFileSizeInHeader { file } => header::fix_file_size(ctx, file),
            Solution::Renormalize { node } => rename::renormalize(ctx, node),
        }
    }
}

/// Outcome counts of a repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveSummary {
    pub solved: usize,
    pub failed: usize,
}

/// Solve every problem in `problems` whose kind is named in `names`, in the
/// set's display order.
#[instrument(level = "info", skip_all, fields(names = ?names))]
pub fn solve(problems: &ProblemSet, names: &[String], ctx: &mut dyn SolutionContext) -> SolveSummary {
    let mut summary = SolveSummary::default();
    for problem in problems.named(names) {
        let Some(solution) = Solution::for_problem(problem) else {
            continue;
        };
        if solution.execute(ctx) {
            summary.solved += 1;
        } else {
            summary.failed += 1;
        }
    }
    info!(solved = summary.solved, failed = summary.failed, dry_run = ctx.dry_run(), "Solutions executed");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CtrMacCryptor, MasterKey};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_only_solvable_problems_have_solutions() {
        let path = SensitivePath::new(Path::new("/v"), Path::new("/v/d/ab"));
        assert!(Solution::for_problem(&Problem::LowercasedFile { path: path.clone() }).is_some());
        assert!(Solution::for_problem(&Problem::Conflict { path }).is_none());
    }

    #[test]
    fn test_writer_context_output() {
        let temp = TempDir::new().unwrap();
        let m_file = temp.path().join("m/AB/CD/ABCD.lng");
        fs::create_dir_all(m_file.parent().unwrap()).unwrap();
        fs::write(&m_file, b"x").unwrap();

        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let mut ctx = WriterSolutionContext::with_rng(
            Vec::new(),
            temp.path(),
            &cryptor,
            false,
            StdRng::seed_from_u64(7),
        );
        let solution = Solution::DeleteOrphanMFile {
            m_file: ctx.sensitive(&m_file),
        };
        assert!(solution.execute(&mut ctx));
        assert!(!m_file.exists());

        let output = String::from_utf8(ctx.into_inner()).unwrap();
        assert_eq!(output, "Remove orphan metadata file m/AB/CD/ABCD.lng... [OK]\n");
    }

    #[test]
    fn test_failure_is_reported_not_raised() {
        let temp = TempDir::new().unwrap();
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let mut ctx = WriterSolutionContext::new(Vec::new(), temp.path(), &cryptor, false);
        let solution = Solution::DeleteOrphanMFile {
            m_file: ctx.sensitive(&temp.path().join("m/absent.lng")),
        };
        assert!(!solution.execute(&mut ctx));

        let output = String::from_utf8(ctx.into_inner()).unwrap();
        assert!(output.starts_with("Remove orphan metadata file m/absent.lng... [FAILED]\n"));
    }
}

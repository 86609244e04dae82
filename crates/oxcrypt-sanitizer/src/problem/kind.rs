//! The closed set of findings a check can report.

use std::fmt;

use super::{SensitivePath, Severity};

/// A node whose decrypted name needs re-encryption, with what is needed to
/// find its siblings again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncryptedNodeInfo {
    /// The node in `d/` (a regular name or a `.lng` stub).
    pub file: SensitivePath,
    /// Cleartext id of the directory containing `file`.
    pub directory_id: String,
    /// The m-file holding the full name when `file` is shortened.
    pub m_file: Option<SensitivePath>,
}

/// One finding of an integrity check.
///
/// Equal findings collapse in a [`super::ProblemSet`], so every field takes
/// part in equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Problem {
    /// Name does not match the expected grammar.
    Name {
        path: SensitivePath,
        expected: String,
    },
    SizeMismatch {
        path: SensitivePath,
        expected: String,
        actual: u64,
    },
    ContentMismatch {
        path: SensitivePath,
        expected: String,
        actual: String,
    },
    /// A required node is absent.
    MissingFile {
        path: SensitivePath,
        severity: Severity,
    },
    MissingMFile {
        file: SensitivePath,
        m_file: SensitivePath,
    },
    OrphanMFile {
        m_file: SensitivePath,
    },
    /// A directory-id file points to a container that does not exist.
    MissingDirectory {
        directory: SensitivePath,
        dir_file: SensitivePath,
        exists: bool,
    },
    /// A container no directory-id file points to.
    OrphanDirectory {
        path: SensitivePath,
    },
    UnauthenticHeader {
        path: SensitivePath,
    },
    UnauthenticContent {
        path: SensitivePath,
        chunk: u64,
    },
    /// The legacy size field of the header is `0`.
    FileSizeOfZeroInHeader {
        path: SensitivePath,
    },
    /// The legacy size field of the header holds a value other than `-1`.
    FileSizeInHeader {
        path: SensitivePath,
        size: i64,
    },
    Conflict {
        path: SensitivePath,
    },
    /// A node that has no place in the vault layout.
    SuspectFile {
        path: SensitivePath,
    },
    LowercasedFile {
        path: SensitivePath,
    },
    UppercasedFile {
        path: SensitivePath,
    },
    MissingEqualsSign {
        path: SensitivePath,
    },
    NameNormalization {
        node: EncryptedNodeInfo,
    },
    InvalidMasterkeyFile {
        path: SensitivePath,
        severity: Severity,
    },
    EmptyEncryptedFile {
        path: SensitivePath,
    },
    RootExists {
        path: SensitivePath,
    },
    /// A check failed with an error instead of reporting.
    Exception {
        message: String,
    },
}

impl Problem {
    pub fn severity(&self) -> Severity {
        match self {
            Problem::MissingFile { severity, .. } | Problem::InvalidMasterkeyFile { severity, .. } => {
                *severity
            }
            Problem::Exception { .. } => Severity::Fatal,
            Problem::Name { .. }
            | Problem::SizeMismatch { .. }
            | Problem::ContentMismatch { .. }
            | Problem::MissingMFile { .. }
            | Problem::UnauthenticHeader { .. }
            | Problem::UnauthenticContent { .. }
            | Problem::FileSizeOfZeroInHeader { .. }
            | Problem::LowercasedFile { .. }
            | Problem::UppercasedFile { .. }
            | Problem::MissingEqualsSign { .. }
            | Problem::NameNormalization { .. } => Severity::Error,
            Problem::MissingDirectory { .. }
            | Problem::OrphanDirectory { .. }
            | Problem::FileSizeInHeader { .. }
            | Problem::Conflict { .. }
            | Problem::SuspectFile { .. } => Severity::Warn,
            Problem::OrphanMFile { .. }
            | Problem::EmptyEncryptedFile { .. }
            | Problem::RootExists { .. } => Severity::Info,
        }
    }

    /// Kind name, also the value used to select problems for solving.
    pub fn name(&self) -> &'static str {
        match self {
            Problem::Name { .. } => "NameProblem",
            Problem::SizeMismatch { .. } => "SizeMismatch",
            Problem::ContentMismatch { .. } => "ContentMismatch",
            Problem::MissingFile { .. } => "MissingFile",
            Problem::MissingMFile { .. } => "MissingMFile",
            Problem::OrphanMFile { .. } => "OrphanMFile",
            Problem::MissingDirectory { .. } => "MissingDirectory",
            Problem::OrphanDirectory { .. } => "OrphanDirectory",
            Problem::UnauthenticHeader { .. } => "UnauthenticHeader",
            Problem::UnauthenticContent { .. } => "UnauthenticContent",
            Problem::FileSizeOfZeroInHeader { .. } => "FileSizeOfZeroInHeader",
            Problem::FileSizeInHeader { .. } => "FileSizeInHeader",
            Problem::Conflict { .. } => "Conflict",
            Problem::SuspectFile { .. } => "SuspectFile",
            Problem::LowercasedFile { .. } => "LowercasedFile",
            Problem::UppercasedFile { .. } => "UppercasedFile",
            Problem::MissingEqualsSign { .. } => "MissingEqualsSign",
            Problem::NameNormalization { .. } => "NameNormalization",
            Problem::InvalidMasterkeyFile { .. } => "InvalidMasterkeyFile",
            Problem::EmptyEncryptedFile { .. } => "EmptyEncryptedFile",
            Problem::RootExists { .. } => "RootExists",
            Problem::Exception { .. } => "Exception",
        }
    }

    /// Whether a solution exists for this problem.
    pub fn is_solvable(&self) -> bool {
        SOLVABLE_PROBLEMS.contains(&self.name())
    }
}

/// Names of the problems a solution exists for.
pub const SOLVABLE_PROBLEMS: &[&str] = &[
    "LowercasedFile",
    "UppercasedFile",
    "MissingEqualsSign",
    "OrphanMFile",
    "FileSizeOfZeroInHeader",
    "FileSizeInHeader",
    "NameNormalization",
];

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name();
        match self {
            Problem::Name { path, expected } => {
                write!(f, "{name} file: {path} expected: {expected}")
            }
            Problem::SizeMismatch {
                path,
                expected,
                actual,
            } => write!(f, "{name} {path} expected: {expected} actual: {actual}"),
            Problem::ContentMismatch {
                path,
                expected,
                actual,
            } => write!(f, "{name} file: {path} expected: {expected} actual: {actual}"),
            Problem::MissingMFile { file, m_file } => {
                write!(f, "{name} file: {file} mFile: {m_file}")
            }
            Problem::OrphanMFile { m_file } => write!(f, "{name} {m_file}"),
            Problem::MissingDirectory {
                directory,
                dir_file,
                exists,
            } => write!(
                f,
                "{name} path: {directory} dirfile: {dir_file} notADirectoryButExists: {exists}"
            ),
            Problem::UnauthenticContent { path, chunk } => {
                write!(f, "{name} {path} chunk: {chunk:03}")
            }
            Problem::FileSizeInHeader { path, size } => write!(f, "{name} {path} size: {size}"),
            Problem::NameNormalization { node } => write!(f, "{name} file: {}", node.file),
            Problem::Exception { message } => {
                write!(f, "{name} {}", message.replace('\n', "\n\t"))
            }
            Problem::MissingFile { path, .. }
            | Problem::OrphanDirectory { path }
            | Problem::UnauthenticHeader { path }
            | Problem::FileSizeOfZeroInHeader { path }
            | Problem::Conflict { path }
            | Problem::SuspectFile { path }
            | Problem::LowercasedFile { path }
            | Problem::UppercasedFile { path }
            | Problem::MissingEqualsSign { path }
            | Problem::InvalidMasterkeyFile { path, .. }
            | Problem::EmptyEncryptedFile { path }
            | Problem::RootExists { path } => write!(f, "{name} {path}"),
        }
    }
}

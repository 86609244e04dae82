//! Problems found by an integrity check and the set they are collected into.

pub mod kind;
pub mod sink;

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

pub use kind::{EncryptedNodeInfo, Problem, SOLVABLE_PROBLEMS};
pub use sink::ProblemSink;

/// How much a problem matters, ordered from `Info` to `Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Occurs during normal operation of a vault.
    Info,
    /// Not guaranteed to cause trouble while using the vault.
    Warn,
    /// Guaranteed to cause trouble while using the vault.
    Error,
    /// Keeps the check itself from operating correctly.
    Fatal,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Fatal,
        Severity::Error,
        Severity::Warn,
        Severity::Info,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A path that is displayed relative to the vault root.
///
/// The absolute path is kept for solutions; only the display form ever
/// reaches a report.
#[derive(Debug, Clone)]
pub struct SensitivePath {
    path: PathBuf,
    display: String,
}

impl SensitivePath {
    pub fn new(vault_root: &Path, path: &Path) -> Self {
        let display = match path.strip_prefix(vault_root) {
            Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.display().to_string(),
        };
        Self {
            path: path.to_path_buf(),
            display,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl PartialEq for SensitivePath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for SensitivePath {}

impl Hash for SensitivePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for SensitivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// De-duplicated problems in display order: highest severity first, then
/// lexically by rendering.
#[derive(Debug, Clone, Default)]
pub struct ProblemSet {
    problems: Vec<Problem>,
}

impl ProblemSet {
    pub fn new(problems: impl IntoIterator<Item = Problem>) -> Self {
        // Distinct problems may render alike, so equal ones need not end up
        // adjacent after sorting.
        let unique: HashSet<Problem> = problems.into_iter().collect();
        let mut keyed: Vec<(Severity, String, Problem)> = unique
            .into_iter()
            .map(|p| (p.severity(), p.to_string(), p))
            .collect();
        keyed.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Self {
            problems: keyed.into_iter().map(|(_, _, p)| p).collect(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Problem> {
        self.problems.iter()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.problems.iter().filter(|p| p.severity() == severity).count()
    }

    /// Number of findings users have to care about.
    pub fn count_excluding_info(&self) -> usize {
        self.problems
            .iter()
            .filter(|p| p.severity() > Severity::Info)
            .count()
    }

    /// Problems with one of the given kind names, in display order.
    pub fn named<'a>(&'a self, names: &'a [String]) -> impl Iterator<Item = &'a Problem> + 'a {
        self.problems
            .iter()
            .filter(move |p| names.iter().any(|n| n == p.name()))
    }

    /// Report lines, `<severity padded to 5> <problem>`.
    pub fn report_lines(&self) -> impl Iterator<Item = String> + '_ {
        self.problems
            .iter()
            .map(|p| format!("{:<5} {}", p.severity(), p))
    }
}

impl<'a> IntoIterator for &'a ProblemSet {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.iter()
    }
}

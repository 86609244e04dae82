//! Rules, checks and how they compose.

use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::grammar::{NameShape, NodePattern};
use crate::problem::{ProblemSink, Severity};
use crate::vault::unlock::AbortError;

use super::{CheckContext, CheckError, auth, name, node, reference};

/// Incidental names that are never suspect.
const ALLOWED_ADDITIONAL_FILENAMES: &[&str] = &["desktop.ini"];

/// A unit that reports problems about one node.
#[derive(Debug, Clone)]
pub enum Check {
    /// File name fully matches the pattern.
    HasName(NodePattern),
    /// Ciphertext part of the name has no lowercase characters.
    NoLowercase,
    /// Name has no uppercase characters.
    NoUppercase,
    HasSize(u64),
    HasMinSize(u64),
    /// Content starts with a UUID.
    ContainsUuid,
    /// Content is a ciphertext name of the given shape.
    ContainsValidName(NameShape),
    /// The directory a directory-id file names has a container.
    ReferencedDirectoryExists,
    /// Some directory-id file names this container.
    HasCorrespondingDirectoryFile,
    /// Reports the root container when it is the node checked.
    RootDirectoryIfMatching,
    /// Reports a file holding a header and nothing else.
    EmptyEncryptedFileIfEmpty,
    /// Header authenticates, content too when checking deep.
    Authentic,
    /// Name decrypts with the id of its directory.
    DecryptedName,
    /// m-file content decrypts with the id of the stub's directory.
    DecryptedLongName,
    /// A `.lng` stub has its m-file; the inner check runs on the m-file.
    HasCorrespondingMFile(Option<Box<Check>>),
    /// An m-file has its stub in `d/`.
    HasCorrespondingDFile,
    /// Structurally valid masterkey backup.
    MasterkeyBackup,
    /// Always reports a missing padding.
    MissingEqualsSign,
    /// Always reports a conflict.
    Conflict,
    /// Runs the right check only when the left one passes, else the left one.
    And(Box<Check>, Box<Check>),
    /// Matches every child of a directory against the rules.
    Contains(Vec<Rule>),
}

impl Check {
    #[must_use]
    pub fn and(self, other: Check) -> Check {
        Check::And(Box::new(self), Box::new(other))
    }

    pub fn has_corresponding_m_file() -> Check {
        Check::HasCorrespondingMFile(None)
    }

    /// Requires the m-file and runs `check` on it.
    pub fn has_corresponding_m_file_that(check: Check) -> Check {
        Check::HasCorrespondingMFile(Some(Box::new(check)))
    }

    /// Run the check, recording every error except an abort as a problem.
    pub fn check(
        &self,
        ctx: &mut CheckContext<'_>,
        problems: &mut ProblemSink,
        path: &Path,
    ) -> Result<(), AbortError> {
        match self.run(ctx, problems, path) {
            Ok(()) => Ok(()),
            Err(CheckError::Abort(abort)) => Err(abort),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Check failed");
                problems.report_exception(&e);
                Ok(())
            }
        }
    }

    /// Whether the check reports nothing for `path`.
    pub fn test(&self, ctx: &mut CheckContext<'_>, path: &Path) -> Result<bool, AbortError> {
        let mut scratch = ProblemSink::new(ctx.vault_root.clone());
        self.check(ctx, &mut scratch, path)?;
        Ok(scratch.is_empty())
    }

    fn run(
        &self,
        ctx: &mut CheckContext<'_>,
        problems: &mut ProblemSink,
        path: &Path,
    ) -> Result<(), CheckError> {
        match self {
            Check::HasName(pattern) => node::has_name(*pattern, problems, path),
            Check::NoLowercase => node::no_lowercase(problems, path),
            Check::NoUppercase => node::no_uppercase(problems, path),
            Check::HasSize(size) => node::has_size(*size, problems, path),
            Check::HasMinSize(size) => node::has_min_size(*size, problems, path),
            Check::ContainsUuid => node::contains_uuid(problems, path),
            Check::ContainsValidName(shape) => node::contains_valid_name(*shape, problems, path),
            Check::ReferencedDirectoryExists => {
                reference::referenced_directory_exists(ctx, problems, path)
            }
            Check::HasCorrespondingDirectoryFile => {
                reference::has_corresponding_directory_file(ctx, problems, path)
            }
            Check::RootDirectoryIfMatching => {
                reference::root_directory_if_matching(ctx, problems, path)
            }
            Check::EmptyEncryptedFileIfEmpty => {
                node::empty_encrypted_file_if_empty(ctx, problems, path)
            }
            Check::Authentic => auth::authentic(ctx, problems, path),
            Check::DecryptedName => name::decrypted_name(ctx, problems, path),
            Check::DecryptedLongName => name::decrypted_long_name(ctx, problems, path),
            Check::HasCorrespondingMFile(inner) => {
                reference::has_corresponding_m_file(ctx, problems, path, inner.as_deref())
            }
            Check::HasCorrespondingDFile => {
                reference::has_corresponding_d_file(ctx, problems, path)
            }
            Check::MasterkeyBackup => node::masterkey_backup(problems, path),
            Check::MissingEqualsSign => {
                problems.report_missing_equals_sign(path);
                Ok(())
            }
            Check::Conflict => {
                problems.report_conflict(path);
                Ok(())
            }
            Check::And(first, second) => {
                if first.test(ctx, path)? {
                    second.check(ctx, problems, path)?;
                } else {
                    first.check(ctx, problems, path)?;
                }
                Ok(())
            }
            Check::Contains(rules) => contains(rules, ctx, problems, path),
        }
    }
}

/// Whether a rule applies to files or directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    fn matches(self, path: &Path) -> bool {
        match self {
            NodeKind::File => path.is_file(),
            NodeKind::Directory => path.is_dir(),
        }
    }
}

/// Expected child of a directory: which nodes it applies to and what is
/// checked about them.
#[derive(Debug, Clone)]
pub struct Rule {
    kind: NodeKind,
    /// Set for rules whose node must exist.
    required: Option<&'static str>,
    filters: Vec<Check>,
    validations: Vec<Check>,
}

impl Rule {
    pub fn file() -> Self {
        Self::new(NodeKind::File)
    }

    pub fn dir() -> Self {
        Self::new(NodeKind::Directory)
    }

    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            required: None,
            filters: Vec::new(),
            validations: Vec::new(),
        }
    }

    /// A node with this exact name, reported missing when absent.
    #[must_use]
    pub fn required(mut self, name: &'static str) -> Self {
        self.required = Some(name);
        self.that(Check::HasName(NodePattern::Exact(name)))
    }

    /// Only nodes passing `filter` are matched by this rule.
    #[must_use]
    pub fn that(mut self, filter: Check) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn validate(mut self, check: Check) -> Self {
        self.validations.push(check);
        self
    }

    /// Same as [`Rule::validate`], for checks that report a classification
    /// rather than a defect.
    #[must_use]
    pub fn report_as(self, check: Check) -> Self {
        self.validate(check)
    }

    #[must_use]
    pub fn containing(self, rules: Vec<Rule>) -> Self {
        self.validate(Check::Contains(rules))
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn matches(&self, ctx: &mut CheckContext<'_>, path: &Path) -> Result<bool, AbortError> {
        if !self.kind.matches(path) {
            return Ok(false);
        }
        for filter in &self.filters {
            if !filter.test(ctx, path)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Run every validation of this rule on `path`.
    pub fn apply(
        &self,
        ctx: &mut CheckContext<'_>,
        problems: &mut ProblemSink,
        path: &Path,
    ) -> Result<(), AbortError> {
        for check in &self.validations {
            check.check(ctx, problems, path)?;
        }
        Ok(())
    }
}

fn contains(
    rules: &[Rule],
    ctx: &mut CheckContext<'_>,
    problems: &mut ProblemSink,
    dir: &Path,
) -> Result<(), CheckError> {
    let mut children = fs::read_dir(dir)
        .map_err(CheckError::io(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(CheckError::io(dir))?;
    children.sort();

    let mut used = vec![false; rules.len()];
    for child in &children {
        let mut matched = None;
        for (i, rule) in rules.iter().enumerate() {
            if rule.matches(ctx, child)? {
                matched = Some(i);
                break;
            }
        }
        match matched {
            Some(i) => {
                trace!(path = %child.display(), rule = i, "Node matched");
                used[i] = true;
                rules[i].apply(ctx, problems, child)?;
            }
            None if is_allowed(child) => {}
            None => problems.report_suspect_file(child),
        }
    }

    for (rule, used) in rules.iter().zip(used) {
        if let (Some(name), false) = (rule.required, used) {
            problems.report_missing_file(&dir.join(name), Severity::Error);
        }
    }
    Ok(())
}

fn is_allowed(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    name.starts_with('.') || ALLOWED_ADDITIONAL_FILENAMES.contains(&name.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckOptions;
    use crate::crypto::{CtrMacCryptor, MasterKey};
    use crate::problem::Problem;
    use tempfile::TempDir;

    fn run_rule(rule: &Rule, root: &Path) -> Vec<String> {
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let mut ctx = CheckContext::new(&cryptor, root, CheckOptions::default());
        let mut problems = ProblemSink::new(root);
        rule.apply(&mut ctx, &mut problems, root).unwrap();
        problems.into_set().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_unmatched_children_are_suspect() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("junk"), b"").unwrap();
        fs::write(temp.path().join(".DS_Store"), b"").unwrap();
        fs::write(temp.path().join("desktop.ini"), b"").unwrap();

        let rule = Rule::dir().containing(vec![]);
        assert_eq!(run_rule(&rule, temp.path()), ["SuspectFile junk"]);
    }

    #[test]
    fn test_missing_required_child() {
        let temp = TempDir::new().unwrap();
        let rule = Rule::dir().containing(vec![Rule::dir().required("d")]);
        assert_eq!(run_rule(&rule, temp.path()), ["MissingFile d"]);
    }

    #[test]
    fn test_required_child_matches_case_insensitively() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("D")).unwrap();
        let rule = Rule::dir().containing(vec![
            Rule::dir().required("d").validate(Check::NoUppercase),
        ]);
        assert_eq!(run_rule(&rule, temp.path()), ["UppercasedFile D"]);
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("AB"), b"").unwrap();
        let rule = Rule::dir().containing(vec![
            Rule::file()
                .that(Check::HasName(NodePattern::ShardDir))
                .report_as(Check::Conflict),
            Rule::file()
                .that(Check::HasName(NodePattern::ShardDir))
                .report_as(Check::MissingEqualsSign),
        ]);
        assert_eq!(run_rule(&rule, temp.path()), ["Conflict AB"]);
    }

    #[test]
    fn test_and_reports_first_failure_only() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, b"short").unwrap();

        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let mut ctx = CheckContext::new(&cryptor, temp.path(), CheckOptions::default());
        let mut problems = ProblemSink::new(temp.path());
        Check::HasSize(36)
            .and(Check::ContainsUuid)
            .check(&mut ctx, &mut problems, &file)
            .unwrap();

        let set = problems.into_set();
        assert_eq!(set.len(), 1);
        assert!(matches!(set.iter().next(), Some(Problem::SizeMismatch { actual: 5, .. })));
    }

    #[test]
    fn test_errors_become_exception_problems() {
        let temp = TempDir::new().unwrap();
        let cryptor = CtrMacCryptor::new(MasterKey::random());
        let mut ctx = CheckContext::new(&cryptor, temp.path(), CheckOptions::default());
        let mut problems = ProblemSink::new(temp.path());

        Check::HasSize(36)
            .check(&mut ctx, &mut problems, &temp.path().join("absent"))
            .unwrap();

        let set = problems.into_set();
        let problem = set.iter().next().unwrap();
        assert_eq!(problem.severity(), Severity::Fatal);
        assert!(problem.to_string().contains("<vault>/absent"));
    }
}

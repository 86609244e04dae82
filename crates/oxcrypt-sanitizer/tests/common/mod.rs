//! Shared fixtures: format 6 vaults written with a cheap scrypt cost, plus
//! helpers to damage them.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use oxcrypt_sanitizer::check::{CheckOptions, IntegrityCheck};
use oxcrypt_sanitizer::crypto::{Cryptor, CtrMacCryptor};
use oxcrypt_sanitizer::problem::{Problem, ProblemSet};
use oxcrypt_sanitizer::solution::{SolveSummary, WriterSolutionContext, solve};
use oxcrypt_sanitizer::vault::{DirId, VaultWriter};
use tempfile::TempDir;
use walkdir::WalkDir;

pub const TEST_PASSPHRASE: &str = "test-passphrase-12345";

/// scrypt cost exponent for fixtures; the default takes far too long.
pub const TEST_SCRYPT_COST: u8 = 10;

enum Node {
    Directory(String),
    File(String, Vec<u8>),
}

/// Describes a vault by cleartext paths; parents must be added first.
#[derive(Default)]
pub struct VaultBuilder {
    nodes: Vec<Node>,
}

impl VaultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(mut self, path: &str) -> Self {
        self.nodes.push(Node::Directory(path.to_string()));
        self
    }

    pub fn file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.nodes.push(Node::File(path.to_string(), content.into()));
        self
    }

    pub fn build(self) -> TestVault {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("vault");
        let writer = VaultWriter::create_with_cost(&root, TEST_PASSPHRASE, TEST_SCRYPT_COST).unwrap();
        let mut directories = HashMap::from([(String::new(), DirId::root())]);
        let mut files = HashMap::new();

        for node in self.nodes {
            match node {
                Node::Directory(path) => {
                    let (parent, name) = split(&path);
                    let id = writer.create_directory(&directories[parent], name).unwrap();
                    directories.insert(path, id);
                }
                Node::File(path, content) => {
                    let (parent, name) = split(&path);
                    let node = writer.write_file(&directories[parent], name, &content).unwrap();
                    files.insert(path, node);
                }
            }
        }

        TestVault {
            _temp: temp,
            root,
            writer,
            directories,
            files,
        }
    }
}

fn split(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// A vault on disk and the ciphertext locations of what was written.
pub struct TestVault {
    _temp: TempDir,
    root: PathBuf,
    writer: VaultWriter,
    directories: HashMap<String, DirId>,
    files: HashMap<String, PathBuf>,
}

impl TestVault {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cryptor(&self) -> &CtrMacCryptor {
        self.writer.cryptor()
    }

    pub fn writer(&self) -> &VaultWriter {
        &self.writer
    }

    pub fn directory_id(&self, path: &str) -> &DirId {
        &self.directories[path]
    }

    pub fn container(&self, path: &str) -> PathBuf {
        self.writer.container(&self.directories[path]).unwrap()
    }

    /// Ciphertext node of the file written at `path`.
    pub fn file_node(&self, path: &str) -> PathBuf {
        self.files[path].clone()
    }

    /// Directory-id file of the directory written at `path`.
    pub fn directory_node(&self, path: &str) -> PathBuf {
        let (parent, name) = split(path);
        let parent_id = &self.directories[parent];
        let encrypted = self.cryptor().encrypt_filename(name, parent_id.as_str()).unwrap();
        self.writer.container(parent_id).unwrap().join(format!("0{encrypted}"))
    }

    /// A target directory next to the vault.
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.root.parent().unwrap().join(name)
    }

    pub fn check(&self) -> ProblemSet {
        IntegrityCheck::run(&self.root, TEST_PASSPHRASE, CheckOptions { deep: true }).unwrap()
    }

    /// Solve the named problems of a fresh check; returns the summary and
    /// the progress output.
    pub fn solve(&self, names: &[&str], dry_run: bool) -> (SolveSummary, String) {
        let problems = self.check();
        let names: Vec<String> = names.iter().map(ToString::to_string).collect();
        let mut ctx = WriterSolutionContext::new(Vec::new(), &self.root, self.cryptor(), dry_run);
        let summary = solve(&problems, &names, &mut ctx);
        (summary, String::from_utf8(ctx.into_inner()).unwrap())
    }

    /// Every file below the root with its content, keyed by relative path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        WalkDir::new(&self.root)
            .into_iter()
            .map(Result::unwrap)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                let relative = e.path().strip_prefix(&self.root).unwrap();
                (relative.to_string_lossy().into_owned(), fs::read(e.path()).unwrap())
            })
            .collect()
    }
}

/// Kind names of the non-INFO problems, sorted.
pub fn problem_names(problems: &ProblemSet) -> Vec<&'static str> {
    let mut names: Vec<_> = problems
        .iter()
        .filter(|p| p.severity() > oxcrypt_sanitizer::problem::Severity::Info)
        .map(Problem::name)
        .collect();
    names.sort_unstable();
    names
}

/// Rename `path` to `name` in the same directory; returns the new path.
pub fn rename_to(path: &Path, name: &str) -> PathBuf {
    let target = path.with_file_name(name);
    fs::rename(path, &target).unwrap();
    target
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Overwrite `len` bytes at `offset` with their bitwise complement.
pub fn flip_bytes(path: &Path, offset: usize, len: usize) {
    let mut bytes = fs::read(path).unwrap();
    for byte in &mut bytes[offset..offset + len] {
        *byte = !*byte;
    }
    fs::write(path, bytes).unwrap();
}

/// Re-encrypt the header of `path` with a legacy cleartext size.
pub fn set_header_size(cryptor: &dyn Cryptor, path: &Path, size: i64) {
    let mut bytes = fs::read(path).unwrap();
    let header_size = cryptor.header_size();
    let mut header = cryptor.decrypt_header(&bytes[..header_size]).unwrap();
    header.filesize = size;
    bytes[..header_size].copy_from_slice(&cryptor.encrypt_header(&header));
    fs::write(path, bytes).unwrap();
}

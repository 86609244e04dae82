//! Check command - scan a vault, report its problems and optionally solve them.
//!
//! Two report files are written next to the current directory:
//! `<prefix>.structure.txt` lists every node of the vault with obfuscated
//! sizes, `<prefix>.check.txt` lists every problem found. Neither file is
//! ever overwritten.
//!
//! # Examples
//!
//! ```bash
//! # Check headers and names only
//! oxsan check ~/vault
//!
//! # Authenticate all content and fix missing padding
//! oxsan check ~/vault --deep --solve MissingEqualsSign
//!
//! # See what would be fixed without touching the vault
//! oxsan check ~/vault --solve OrphanMFile --dry-run
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args as ClapArgs;
use tracing::{info, warn};

use oxcrypt_sanitizer::check::check_vault;
use oxcrypt_sanitizer::problem::{ProblemSink, SOLVABLE_PROBLEMS};
use oxcrypt_sanitizer::solution::{WriterSolutionContext, solve};
use oxcrypt_sanitizer::vault::{load_cryptor, write_structure};
use oxcrypt_sanitizer::{CheckOptions, ProblemSet, SolveOptions};

use crate::auth::{PasswordOptions, get_passphrase};
use crate::output::severity_table;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Authenticate every content chunk, not only file headers
    #[arg(long)]
    pub deep: bool,

    /// Solve problems of this kind after checking (repeatable)
    #[arg(long = "solve", value_name = "PROBLEM", value_parser = parse_solvable)]
    pub solve: Vec<String>,

    /// Report what would be solved without modifying the vault
    #[arg(long, requires = "solve")]
    pub dry_run: bool,

    /// Prefix of the report files [default: name of the vault directory]
    #[arg(short, long, value_name = "PREFIX")]
    pub output_prefix: Option<PathBuf>,
}

fn parse_solvable(name: &str) -> Result<String, String> {
    if SOLVABLE_PROBLEMS.contains(&name) {
        Ok(name.to_string())
    } else {
        Err(format!("not solvable, expected one of: {}", SOLVABLE_PROBLEMS.join(", ")))
    }
}

/// The two report files of one run.
struct ReportFiles {
    structure: PathBuf,
    check: PathBuf,
}

impl ReportFiles {
    fn new(vault: &Path, prefix: Option<&Path>) -> Self {
        let prefix = prefix.map_or_else(|| default_prefix(vault), |p| p.as_os_str().to_os_string());
        let with_suffix = |suffix: &str| {
            let mut name = prefix.clone();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            structure: with_suffix(".structure.txt"),
            check: with_suffix(".check.txt"),
        }
    }

    fn ensure_absent(&self) -> Result<()> {
        for path in [&self.structure, &self.check] {
            if path.exists() {
                bail!(
                    "Output file {} exists, remove it or pass another --output-prefix",
                    path.display()
                );
            }
        }
        Ok(())
    }
}

fn default_prefix(vault: &Path) -> std::ffi::OsString {
    vault
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(ToOwned::to_owned))
        .unwrap_or_else(|| "vault".into())
}

pub fn execute(vault: &Path, args: &Args, password_opts: &PasswordOptions) -> Result<()> {
    let reports = ReportFiles::new(vault, args.output_prefix.as_deref());
    reports.ensure_absent()?;

    println!("Scanning vault structure may take some time. Be patient...");
    let nodes = write_structure_file(vault, &reports.structure)?;
    println!("Wrote structure to {}.", reports.structure.display());
    println!("{nodes} files in vault");

    let passphrase = get_passphrase(password_opts)?;
    let mut sink = ProblemSink::new(vault);
    let cryptor = load_cryptor(&mut sink, vault, &passphrase)?;

    println!("Checking the vault may take some time. Be patient...");
    let options = CheckOptions { deep: args.deep };
    if let Some(cryptor) = &cryptor {
        check_vault(cryptor, vault, options, &mut sink)?;
    }
    let problems = sink.into_set();
    write_check_file(&problems, &reports.check)?;
    info!(problems = problems.len(), "Check finished");

    println!("Found {} problem(s):", problems.len());
    println!("{}", severity_table(&problems));
    println!("See {} for details.", reports.check.display());

    if args.solve.is_empty() {
        return Ok(());
    }
    let Some(cryptor) = cryptor else {
        warn!("Vault could not be unlocked, nothing to solve");
        return Ok(());
    };

    let options = SolveOptions {
        problems: args.solve.clone(),
        dry_run: args.dry_run,
    };
    println!("Solving problems. This may take some time. Be patient...");
    let mut ctx = WriterSolutionContext::new(io::stdout().lock(), vault, &cryptor, options.dry_run);
    let summary = solve(&problems, &options.problems, &mut ctx);
    drop(ctx);
    if summary.failed > 0 {
        warn!(failed = summary.failed, "Some problems could not be solved");
    }
    println!("Done.");
    Ok(())
}

fn write_structure_file(vault: &Path, path: &Path) -> Result<usize> {
    let file = File::create_new(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    let nodes = write_structure(vault, &mut out)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    out.flush()?;
    Ok(nodes)
}

fn write_check_file(problems: &ProblemSet, path: &Path) -> Result<()> {
    let file = File::create_new(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "{} problem(s) found.", problems.len())?;
    for line in problems.report_lines() {
        writeln!(out, "{line}")?;
    }
    out.flush()
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_solvable() {
        assert_eq!(parse_solvable("OrphanMFile").unwrap(), "OrphanMFile");
        assert!(parse_solvable("Conflict").unwrap_err().contains("MissingEqualsSign"));
    }

    #[test]
    fn test_report_file_names() {
        let reports = ReportFiles::new(Path::new("vault"), Some(Path::new("/tmp/run1")));
        assert_eq!(reports.structure, PathBuf::from("/tmp/run1.structure.txt"));
        assert_eq!(reports.check, PathBuf::from("/tmp/run1.check.txt"));
    }

    #[test]
    fn test_default_prefix_is_vault_name() {
        let temp = tempfile::TempDir::new().unwrap();
        let vault = temp.path().join("MyVault");
        std::fs::create_dir(&vault).unwrap();
        assert_eq!(default_prefix(&vault), "MyVault");
    }
}

//! Checks that follow references between nodes: directory-id files to
//! containers, stubs to m-files and back.

use std::fs;
use std::path::{Component, Path};

use crate::problem::ProblemSink;
use crate::vault::path::container_path_for_hash;
use crate::vault::{DATA_DIR, m_file_path};

use super::node::file_name;
use super::{Check, CheckContext, CheckError};

/// Hashed id of the directory whose container holds `path`.
pub(crate) fn hashed_id_of_parent(path: &Path) -> String {
    let parent = path.parent();
    let grandparent = parent.and_then(Path::parent);
    let mut hashed = grandparent.map(file_name).unwrap_or_default();
    hashed.push_str(&parent.map(file_name).unwrap_or_default());
    hashed.to_uppercase()
}

pub(super) fn referenced_directory_exists(
    ctx: &CheckContext<'_>,
    problems: &mut ProblemSink,
    dir_file: &Path,
) -> Result<(), CheckError> {
    let bytes = fs::read(dir_file).map_err(CheckError::io(dir_file))?;
    let directory_id = String::from_utf8_lossy(&bytes);
    let hashed = ctx.cryptor.hash_directory_id(&directory_id)?;
    let directory = container_path_for_hash(&ctx.vault_root, &hashed);
    if !directory.is_dir() {
        problems.report_missing_directory(&directory, dir_file, directory.exists());
    }
    Ok(())
}

/// Some directory-id file in the vault must name this container.
pub(super) fn has_corresponding_directory_file(
    ctx: &mut CheckContext<'_>,
    problems: &mut ProblemSink,
    container: &Path,
) -> Result<(), CheckError> {
    let relative = container
        .strip_prefix(ctx.vault_root.join(DATA_DIR))
        .unwrap_or(container);
    let hashed: String = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy()),
            _ => None,
        })
        .collect::<String>()
        .to_uppercase();
    if !ctx.indexes.directories(ctx.cryptor)?.contains(&hashed) {
        problems.report_orphan_directory(container);
    }
    Ok(())
}

pub(super) fn root_directory_if_matching(
    ctx: &CheckContext<'_>,
    problems: &mut ProblemSink,
    container: &Path,
) -> Result<(), CheckError> {
    let root_hash = ctx.cryptor.hash_directory_id("")?;
    let mut hashed = container.parent().map(file_name).unwrap_or_default();
    hashed.push_str(&file_name(container));
    if hashed == root_hash {
        problems.report_root_exists(container);
    }
    Ok(())
}

/// The m-file of a stub lives at `m/<name[0..2]>/<name[2..4]>/<name>`.
pub(super) fn has_corresponding_m_file(
    ctx: &mut CheckContext<'_>,
    problems: &mut ProblemSink,
    stub: &Path,
    m_file_check: Option<&Check>,
) -> Result<(), CheckError> {
    let m_file = m_file_path(&ctx.vault_root, &file_name(stub));
    if m_file.exists() {
        if let Some(check) = m_file_check {
            check.check(ctx, problems, &m_file)?;
        }
    } else {
        problems.report_missing_m_file(stub, &m_file);
    }
    Ok(())
}

pub(super) fn has_corresponding_d_file(
    ctx: &mut CheckContext<'_>,
    problems: &mut ProblemSink,
    m_file: &Path,
) -> Result<(), CheckError> {
    if !ctx.indexes.long_names()?.contains(&file_name(m_file)) {
        problems.report_orphan_m_file(m_file);
    }
    Ok(())
}

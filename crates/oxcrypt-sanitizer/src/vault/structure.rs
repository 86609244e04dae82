//! Listing of a vault's ciphertext tree for support reports.
//!
//! Sizes are rounded so the listing reveals the layout without exact file
//! lengths.

use std::io::{self, Write};
use std::path::Path;

use tracing::instrument;
use walkdir::WalkDir;

const KIBI: u64 = 1024;
const KIBI_POWERS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// `N B` below one KiB, otherwise `~N <unit>` rounded down.
pub fn obfuscate_size(mut size: u64) -> String {
    let mut power = 0;
    while power < 8 && size > KIBI {
        size /= KIBI;
        power += 1;
    }
    if power == 0 {
        format!("{size} {}", KIBI_POWERS[power])
    } else {
        format!("~{size} {}", KIBI_POWERS[power])
    }
}

/// Write one line per node below `vault_root`: `d <path>`, `f <path> <size>`
/// or `? <path>`. Returns the number of lines written.
#[instrument(level = "info", skip(out), fields(vault = %vault_root.display()))]
pub fn write_structure(vault_root: &Path, out: &mut dyn Write) -> io::Result<usize> {
    let mut count = 0;
    for entry in WalkDir::new(vault_root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(vault_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let file_type = entry.file_type();
        if file_type.is_dir() {
            writeln!(out, "d {relative}")?;
        } else if file_type.is_file() {
            let size = entry.metadata().map_err(io::Error::from)?.len();
            writeln!(out, "f {relative} {}", obfuscate_size(size))?;
        } else {
            writeln!(out, "? {relative}")?;
        }
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_obfuscate_size() {
        assert_eq!(obfuscate_size(0), "0 B");
        assert_eq!(obfuscate_size(1024), "1024 B");
        assert_eq!(obfuscate_size(1025), "~1 KiB");
        assert_eq!(obfuscate_size(5 * 1024 * 1024 + 3), "~5 MiB");
    }

    #[test]
    fn test_structure_listing() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("d/AB")).unwrap();
        fs::write(temp.path().join("d/AB/file"), vec![0u8; 2048]).unwrap();
        fs::write(temp.path().join("masterkey.cryptomator"), b"{}").unwrap();

        let mut out = Vec::new();
        let count = write_structure(temp.path(), &mut out).unwrap();
        assert_eq!(count, 4);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "d d\nd d/AB\nf d/AB/file ~2 KiB\nf masterkey.cryptomator 2 B\n"
        );
    }
}

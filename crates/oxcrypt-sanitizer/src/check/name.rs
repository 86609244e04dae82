//! Name decryption and normalization checks.

use std::fs;
use std::path::{Path, PathBuf};

use unicode_normalization::is_nfc;

use crate::grammar::decryptable_part;
use crate::problem::ProblemSink;

use super::node::file_name;
use super::reference::hashed_id_of_parent;
use super::{CheckContext, CheckError};

const DECRYPTABLE_PART: &str = "name with decryptable part";
const DECRYPTABLE_NAME: &str = "a decryptable name";

/// Result of decrypting one ciphertext name.
enum Decryption {
    Normalized,
    NotNormalized,
    Failed,
}

fn decrypt(ctx: &CheckContext<'_>, ciphertext: &str, directory_id: &str) -> Decryption {
    match ctx.cryptor.decrypt_filename(ciphertext, directory_id) {
        Ok(name) if is_nfc(&name) => Decryption::Normalized,
        Ok(_) => Decryption::NotNormalized,
        Err(_) => Decryption::Failed,
    }
}

/// Cleartext id of the directory holding `node`, if any directory-id file
/// names it.
fn directory_id_of(ctx: &mut CheckContext<'_>, node: &Path) -> Result<Option<String>, CheckError> {
    let hashed = hashed_id_of_parent(node);
    let index = ctx.indexes.directories(ctx.cryptor)?;
    Ok(index.cleartext_id(&hashed).map(str::to_owned))
}

/// The name of a node in a container decrypts under its directory's id.
///
/// Nodes in containers nothing references are skipped; the container itself
/// is reported as an orphan.
pub(super) fn decrypted_name(
    ctx: &mut CheckContext<'_>,
    problems: &mut ProblemSink,
    path: &Path,
) -> Result<(), CheckError> {
    let Some(ciphertext) = decryptable_part(&file_name(path)) else {
        problems.report_name_problem(DECRYPTABLE_PART, path);
        return Ok(());
    };
    let Some(directory_id) = directory_id_of(ctx, path)? else {
        return Ok(());
    };
    match decrypt(ctx, &ciphertext, &directory_id) {
        Decryption::Normalized => {}
        Decryption::NotNormalized => problems.report_name_normalization(path, directory_id, None),
        Decryption::Failed => problems.report_name_problem(DECRYPTABLE_NAME, path),
    }
    Ok(())
}

/// The full name stored in an m-file decrypts under the id of the directory
/// holding its stub. Failures are content problems of the m-file.
pub(super) fn decrypted_long_name(
    ctx: &mut CheckContext<'_>,
    problems: &mut ProblemSink,
    m_file: &Path,
) -> Result<(), CheckError> {
    let bytes = fs::read(m_file).map_err(CheckError::io(m_file))?;
    let Some(ciphertext) = decryptable_part(&String::from_utf8_lossy(&bytes)) else {
        problems.report_content_mismatch(m_file, DECRYPTABLE_PART, "");
        return Ok(());
    };
    let stub: Option<PathBuf> = ctx
        .indexes
        .long_names()?
        .stub_for_m_file(&file_name(m_file))
        .map(Path::to_path_buf);
    let Some(stub) = stub else {
        return Ok(());
    };
    let Some(directory_id) = directory_id_of(ctx, &stub)? else {
        return Ok(());
    };
    match decrypt(ctx, &ciphertext, &directory_id) {
        Decryption::Normalized => {}
        Decryption::NotNormalized => {
            problems.report_name_normalization(&stub, directory_id, Some(m_file));
        }
        Decryption::Failed => problems.report_content_mismatch(m_file, DECRYPTABLE_NAME, ""),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckOptions;
    use crate::crypto::{Cryptor, CtrMacCryptor, MasterKey};
    use crate::problem::Problem;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        cryptor: CtrMacCryptor,
        root_container: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let cryptor = CtrMacCryptor::new(MasterKey::random());
            let hash = cryptor.hash_directory_id("").unwrap();
            let root_container = temp.path().join("d").join(&hash[..2]).join(&hash[2..]);
            fs::create_dir_all(&root_container).unwrap();
            Self {
                temp,
                cryptor,
                root_container,
            }
        }

        fn check_name(&self, name: &str) -> Vec<Problem> {
            let path = self.root_container.join(name);
            fs::write(&path, b"").unwrap();
            let mut ctx = CheckContext::new(&self.cryptor, self.temp.path(), CheckOptions::default());
            let mut problems = ProblemSink::new(self.temp.path());
            decrypted_name(&mut ctx, &mut problems, &path).unwrap();
            problems.into_set().iter().cloned().collect()
        }
    }

    #[test]
    fn test_decryptable_name() {
        let fixture = Fixture::new();
        let name = fixture.cryptor.encrypt_filename("report.txt", "").unwrap();
        assert!(fixture.check_name(&name).is_empty());
    }

    #[test]
    fn test_conflict_suffix_is_ignored() {
        let fixture = Fixture::new();
        let name = fixture.cryptor.encrypt_filename("report.txt", "").unwrap();
        assert!(fixture.check_name(&format!("{name} (1)")).is_empty());
    }

    #[test]
    fn test_name_of_wrong_directory() {
        let fixture = Fixture::new();
        let name = fixture.cryptor.encrypt_filename("report.txt", "elsewhere").unwrap();
        let problems = fixture.check_name(&name);
        assert!(matches!(
            problems.as_slice(),
            [Problem::Name { expected, .. }] if expected == DECRYPTABLE_NAME
        ));
    }

    #[test]
    fn test_decomposed_name_needs_normalization() {
        let fixture = Fixture::new();
        let name = fixture.cryptor.encrypt_filename("cafe\u{301}.txt", "").unwrap();
        let problems = fixture.check_name(&name);
        assert!(matches!(
            problems.as_slice(),
            [Problem::NameNormalization { node }] if node.directory_id.is_empty() && node.m_file.is_none()
        ));
    }

    #[test]
    fn test_name_without_decryptable_part() {
        let fixture = Fixture::new();
        let problems = fixture.check_name("SHORT");
        assert!(matches!(
            problems.as_slice(),
            [Problem::Name { expected, .. }] if expected == DECRYPTABLE_PART
        ));
    }
}

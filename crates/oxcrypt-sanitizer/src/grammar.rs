//! Naming grammar of ciphertext nodes.
//!
//! Every node in a format 6 vault is classified by its name alone: shard and
//! container directories, directory-id files (`0` prefix), regular files,
//! shortened `.lng` stubs and their conflict variants. Matching is
//! case-insensitive so that wrongly cased names are still recognized and can be
//! reported as such.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::fs::name::{DIR_PREFIX, LONG_NAME_SUFFIX};

/// Maximum size of an m-file before its content is rejected unread.
pub const MAX_NAME_LENGTH: u64 = 10_000;

/// Size of a directory-id file: one hyphenated UUID.
pub const DIRECTORY_ID_FILE_SIZE: u64 = 36;

const SHARD_DIR: &str = "[A-Z2-7]{2}";
const CONTAINER_DIR: &str = "[A-Z2-7]{30}";
const DIRECTORY_ID_FILE: &str = "0([A-Z2-7]{8})*[A-Z2-7=]{8}";
const REGULAR_FILE: &str = "([A-Z2-7]{8})*[A-Z2-7=]{8}";
const LONG_NAME_STUB: &str = r"[A-Z2-7]{32}\.lng";
const DIRECTORY_ID_MISSING_PADDING: &str = "0([A-Z2-7]{8})*[A-Z2-7=]{1,7}";
const REGULAR_MISSING_PADDING: &str = "([A-Z2-7]{8})*[A-Z2-7=]{1,7}";
const DIRECTORY_ID_CONFLICT: &str = "0([A-Z2-7]{8})*[A-Z2-7=]{8}.+";
const REGULAR_CONFLICT: &str = "([A-Z2-7]{8})*[A-Z2-7=]{8}.+";
const LONG_NAME_CONFLICT: &str = r"[A-Z2-7]{32}.+\.lng";

fn full_match(pattern: &str, case_insensitive: bool) -> Regex {
    RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(case_insensitive)
        .build()
        .expect("name grammar pattern is valid")
}

static SHARD_DIR_RE: LazyLock<Regex> = LazyLock::new(|| full_match(SHARD_DIR, true));
static CONTAINER_DIR_RE: LazyLock<Regex> = LazyLock::new(|| full_match(CONTAINER_DIR, true));
static DIRECTORY_ID_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match(DIRECTORY_ID_FILE, true));
static REGULAR_FILE_RE: LazyLock<Regex> = LazyLock::new(|| full_match(REGULAR_FILE, true));
static LONG_NAME_STUB_RE: LazyLock<Regex> = LazyLock::new(|| full_match(LONG_NAME_STUB, true));
static DIRECTORY_ID_MISSING_PADDING_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match(DIRECTORY_ID_MISSING_PADDING, true));
static REGULAR_MISSING_PADDING_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match(REGULAR_MISSING_PADDING, true));
static DIRECTORY_ID_CONFLICT_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match(DIRECTORY_ID_CONFLICT, true));
static REGULAR_CONFLICT_RE: LazyLock<Regex> = LazyLock::new(|| full_match(REGULAR_CONFLICT, true));
static LONG_NAME_CONFLICT_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match(LONG_NAME_CONFLICT, true));

/// Longest leading run that is itself a decryptable base32 name.
static DECRYPTABLE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new("^(([A-Z2-7]{8}){3,}[A-Z2-7=]{1,8}).*$")
        .case_insensitive(true)
        .build()
        .expect("decryptable prefix pattern is valid")
});

/// Stubs collected into the long-name index must be cased exactly.
static EXACT_LONG_NAME_STUB_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match(LONG_NAME_STUB, false));

/// Nodes whose content may name a directory: directory-id files (padding
/// optional) and shortened stubs.
static DIRECTORY_REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    full_match(
        r"(0([A-Z2-7]{8})*[A-Z2-7=]{1,8})|([A-Z2-7]{32}\.lng)",
        true,
    )
});

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    full_match(
        "[A-F0-9]{8}-[A-F0-9]{4}-[A-F0-9]{4}-[A-F0-9]{4}-[A-F0-9]{12}",
        true,
    )
});

static VALID_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match("0?([A-Z2-7]{8}){2,}[A-Z2-7=]{8}", false));
static VALID_FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match("([A-Z2-7]{8}){2,}[A-Z2-7=]{8}", false));
static VALID_DIRECTORY_FILE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match("0([A-Z2-7]{8}){2,}[A-Z2-7=]{8}", false));

// Classification of paths relative to `d/`, matched against the uppercased path.
static DATA_CONTAINER_RE: LazyLock<Regex> =
    LazyLock::new(|| full_match("[2-7A-Z]{2}/[2-7A-Z]{30}", false));
static DATA_LONG_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[2-7A-Z]{2}/[2-7A-Z]{30}/([2-7A-Z]{32})(.*)\.LNG")
        .expect("long name path pattern is valid")
});
static DATA_DIRECTORY_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[2-7A-Z]{2}/[2-7A-Z]{30}/0((?:[2-7A-Z]{8})*[2-7A-Z=]{8})")
        .expect("directory file path pattern is valid")
});
static DATA_REGULAR_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[2-7A-Z]{2}/[2-7A-Z]{30}/((?:[2-7A-Z]{8})*[2-7A-Z=]{8})")
        .expect("regular file path pattern is valid")
});

/// Name patterns a rule can require of a node.
///
/// The declaration order of the rules using these patterns is significant:
/// a conflict copy of a shortened stub also matches [`NodePattern::RegularConflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePattern {
    /// Fixed name, compared case-insensitively.
    Exact(&'static str),
    ShardDir,
    ContainerDir,
    DirectoryIdFile,
    RegularFile,
    LongNameStub,
    DirectoryIdMissingPadding,
    RegularMissingPadding,
    DirectoryIdConflict,
    RegularConflict,
    LongNameConflict,
}

impl NodePattern {
    pub fn matches(self, name: &str) -> bool {
        match self {
            NodePattern::Exact(expected) => name.eq_ignore_ascii_case(expected),
            other => other.regex().is_some_and(|re| re.is_match(name)),
        }
    }

    /// Source pattern, used in name problem reports.
    pub fn source(self) -> &'static str {
        match self {
            NodePattern::Exact(name) => name,
            NodePattern::ShardDir => SHARD_DIR,
            NodePattern::ContainerDir => CONTAINER_DIR,
            NodePattern::DirectoryIdFile => DIRECTORY_ID_FILE,
            NodePattern::RegularFile => REGULAR_FILE,
            NodePattern::LongNameStub => LONG_NAME_STUB,
            NodePattern::DirectoryIdMissingPadding => DIRECTORY_ID_MISSING_PADDING,
            NodePattern::RegularMissingPadding => REGULAR_MISSING_PADDING,
            NodePattern::DirectoryIdConflict => DIRECTORY_ID_CONFLICT,
            NodePattern::RegularConflict => REGULAR_CONFLICT,
            NodePattern::LongNameConflict => LONG_NAME_CONFLICT,
        }
    }

    fn regex(self) -> Option<&'static Regex> {
        let regex: &'static Regex = match self {
            NodePattern::Exact(_) => return None,
            NodePattern::ShardDir => &SHARD_DIR_RE,
            NodePattern::ContainerDir => &CONTAINER_DIR_RE,
            NodePattern::DirectoryIdFile => &DIRECTORY_ID_FILE_RE,
            NodePattern::RegularFile => &REGULAR_FILE_RE,
            NodePattern::LongNameStub => &LONG_NAME_STUB_RE,
            NodePattern::DirectoryIdMissingPadding => &DIRECTORY_ID_MISSING_PADDING_RE,
            NodePattern::RegularMissingPadding => &REGULAR_MISSING_PADDING_RE,
            NodePattern::DirectoryIdConflict => &DIRECTORY_ID_CONFLICT_RE,
            NodePattern::RegularConflict => &REGULAR_CONFLICT_RE,
            NodePattern::LongNameConflict => &LONG_NAME_CONFLICT_RE,
        };
        Some(regex)
    }
}

/// Expected shape of the ciphertext name stored in an m-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameShape {
    /// A file or a directory-id file name.
    Any,
    File,
    DirectoryFile,
}

impl NameShape {
    /// Full, case-sensitive match of an m-file's content.
    pub fn matches(self, content: &str) -> bool {
        match self {
            NameShape::Any => VALID_NAME_RE.is_match(content),
            NameShape::File => VALID_FILE_NAME_RE.is_match(content),
            NameShape::DirectoryFile => VALID_DIRECTORY_FILE_NAME_RE.is_match(content),
        }
    }
}

/// Byte range of the raw ciphertext payload inside `name`.
///
/// A trailing `.lng` and one leading `0` are skipped; anything after the
/// payload (a conflict suffix, for instance) is not part of the range. The
/// payload keeps its original casing and padding.
pub fn ciphertext_core(name: &str) -> Option<Range<usize>> {
    let stripped = name.strip_suffix(LONG_NAME_SUFFIX).unwrap_or(name);
    let start = if stripped.starts_with(DIR_PREFIX) { DIR_PREFIX.len() } else { 0 };
    let captures = DECRYPTABLE_PREFIX_RE.captures(&stripped[start..])?;
    let payload = captures.get(1)?;
    Some(start + payload.start()..start + payload.end())
}

/// The part of `name` that can be handed to filename decryption.
///
/// Missing `=` padding is restored and the result is uppercased.
///
/// ```
/// use oxcrypt_sanitizer::grammar::decryptable_part;
///
/// let name = "0abcdefghijklmnopqrstuvwxyz234 (1)";
/// assert_eq!(decryptable_part(name).as_deref(), Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ234==="));
/// assert_eq!(decryptable_part("short"), None);
/// ```
pub fn decryptable_part(name: &str) -> Option<String> {
    let core = &name[ciphertext_core(name)?];
    let mut part = core.to_ascii_uppercase();
    part.push_str(&"=".repeat(missing_padding(core)));
    Some(part)
}

/// Number of `=` needed to complete the last base32 group of `name`.
///
/// A leading directory prefix does not count towards the group length.
pub fn missing_padding(name: &str) -> usize {
    let len = if name.starts_with(DIR_PREFIX) { name.len() - 1 } else { name.len() };
    (8 - len % 8) % 8
}

pub fn is_uuid(candidate: &str) -> bool {
    UUID_RE.is_match(candidate)
}

/// Exactly cased `<32 base32>.lng` stub name.
pub fn is_exact_long_name_stub(name: &str) -> bool {
    EXACT_LONG_NAME_STUB_RE.is_match(name)
}

/// Whether a node in a container may hold a directory id.
pub fn may_reference_directory(name: &str) -> bool {
    DIRECTORY_REFERENCE_RE.is_match(name)
}

/// Encrypted name and trailing suffix extracted from a path under `d/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataName<'a> {
    /// Uppercased ciphertext payload (or stub hash for shortened names).
    pub name: String,
    /// Whatever follows the payload, in its original casing.
    pub suffix: &'a str,
}

/// `XX/YYYYYY…` container path under `d/`; returns the directory-id hash.
pub fn match_container(relative: &str) -> Option<String> {
    let upper = relative.to_ascii_uppercase();
    DATA_CONTAINER_RE
        .is_match(&upper)
        .then(|| upper.replace('/', ""))
}

/// Shortened stub `XX/Y…/<hash><suffix>.lng`.
pub fn match_long_name(relative: &str) -> Option<DataName<'_>> {
    let upper = relative.to_ascii_uppercase();
    let captures = DATA_LONG_NAME_RE.captures(&upper)?;
    let hash = captures.get(1)?;
    let suffix = captures.get(2)?;
    Some(DataName {
        name: hash.as_str().to_string(),
        suffix: &relative[suffix.range()],
    })
}

/// Directory-id file `XX/Y…/0<name><suffix>`; the `0` is not part of `name`.
pub fn match_directory_file(relative: &str) -> Option<DataName<'_>> {
    match_data_name(&DATA_DIRECTORY_FILE_RE, relative)
}

/// Regular file `XX/Y…/<name><suffix>`.
pub fn match_regular_file(relative: &str) -> Option<DataName<'_>> {
    match_data_name(&DATA_REGULAR_FILE_RE, relative)
}

fn match_data_name<'a>(pattern: &Regex, relative: &'a str) -> Option<DataName<'a>> {
    let upper = relative.to_ascii_uppercase();
    let captures = pattern.captures(&upper)?;
    let name = captures.get(1)?;
    let end = captures.get(0)?.end();
    Some(DataName {
        name: name.as_str().to_string(),
        suffix: &relative[end..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NAME: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    #[test]
    fn test_node_patterns_are_case_insensitive() {
        assert!(NodePattern::RegularFile.matches(NAME));
        assert!(NodePattern::RegularFile.matches(&NAME.to_lowercase()));
        assert!(NodePattern::DirectoryIdFile.matches(&format!("0{NAME}")));
        assert!(!NodePattern::RegularFile.matches(&format!("0{NAME}")));
        assert!(NodePattern::Exact("d").matches("D"));
        assert!(!NodePattern::Exact("d").matches("dd"));
    }

    #[test]
    fn test_conflict_is_not_a_regular_name() {
        let conflict = format!("{NAME} (Conflict 1)");
        assert!(!NodePattern::RegularFile.matches(&conflict));
        assert!(NodePattern::RegularConflict.matches(&conflict));

        let stub_conflict = format!("{NAME} (1).lng");
        assert!(!NodePattern::LongNameStub.matches(&stub_conflict));
        assert!(NodePattern::LongNameConflict.matches(&stub_conflict));
        // declared later than regular conflicts, so never reached inside `d/`
        assert!(NodePattern::RegularConflict.matches(&stub_conflict));
    }

    #[test]
    fn test_missing_padding_patterns() {
        let truncated = "ABCDEFGHIJKLMNOPQRSTUVWXYZ23====";
        assert!(NodePattern::RegularFile.matches(truncated));
        let truncated = &truncated[..30];
        assert!(NodePattern::RegularMissingPadding.matches(truncated));
        assert!(!NodePattern::RegularFile.matches(truncated));
        assert!(NodePattern::DirectoryIdMissingPadding.matches(&format!("0{truncated}")));
    }

    #[test]
    fn test_decryptable_part_strips_prefix_suffix_and_pads() {
        assert_eq!(decryptable_part(NAME).as_deref(), Some(NAME));
        assert_eq!(decryptable_part(&format!("0{NAME}")).as_deref(), Some(NAME));
        assert_eq!(
            decryptable_part(&format!("{NAME}.lng")).as_deref(),
            Some(NAME)
        );
        assert_eq!(
            decryptable_part(&format!("{} (2)", &NAME[..29])).as_deref(),
            Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ234===")
        );
        assert_eq!(decryptable_part("ABCDEFGH"), None);
    }

    #[test]
    fn test_ciphertext_core_keeps_original_case() {
        let name = format!("0{} (1)", NAME.to_lowercase());
        let core = ciphertext_core(&name).unwrap();
        assert_eq!(&name[core.clone()], NAME.to_lowercase());
        assert_eq!(core.start, 1);
    }

    #[test]
    fn test_missing_padding_count() {
        assert_eq!(missing_padding(NAME), 0);
        assert_eq!(missing_padding(&NAME[..30]), 2);
        assert_eq!(missing_padding(&format!("0{}", &NAME[..31])), 1);
        assert_eq!(missing_padding(&format!("0{NAME}")), 0);
    }

    #[test]
    fn test_uuid_and_name_shapes() {
        assert!(is_uuid("9E0B1B7E-54A6-4C0D-9C3F-0A1B2C3D4E5F"));
        assert!(is_uuid("9e0b1b7e-54a6-4c0d-9c3f-0a1b2c3d4e5f"));
        assert!(!is_uuid("9e0b1b7e54a64c0d9c3f0a1b2c3d4e5f0000"));

        let long = format!("{NAME}{NAME}");
        assert!(NameShape::File.matches(&long));
        assert!(!NameShape::DirectoryFile.matches(&long));
        assert!(NameShape::DirectoryFile.matches(&format!("0{long}")));
        assert!(NameShape::Any.matches(&format!("0{long}")));
        assert!(!NameShape::Any.matches(&long.to_lowercase()));
    }

    #[test]
    fn test_directory_references() {
        assert!(may_reference_directory(&format!("0{NAME}")));
        assert!(may_reference_directory(&format!("0{}", &NAME[..29])));
        assert!(may_reference_directory(&format!("{NAME}.lng")));
        assert!(!may_reference_directory(NAME));
        assert!(is_exact_long_name_stub(&format!("{NAME}.lng")));
        assert!(!is_exact_long_name_stub(&format!("{}.lng", NAME.to_lowercase())));
    }

    #[test]
    fn test_data_path_classification() {
        let container = "AB/CDEFGHIJKLMNOPQRSTUVWXYZ234567";
        assert_eq!(
            match_container(&container.to_lowercase()).as_deref(),
            Some("ABCDEFGHIJKLMNOPQRSTUVWXYZ234567")
        );
        assert!(match_container("AB").is_none());

        let file = format!("{container}/{NAME} (1)");
        let matched = match_regular_file(&file).unwrap();
        assert_eq!(matched.name, NAME);
        assert_eq!(matched.suffix, " (1)");
        assert!(match_directory_file(&file).is_none());

        let dir_file = format!("{container}/0{NAME}");
        let matched = match_directory_file(&dir_file).unwrap();
        assert_eq!(matched.name, NAME);
        assert_eq!(matched.suffix, "");

        let stub = format!("{container}/{NAME} (copy).lng");
        let matched = match_long_name(&stub).unwrap();
        assert_eq!(matched.name, NAME);
        assert_eq!(matched.suffix, " (copy)");
    }

    proptest! {
        #[test]
        fn test_padding_completes_groups(len in 1usize..200) {
            let name = "A".repeat(len);
            prop_assert_eq!((len + missing_padding(&name)) % 8, 0);
            prop_assert!(missing_padding(&name) < 8);
        }

        #[test]
        fn test_decryptable_part_is_padded_uppercase(name in "[a-zA-Z2-7]{25,64}") {
            let part = decryptable_part(&name).unwrap();
            prop_assert_eq!(part.len() % 8, 0);
            prop_assert_eq!(part.trim_end_matches('='), name.to_ascii_uppercase());
        }
    }
}

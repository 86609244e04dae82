//! The rule tree describing a well-formed format 6 vault.

use crate::fs::file_ctrmac::HEADER_SIZE;
use crate::grammar::{DIRECTORY_ID_FILE_SIZE, NameShape, NodePattern};
use crate::vault::{DATA_DIR, MASTERKEY_BACKUP_FILE, MASTERKEY_FILE, METADATA_DIR};

use super::{Check, Rule};

fn named(pattern: NodePattern) -> Check {
    Check::HasName(pattern)
}

/// Size, UUID content and target container of a directory-id file.
fn valid_directory_reference() -> Check {
    Check::HasSize(DIRECTORY_ID_FILE_SIZE)
        .and(Check::ContainsUuid)
        .and(Check::ReferencedDirectoryExists)
}

fn valid_content() -> Check {
    Check::HasMinSize(HEADER_SIZE as u64).and(Check::Authentic)
}

/// Children of a container, in priority order. A conflict copy of a stub
/// also matches the regular conflict pattern, so that rule must come first.
fn container_children() -> Vec<Rule> {
    vec![
        Rule::file()
            .that(named(NodePattern::DirectoryIdFile))
            .validate(Check::NoLowercase)
            .validate(valid_directory_reference())
            .validate(Check::DecryptedName),
        Rule::file()
            .that(named(NodePattern::RegularFile))
            .report_as(Check::EmptyEncryptedFileIfEmpty)
            .validate(Check::NoLowercase)
            .validate(valid_content())
            .validate(Check::DecryptedName),
        Rule::file()
            .that(named(NodePattern::LongNameStub).and(Check::has_corresponding_m_file_that(
                Check::ContainsValidName(NameShape::File),
            )))
            .report_as(Check::EmptyEncryptedFileIfEmpty)
            .validate(Check::NoLowercase)
            .validate(valid_content()),
        Rule::file()
            .that(named(NodePattern::LongNameStub).and(Check::has_corresponding_m_file_that(
                Check::ContainsValidName(NameShape::DirectoryFile),
            )))
            .validate(Check::NoLowercase)
            .validate(valid_directory_reference()),
        Rule::file()
            .that(named(NodePattern::LongNameStub))
            .validate(Check::NoLowercase)
            .validate(Check::has_corresponding_m_file()),
        Rule::file()
            .that(named(NodePattern::DirectoryIdMissingPadding))
            .validate(Check::NoLowercase)
            .validate(valid_directory_reference())
            .validate(Check::DecryptedName)
            .report_as(Check::MissingEqualsSign),
        Rule::file()
            .that(named(NodePattern::RegularMissingPadding))
            .report_as(Check::EmptyEncryptedFileIfEmpty)
            .validate(Check::NoLowercase)
            .validate(valid_content())
            .validate(Check::DecryptedName)
            .report_as(Check::MissingEqualsSign),
        Rule::file()
            .that(named(NodePattern::DirectoryIdConflict))
            .validate(Check::NoLowercase)
            .validate(valid_directory_reference())
            .validate(Check::DecryptedName)
            .report_as(Check::Conflict),
        Rule::file()
            .that(named(NodePattern::RegularConflict))
            .report_as(Check::EmptyEncryptedFileIfEmpty)
            .validate(Check::NoLowercase)
            .validate(valid_content())
            .validate(Check::DecryptedName)
            .report_as(Check::Conflict),
        Rule::file()
            .that(named(NodePattern::LongNameConflict))
            .validate(Check::NoLowercase)
            .validate(Check::has_corresponding_m_file())
            .report_as(Check::Conflict),
    ]
}

fn data_dir() -> Rule {
    Rule::dir()
        .required(DATA_DIR)
        .validate(Check::NoUppercase)
        .containing(vec![
            Rule::dir()
                .that(named(NodePattern::ShardDir))
                .validate(Check::NoLowercase)
                .containing(vec![
                    Rule::dir()
                        .that(named(NodePattern::ContainerDir))
                        .validate(Check::NoLowercase)
                        .validate(Check::HasCorrespondingDirectoryFile)
                        .report_as(Check::RootDirectoryIfMatching)
                        .containing(container_children()),
                ]),
        ])
}

fn m_file_validations(rule: Rule) -> Rule {
    rule.validate(Check::NoLowercase)
        .validate(Check::HasCorrespondingDFile.and(Check::ContainsValidName(NameShape::Any)))
        .validate(Check::DecryptedLongName)
}

fn metadata_dir() -> Rule {
    Rule::dir()
        .that(named(NodePattern::Exact(METADATA_DIR)))
        .validate(Check::NoUppercase)
        .containing(vec![
            Rule::dir()
                .that(named(NodePattern::ShardDir))
                .validate(Check::NoLowercase)
                .containing(vec![
                    Rule::dir()
                        .that(named(NodePattern::ShardDir))
                        .validate(Check::NoLowercase)
                        .containing(vec![
                            m_file_validations(
                                Rule::file().that(named(NodePattern::LongNameStub)),
                            ),
                            m_file_validations(
                                Rule::file().that(named(NodePattern::LongNameConflict)),
                            )
                            .report_as(Check::Conflict),
                        ]),
                ]),
        ])
}

/// Rules for a vault root.
///
/// The masterkey is only checked for its casing: its content already
/// unlocked the cryptor the check runs with.
pub fn vault_rules() -> Rule {
    Rule::dir().containing(vec![
        data_dir(),
        metadata_dir(),
        Rule::file()
            .that(named(NodePattern::Exact(MASTERKEY_FILE)))
            .validate(Check::NoUppercase),
        Rule::file()
            .that(named(NodePattern::Exact(MASTERKEY_BACKUP_FILE)))
            .validate(Check::MasterkeyBackup),
    ])
}

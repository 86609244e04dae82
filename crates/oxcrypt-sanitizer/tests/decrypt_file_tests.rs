//! Decrypting single vault files, located through their cleartext path.

mod common;

use std::fs;
use std::path::Path;

use common::{VaultBuilder, flip_bytes};
use oxcrypt_sanitizer::fs::file::{FileContext, FileError, decrypt_file};
use oxcrypt_sanitizer::vault::CiphertextPathResolver;

fn no_answer(_: &Path) -> Option<String> {
    None
}

// =============================================================================
// FileContext Display Tests
// =============================================================================

#[test]
fn test_file_context_display_empty() {
    assert_eq!(FileContext::new().to_string(), "(no context)");
}

#[test]
fn test_file_context_display_root_directory() {
    let context = FileContext::new().with_filename("a.txt").with_dir_id("");
    assert_eq!(context.to_string(), "file 'a.txt', in directory <root>");
}

#[test]
fn test_file_context_display_truncates_long_dir_id() {
    let context = FileContext::new()
        .with_dir_id("3a8c0e2b-6f5d-4e1a-9b7c-0d1e2f3a4b5c")
        .with_chunk(4);
    assert_eq!(context.to_string(), "in directory 3a8c0e2b..., chunk 4");
}

// =============================================================================
// Resolve and decrypt
// =============================================================================

#[test]
fn test_resolved_file_decrypts() {
    let vault = VaultBuilder::new()
        .directory("docs")
        .directory("docs/2024")
        .file("docs/2024/report.txt", "quarterly numbers")
        .build();

    let mut resolver = CiphertextPathResolver::new(vault.cryptor(), vault.root(), no_answer);
    let node = resolver.resolve("/docs/2024/report.txt").unwrap();
    assert_eq!(node, vault.file_node("docs/2024/report.txt"));

    let out = vault.scratch("report.txt");
    assert_eq!(decrypt_file(vault.cryptor(), &node, &out).unwrap(), 17);
    assert_eq!(fs::read_to_string(out).unwrap(), "quarterly numbers");
}

#[test]
fn test_resolved_long_name_is_the_stub() {
    let name = "x".repeat(150);
    let vault = VaultBuilder::new().file(&name, "long").build();

    let mut resolver = CiphertextPathResolver::new(vault.cryptor(), vault.root(), no_answer);
    let node = resolver.resolve(&name).unwrap();
    assert!(node.to_string_lossy().ends_with(".lng"));
    assert_eq!(node, vault.file_node(&name));
}

#[test]
fn test_empty_file_decrypts_to_nothing() {
    let vault = VaultBuilder::new().file("empty", Vec::new()).build();
    let out = vault.scratch("empty");

    assert_eq!(decrypt_file(vault.cryptor(), &vault.file_node("empty"), &out).unwrap(), 0);
    assert!(fs::read(out).unwrap().is_empty());
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_tampered_header_is_authentication_failure() {
    let vault = VaultBuilder::new().file("a.txt", "content").build();
    let node = vault.file_node("a.txt");
    flip_bytes(&node, 20, 1);
    let out = vault.scratch("a.txt");

    let err = decrypt_file(vault.cryptor(), &node, &out).unwrap_err();
    assert!(matches!(err, FileError::Header { .. }));
    assert!(err.is_authentication_failure());
    assert!(!out.exists());
}

#[test]
fn test_tampered_chunk_names_the_chunk() {
    let vault = VaultBuilder::new().file("big.bin", vec![9u8; 70_000]).build();
    let node = vault.file_node("big.bin");
    flip_bytes(&node, 88 + 2 * 32_816 + 5, 1);
    let out = vault.scratch("big.bin");

    let err = decrypt_file(vault.cryptor(), &node, &out).unwrap_err();
    assert!(err.is_authentication_failure());
    assert!(err.to_string().contains("chunk 2"), "{err}");
    assert_eq!(fs::read(out).unwrap().len(), 2 * 32 * 1024);
}

#[test]
fn test_missing_source_is_io_error() {
    let vault = VaultBuilder::new().build();
    let err = decrypt_file(
        vault.cryptor(),
        &vault.container("").join("ABSENT"),
        &vault.scratch("out"),
    )
    .unwrap_err();
    assert!(matches!(err, FileError::Io { .. }));
    assert!(!err.is_authentication_failure());
}

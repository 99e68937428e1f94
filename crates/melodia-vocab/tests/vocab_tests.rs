//! Artifact-loading tests for melodia-vocab.

use melodia_vocab::{VocabError, Vocabulary};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_artifacts(dir: &TempDir, char2idx: &str, idx2char: &str) -> (PathBuf, PathBuf) {
    let fwd = dir.path().join("char2idx.json");
    let bwd = dir.path().join("idx2char.json");
    fs::write(&fwd, char2idx).unwrap();
    fs::write(&bwd, idx2char).unwrap();
    (fwd, bwd)
}

#[test]
fn load_consistent_artifacts() {
    let dir = TempDir::new().unwrap();
    let (fwd, bwd) = write_artifacts(
        &dir,
        r#"{"A": 0, "B": 1, "\n": 2}"#,
        r#"["A", "B", "\n"]"#,
    );

    let v = Vocabulary::load(&fwd, &bwd).unwrap();
    assert_eq!(v.len(), 3);
    assert_eq!(v.resolve('\n').unwrap(), 2);
    assert_eq!(v.unresolve(0).unwrap(), 'A');
}

#[test]
fn load_rejects_disagreeing_mappings() {
    let dir = TempDir::new().unwrap();
    // char2idx says B is 0, idx2char says index 0 is A.
    let (fwd, bwd) = write_artifacts(&dir, r#"{"A": 1, "B": 0}"#, r#"["A", "B"]"#);

    assert!(matches!(
        Vocabulary::load(&fwd, &bwd),
        Err(VocabError::Inverse(_))
    ));
}

#[test]
fn load_rejects_cardinality_mismatch() {
    let dir = TempDir::new().unwrap();
    let (fwd, bwd) = write_artifacts(&dir, r#"{"A": 0}"#, r#"["A", "B"]"#);

    assert!(matches!(
        Vocabulary::load(&fwd, &bwd),
        Err(VocabError::Inverse(_))
    ));
}

#[test]
fn load_rejects_multi_char_symbol() {
    let dir = TempDir::new().unwrap();
    let (fwd, bwd) = write_artifacts(&dir, r#"{"A": 0, "BC": 1}"#, r#"["A", "BC"]"#);

    assert!(matches!(
        Vocabulary::load(&fwd, &bwd),
        Err(VocabError::Artifact(_))
    ));
}

#[test]
fn load_missing_file_is_artifact_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");

    assert!(matches!(
        Vocabulary::load(&missing, &missing),
        Err(VocabError::Artifact(_))
    ));
}

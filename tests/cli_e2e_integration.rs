//! End-to-end CLI runs against the real binary with an isolated index.

mod common;

use assert_cmd::Command;
use common::write_file;
use predicates::prelude::*;
use std::path::Path;

fn qmd(index: &Path) -> Command {
    let mut cmd = Command::cargo_bin("qmd").unwrap();
    cmd.env("QMD_INDEX_PATH", index);
    cmd
}

#[test]
fn index_then_search() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "notes.md", "# Title\nthe quick brown fox");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexed 1 new"));

    qmd(&index)
        .args(["search", "quick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("qmd://repo/notes.md"));
}

#[test]
fn search_json_format() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "notes.md", "# Title\nsearchable content");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["search", "searchable", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"file\": \"qmd://repo/notes.md\""))
        .stdout(predicate::str::contains("\"source\": \"fts\""));
}

#[test]
fn search_no_results() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "a.md", "# A\nhello");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["search", "zzzznotfound"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results found."));
}

#[test]
fn status_reports_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "a.md", "# A");
    write_file(&repo, "b.md", "# B");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Active documents:  2"));
}

#[test]
fn get_document_by_virtual_path() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "guide.md", "# Guide\nline two\nline three");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["get", "qmd://repo/guide.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Guide"))
        .stdout(predicate::str::contains("line three"));
}

#[test]
fn get_missing_document_suggests_similar() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "docs/setup-guide.md", "# Setup");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["get", "qmd://repo/setup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"))
        .stderr(predicate::str::contains("qmd://repo/docs/setup-guide.md"));
}

#[test]
fn ls_lists_collections_and_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "a.md", "# A");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("qmd://repo/"));

    qmd(&index)
        .args(["ls", "qmd://repo/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("qmd://repo/a.md"));
}

#[test]
fn collection_rename_and_duplicate_rejection() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo_a = tmp.path().join("alpha");
    let repo_b = tmp.path().join("beta");
    write_file(&repo_a, "a.md", "# A");
    write_file(&repo_b, "b.md", "# B");

    qmd(&index)
        .args(["index", repo_a.to_str().unwrap()])
        .assert()
        .success();
    qmd(&index)
        .args(["index", repo_b.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["collection", "rename", "alpha", "gamma"])
        .assert()
        .success();

    // Renaming onto an existing name fails without mutating anything
    qmd(&index)
        .args(["collection", "rename", "beta", "gamma"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    qmd(&index)
        .args(["collection", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gamma"))
        .stdout(predicate::str::contains("beta"));
}

#[test]
fn context_add_and_list() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "docs/a.md", "# A");

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["context", "add", "qmd://repo/docs", "API documentation"])
        .assert()
        .success();

    qmd(&index)
        .args(["context", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("qmd://repo/docs"))
        .stdout(predicate::str::contains("API documentation"));
}

#[test]
fn multi_get_respects_byte_cap() {
    let tmp = tempfile::tempdir().unwrap();
    let index = tmp.path().join("index.db");
    let repo = tmp.path().join("repo");
    write_file(&repo, "small.md", "# Small\nshort");
    write_file(&repo, "big.md", &format!("# Big\n{}", "x".repeat(5000)));

    qmd(&index)
        .args(["index", repo.to_str().unwrap()])
        .assert()
        .success();

    qmd(&index)
        .args(["multi-get", "qmd://repo/*.md", "--max-bytes", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("==> qmd://repo/small.md <=="))
        .stdout(predicate::str::contains("skipped qmd://repo/big.md"));
}

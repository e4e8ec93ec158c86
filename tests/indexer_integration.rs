//! End-to-end indexing scenarios against a real filesystem tree.

mod common;

use common::write_file;
use qmd::config::Config;
use qmd::index::{GlobWalker, Indexer};
use qmd::llm::MockProvider;
use qmd::search::{SearchEngine, SearchOptions};
use qmd::store::Store;

fn index_dir(store: &Store, dir: &std::path::Path) -> qmd::index::IndexResult {
    let walker = GlobWalker;
    let indexer = Indexer::new(store, &walker, Config::default().exclude_dirs);
    indexer.index_files(dir, "**/*.md", None).unwrap()
}

#[test]
fn create_and_search_fts() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    write_file(&repo, "notes.md", "# Title\nthe quick brown fox");

    let store = Store::open_in_memory().unwrap();
    let result = index_dir(&store, &repo);
    assert_eq!(result.indexed, 1);

    let config = Config::default();
    let mock = MockProvider::new(8);
    let engine = SearchEngine::new(&store, &mock, &config);
    let hits = engine
        .search_fts("quick", &SearchOptions::default())
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].file, "qmd://repo/notes.md");
    assert_eq!(hits[0].title, "Title");
    assert!(hits[0].score > 0.0);
}

#[test]
fn identical_files_share_one_content_row() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    write_file(&repo, "a.md", "# Same\nidentical bytes");
    write_file(&repo, "b.md", "# Same\nidentical bytes");

    let store = Store::open_in_memory().unwrap();
    let result = index_dir(&store, &repo);
    assert_eq!(result.indexed, 2);
    assert_eq!(result.orphaned_content, 0);

    let (content_rows, doc_rows): (i64, i64) = store
        .conn()
        .query_row(
            "SELECT (SELECT COUNT(*) FROM content), (SELECT COUNT(*) FROM documents)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(content_rows, 1);
    assert_eq!(doc_rows, 2);

    assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 0);
}

#[test]
fn removed_file_deactivates_then_content_is_cleaned() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    write_file(&repo, "x.md", "# X\ndoomed");

    let store = Store::open_in_memory().unwrap();
    index_dir(&store, &repo);

    std::fs::remove_file(repo.join("x.md")).unwrap();
    let result = index_dir(&store, &repo);
    assert_eq!(result.removed, 1);
    assert_eq!(result.orphaned_content, 1);

    let collection = store
        .collections()
        .list()
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    let doc = store
        .documents()
        .get_by_path(collection.id, "x.md")
        .unwrap()
        .unwrap();
    assert!(!doc.active);

    let content_rows: i64 = store
        .conn()
        .query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))
        .unwrap();
    assert_eq!(content_rows, 0);
}

#[test]
fn reindexing_same_tree_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    write_file(&repo, "one.md", "# One\nalpha");
    write_file(&repo, "sub/two.md", "# Two\nbeta");

    let store = Store::open_in_memory().unwrap();
    index_dir(&store, &repo);
    let again = index_dir(&store, &repo);

    assert_eq!(again.indexed, 0);
    assert_eq!(again.updated, 0);
    assert_eq!(again.unchanged, 2);
    assert_eq!(again.removed, 0);
    assert_eq!(again.orphaned_content, 0);
}

#[test]
fn collection_keyed_by_pwd_and_glob() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    write_file(&repo, "a.md", "# A");
    write_file(&repo, "b.txt", "not markdown");

    let store = Store::open_in_memory().unwrap();
    let walker = GlobWalker;
    let indexer = Indexer::new(&store, &walker, Config::default().exclude_dirs);

    indexer.index_files(&repo, "**/*.md", None).unwrap();
    indexer.index_files(&repo, "**/*.txt", None).unwrap();

    // Same pwd, different glob: two distinct collections, names
    // disambiguated with the -N suffix
    let collections = store.collections().list().unwrap();
    assert_eq!(collections.len(), 2);
    let names: Vec<&str> = collections.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"repo"));
    assert!(names.contains(&"repo-2"));
}

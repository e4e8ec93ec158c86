//! Store-level invariants: content addressing, the FTS mirror, orphan
//! cleanup, and context inheritance.

mod common;

use common::{seed_collection, seed_document, test_store};
use qmd::store::content::hash_content;

#[test]
fn active_documents_always_have_content() {
    let store = test_store();
    let cid = seed_collection(&store, "/repo");
    seed_document(&store, cid, "a.md", "A", "body a");
    seed_document(&store, cid, "b.md", "B", "body b");

    let dangling: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM documents d
             WHERE d.active = 1
               AND NOT EXISTS (SELECT 1 FROM content c WHERE c.hash = d.hash)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(dangling, 0);
}

#[test]
fn fts_has_one_row_per_document_with_matching_body() {
    let store = test_store();
    let cid = seed_collection(&store, "/repo");
    seed_document(&store, cid, "a.md", "A", "alpha body text");
    seed_document(&store, cid, "b.md", "B", "beta body text");
    // Dedup: same body as a.md
    seed_document(&store, cid, "c.md", "C", "alpha body text");

    let (fts_rows, doc_rows): (i64, i64) = store
        .conn()
        .query_row(
            "SELECT (SELECT COUNT(*) FROM documents_fts),
                    (SELECT COUNT(*) FROM documents)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(fts_rows, doc_rows);

    // Every mirror row's body equals the content body for its hash
    let mismatches: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM documents d
             JOIN documents_fts f ON f.rowid = d.id
             JOIN content c ON c.hash = d.hash
             WHERE f.body != c.doc",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(mismatches, 0);
}

#[test]
fn content_vectors_pair_one_to_one_with_vec_entries() {
    let store = test_store();
    let cid = seed_collection(&store, "/repo");
    seed_document(&store, cid, "a.md", "A", "first");
    seed_document(&store, cid, "b.md", "B", "second");

    let vectors = store.vectors();
    vectors.ensure_vec_table(3).unwrap();
    vectors
        .insert(&hash_content("first"), 0, 0, "m", &[1.0, 0.0, 0.0])
        .unwrap();
    vectors
        .insert(&hash_content("second"), 0, 0, "m", &[0.0, 1.0, 0.0])
        .unwrap();

    let unpaired: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM content_vectors cv
             WHERE NOT EXISTS (SELECT 1 FROM vectors_vec v
                               WHERE v.hash_seq = cv.hash || '_' || cv.seq)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(unpaired, 0);

    let orphan_vecs: i64 = store
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM vectors_vec v
             WHERE NOT EXISTS (SELECT 1 FROM content_vectors cv
                               WHERE v.hash_seq = cv.hash || '_' || cv.seq)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(orphan_vecs, 0);
}

#[test]
fn cleanup_removes_vectors_with_content() {
    let store = test_store();
    let cid = seed_collection(&store, "/repo");
    seed_document(&store, cid, "a.md", "A", "doomed body");
    let hash = hash_content("doomed body");

    store.vectors().ensure_vec_table(2).unwrap();
    store.vectors().insert(&hash, 0, 0, "m", &[0.5, 0.5]).unwrap();

    // Deactivate the only referencing document
    let doc = store.documents().get_by_path(cid, "a.md").unwrap().unwrap();
    store.documents().set_active(doc.id, false).unwrap();

    assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 1);

    let leftovers: i64 = store
        .conn()
        .query_row(
            "SELECT (SELECT COUNT(*) FROM content_vectors)
                  + (SELECT COUNT(*) FROM vectors_vec)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(leftovers, 0);

    // Second run reports nothing left to do
    assert_eq!(store.documents().cleanup_orphaned_content().unwrap(), 0);
}

#[test]
fn context_inheritance_scenario() {
    let store = test_store();
    let cid = seed_collection(&store, "/x");
    let contexts = store.contexts();
    contexts.set(cid, "", "root").unwrap();
    contexts.set(cid, "docs", "sub").unwrap();

    assert_eq!(
        contexts.context_for_path(cid, "docs/intro.md").unwrap(),
        Some("sub".to_string())
    );
    assert_eq!(
        contexts.context_for_path(cid, "README.md").unwrap(),
        Some("root".to_string())
    );
}

#[test]
fn collection_cascade_deletes_documents_and_contexts() {
    let store = test_store();
    let cid = seed_collection(&store, "/repo");
    seed_document(&store, cid, "a.md", "A", "body");
    store.contexts().set(cid, "", "root").unwrap();

    store.collections().remove("repo").unwrap();

    let (docs, contexts, fts): (i64, i64, i64) = store
        .conn()
        .query_row(
            "SELECT (SELECT COUNT(*) FROM documents),
                    (SELECT COUNT(*) FROM path_contexts),
                    (SELECT COUNT(*) FROM documents_fts)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(docs, 0);
    assert_eq!(contexts, 0);
    assert_eq!(fts, 0);
}

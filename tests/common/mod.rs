// Not every test binary uses every helper
#![allow(dead_code)]

use qmd::store::content::hash_content;
use qmd::store::Store;
use std::path::Path;

/// Open an in-memory store with the full schema.
pub fn test_store() -> Store {
    Store::open_in_memory().unwrap()
}

/// Create a collection and return its id.
pub fn seed_collection(store: &Store, pwd: &str) -> i64 {
    store
        .collections()
        .get_or_create(pwd, "**/*.md")
        .unwrap()
        .id
}

/// Insert a content row and an active document referencing it.
pub fn seed_document(store: &Store, collection_id: i64, path: &str, title: &str, body: &str) {
    let hash = hash_content(body);
    store.content().insert(&hash, body).unwrap();
    store
        .documents()
        .create(collection_id, path, title, &hash, "2024-01-01T00:00:00Z")
        .unwrap();
}

/// Write a file under `dir`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, body: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

//! Indexing pipeline: walk files, hash bodies, reconcile documents.

use crate::error::{QmdError, Result};
use crate::store::content::hash_content;
use crate::store::Store;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::Path;

/// Outcome of one indexing run.
#[derive(Debug, Default, PartialEq)]
pub struct IndexResult {
    pub indexed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub orphaned_content: usize,
}

/// Progress callback: (current, total, relative path).
pub type ProgressFn<'a> = dyn Fn(usize, usize, &str) + 'a;

/// Yields file paths relative to `root` for files matching `glob`.
/// Filesystem traversal is the only thing this does; skip rules live in
/// the indexer.
pub trait FileWalker {
    fn walk(&self, root: &Path, glob: &str) -> Result<Vec<String>>;
}

/// Default walker over the `glob` crate. Follows symlinks and yields
/// only files, relative to the walk root.
pub struct GlobWalker;

impl FileWalker for GlobWalker {
    fn walk(&self, root: &Path, glob: &str) -> Result<Vec<String>> {
        let pattern = root.join(glob);
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: true,
        };

        let entries = glob::glob_with(&pattern.to_string_lossy(), options)
            .map_err(|e| QmdError::Validation(format!("invalid glob '{glob}': {e}")))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!("cannot access {}: {}", e.path().display(), e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }
            if let Ok(rel) = path.strip_prefix(root) {
                paths.push(rel.to_string_lossy().into_owned());
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// Extract a document title: the first `#` or `##` heading. A heading
/// that is literally `Notes` or `📝 Notes` is skipped in favor of the
/// next `##` heading. Falls back to the file stem.
pub fn extract_title(body: &str, file_stem: &str) -> String {
    let mut lines = body.lines();
    let mut first_heading = None;

    for line in lines.by_ref() {
        let trimmed = line.trim();
        if let Some(h) = trimmed
            .strip_prefix("# ")
            .or_else(|| trimmed.strip_prefix("## "))
        {
            first_heading = Some(h.trim().to_string());
            break;
        }
    }

    match first_heading {
        Some(h) if h == "Notes" || h == "📝 Notes" => {
            // The generic vault heading; the next section heading is the
            // real title.
            for line in lines {
                if let Some(h2) = line.trim().strip_prefix("## ") {
                    return h2.trim().to_string();
                }
            }
            file_stem.to_string()
        }
        Some(h) => h,
        None => file_stem.to_string(),
    }
}

/// Ingests one collection from disk into the store.
pub struct Indexer<'a> {
    store: &'a Store,
    walker: &'a dyn FileWalker,
    exclude_dirs: Vec<String>,
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a Store, walker: &'a dyn FileWalker, exclude_dirs: Vec<String>) -> Self {
        Self {
            store,
            walker,
            exclude_dirs,
        }
    }

    /// Should this relative path be skipped? Any component starting with
    /// a dot, or sitting in the excluded-directory set, disqualifies it.
    fn skip(&self, rel_path: &str) -> bool {
        rel_path.split('/').any(|component| {
            component.starts_with('.') || self.exclude_dirs.iter().any(|d| d == component)
        })
    }

    /// Index the files under `pwd` matching `glob` into the collection
    /// keyed by that pair, creating the collection on first sight.
    pub fn index_files(
        &self,
        pwd: &Path,
        glob: &str,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<IndexResult> {
        // Validate inputs before touching the store so a bad glob leaves
        // no half-created collection behind.
        glob::Pattern::new(glob)
            .map_err(|e| QmdError::Validation(format!("invalid glob '{glob}': {e}")))?;
        let pwd = pwd
            .canonicalize()
            .map_err(|e| QmdError::Validation(format!("bad path {}: {e}", pwd.display())))?;
        let pwd_str = pwd.to_string_lossy().into_owned();

        let collection = self.store.collections().get_or_create(&pwd_str, glob)?;
        info!("Indexing collection '{}' ({pwd_str} {glob})", collection.name);

        let files: Vec<String> = self
            .walker
            .walk(&pwd, glob)?
            .into_iter()
            .filter(|rel| !self.skip(rel))
            .collect();
        let total = files.len();

        let documents = self.store.documents();
        let content = self.store.content();

        let mut result = IndexResult::default();
        let mut seen: HashSet<String> = HashSet::with_capacity(total);

        for (i, rel_path) in files.iter().enumerate() {
            let abs = pwd.join(rel_path);
            let body = match std::fs::read_to_string(&abs) {
                Ok(b) => b,
                Err(e) => {
                    warn!("skipping {rel_path}: {e}");
                    continue;
                }
            };

            let hash = hash_content(&body);
            let stem = abs
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| rel_path.clone());
            let title = extract_title(&body, &stem);

            match documents.get_by_path(collection.id, rel_path)? {
                None => {
                    content.insert(&hash, &body)?;
                    let modified_at = file_mtime(&abs);
                    documents.create(collection.id, rel_path, &title, &hash, &modified_at)?;
                    result.indexed += 1;
                }
                Some(doc) if doc.hash == hash => {
                    if doc.title != title {
                        documents.update_title(doc.id, &title)?;
                        result.updated += 1;
                    } else if !doc.active {
                        // File came back after a deactivating run
                        documents.set_active(doc.id, true)?;
                        result.updated += 1;
                    } else {
                        result.unchanged += 1;
                    }
                }
                Some(doc) => {
                    content.insert(&hash, &body)?;
                    documents.update_content(doc.id, &hash, &title)?;
                    result.updated += 1;
                }
            }

            seen.insert(rel_path.clone());
            if let Some(report) = progress {
                report(i + 1, total, rel_path);
            }
        }

        result.removed = documents.deactivate_missing(collection.id, &seen)?;
        result.orphaned_content = documents.cleanup_orphaned_content()?;
        self.store.collections().touch_updated_at(collection.id)?;

        // Cached expansions were computed against the old index
        let cleared = self.store.cache().clear()?;
        if cleared > 0 {
            debug!("cleared {cleared} cached LLM responses");
        }

        Ok(result)
    }
}

fn file_mtime(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
        .unwrap_or_else(|_| crate::store::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::fs;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn indexer<'a>(store: &'a Store, walker: &'a GlobWalker) -> Indexer<'a> {
        Indexer::new(
            store,
            walker,
            crate::config::Config::default().exclude_dirs,
        )
    }

    #[test]
    fn test_extract_title_headings() {
        assert_eq!(extract_title("# Top\nbody", "f"), "Top");
        assert_eq!(extract_title("## Second\nbody", "f"), "Second");
        assert_eq!(extract_title("plain text only", "fallback"), "fallback");
        // First heading further down still wins over the stem
        assert_eq!(extract_title("intro\n\n# Late Title", "f"), "Late Title");
    }

    #[test]
    fn test_extract_title_skips_notes_heading() {
        assert_eq!(
            extract_title("# Notes\n\n## Real Topic\nbody", "f"),
            "Real Topic"
        );
        assert_eq!(
            extract_title("# 📝 Notes\n\n## Daily Standup\n", "f"),
            "Daily Standup"
        );
        // No follow-up section heading: fall back to the stem
        assert_eq!(extract_title("# Notes\njust text", "2024-01-01"), "2024-01-01");
    }

    #[test]
    fn test_index_create_then_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "notes.md", "# Title\nthe quick brown fox");
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);

        let first = indexer.index_files(tmp.path(), "**/*.md", None).unwrap();
        assert_eq!(first.indexed, 1);
        assert_eq!(first.updated, 0);
        assert_eq!(first.removed, 0);

        // Re-indexing identical state is a no-op
        let second = indexer.index_files(tmp.path(), "**/*.md", None).unwrap();
        assert_eq!(second.indexed, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.removed, 0);
    }

    #[test]
    fn test_index_updates_changed_content() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.md", "# One\nfirst");
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);
        indexer.index_files(tmp.path(), "**/*.md", None).unwrap();

        write(tmp.path(), "a.md", "# One Revised\nsecond");
        let result = indexer.index_files(tmp.path(), "**/*.md", None).unwrap();
        assert_eq!(result.updated, 1);
        // Old body is orphaned and cleaned in the same run
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
            .get_by_path(collection.id, "a.md")
            .unwrap()
            .unwrap();
        assert_eq!(doc.title, "One Revised");
    }

    #[test]
    fn test_index_deactivates_removed_files() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "x.md", "# X\nbody");
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);
        indexer.index_files(tmp.path(), "**/*.md", None).unwrap();

        fs::remove_file(tmp.path().join("x.md")).unwrap();
        let result = indexer.index_files(tmp.path(), "**/*.md", None).unwrap();
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
        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_skip_hidden_and_excluded_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "ok.md", "# Ok");
        write(tmp.path(), ".hidden/secret.md", "# Secret");
        write(tmp.path(), "node_modules/dep/readme.md", "# Dep");
        write(tmp.path(), "vendor/lib.md", "# Lib");
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);

        let result = indexer.index_files(tmp.path(), "**/*.md", None).unwrap();
        assert_eq!(result.indexed, 1);
    }

    #[test]
    fn test_progress_callback_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.md", "# A");
        write(tmp.path(), "b.md", "# B");
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);

        let calls = std::cell::RefCell::new(Vec::new());
        let progress = |current: usize, total: usize, path: &str| {
            calls.borrow_mut().push((current, total, path.to_string()));
        };
        indexer
            .index_files(tmp.path(), "**/*.md", Some(&progress))
            .unwrap();

        let calls = calls.into_inner();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (1, 2, "a.md".to_string()));
        assert_eq!(calls[1], (2, 2, "b.md".to_string()));
    }

    #[test]
    fn test_title_fix_counts_as_update() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "t.md", "# Old\nsame body");
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);
        indexer.index_files(tmp.path(), "**/*.md", None).unwrap();

        // Same content hash cannot happen with a different title, so
        // simulate a stale stored title directly.
        let collection = store
            .collections()
            .list()
            .unwrap()
            .into_iter()
            .next()
            .unwrap();
        let doc = store
            .documents()
            .get_by_path(collection.id, "t.md")
            .unwrap()
            .unwrap();
        store.documents().update_title(doc.id, "Stale").unwrap();

        let result = indexer.index_files(tmp.path(), "**/*.md", None).unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.unchanged, 0);
    }

    #[test]
    fn test_invalid_glob_is_validation_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open_in_memory().unwrap();
        let walker = GlobWalker;
        let indexer = indexer(&store, &walker);

        let err = indexer.index_files(tmp.path(), "***[", None).unwrap_err();
        assert!(matches!(err, QmdError::Validation(_)));
        assert!(store.collections().list().unwrap().is_empty());
    }
}

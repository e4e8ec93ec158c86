//! Virtual path handling.
//!
//! Documents are externally addressed as `qmd://{collection}/{path}`.
//! The first slash-delimited segment after the scheme is the collection
//! name; the rest is the collection-relative path. For URI transport the
//! segments are percent-encoded individually so slashes between segments
//! survive.

use serde::{Deserialize, Serialize};

/// A parsed virtual path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualPath {
    pub collection: String,
    pub path: String,
}

/// Parse `qmd://collection/path/to/file.md`. The scheme is required.
/// `qmd://collection` and `qmd://collection/` address the collection
/// root (empty path).
pub fn parse_virtual_path(input: &str) -> Option<VirtualPath> {
    let rest = input.trim().strip_prefix("qmd://")?;

    if let Some((collection, path)) = rest.split_once('/') {
        Some(VirtualPath {
            collection: collection.to_string(),
            path: path.to_string(),
        })
    } else {
        Some(VirtualPath {
            collection: rest.to_string(),
            path: String::new(),
        })
    }
}

/// Build a virtual path from a collection name and relative path.
pub fn build_virtual_path(collection: &str, path: &str) -> String {
    if path.is_empty() {
        format!("qmd://{collection}/")
    } else {
        format!("qmd://{collection}/{path}")
    }
}

pub fn is_virtual_path(input: &str) -> bool {
    input.trim().starts_with("qmd://")
}

/// Percent-encode each segment of a virtual path for URI transport,
/// preserving the slashes between segments.
pub fn encode_virtual_path(collection: &str, path: &str) -> String {
    let encoded_path: String = path
        .split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    build_virtual_path(&urlencoding::encode(collection), &encoded_path)
}

/// Decode a percent-encoded virtual path back into its components.
pub fn decode_virtual_path(uri: &str) -> Option<VirtualPath> {
    let raw = parse_virtual_path(uri)?;
    let collection = urlencoding::decode(&raw.collection).ok()?.into_owned();
    let path = raw
        .path
        .split('/')
        .map(|seg| urlencoding::decode(seg).map(|s| s.into_owned()))
        .collect::<Result<Vec<_>, _>>()
        .ok()?
        .join("/");
    Some(VirtualPath { collection, path })
}

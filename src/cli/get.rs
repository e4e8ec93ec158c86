use crate::cli::GetArgs;
use crate::engine::Engine;
use crate::error::QmdError;
use crate::store::path::parse_virtual_path;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Handle `qmd get` - print a document by virtual or filesystem path,
/// with an optional `:line` or `:start-end` suffix.
pub fn handle(cmd: &GetArgs, engine: &Engine) -> Result<()> {
    let (target, line_spec) = split_line_suffix(&cmd.file);

    let body = if let Some(parsed) = parse_virtual_path(target) {
        let addressed = engine
            .store
            .documents()
            .get_addressed(&parsed.collection, &parsed.path)?;
        match addressed {
            Some(addressed) => engine
                .store
                .documents()
                .get_body(&addressed.doc)?
                .unwrap_or_default(),
            None => {
                let similar = engine.store.documents().similar_paths(&parsed.path, 5)?;
                return Err(QmdError::not_found_with_similar(
                    format!("document {target}"),
                    similar,
                )
                .into());
            }
        }
    } else {
        let path = PathBuf::from(target);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };

    let lines: Vec<&str> = body.lines().collect();
    let (start, end) = if let Some(spec) = line_spec {
        parse_line_range(spec, lines.len())?
    } else if cmd.full {
        (0, lines.len())
    } else {
        let start = cmd.from.saturating_sub(1).min(lines.len());
        (start, (start + cmd.limit).min(lines.len()))
    };

    for (i, line) in lines[start..end].iter().enumerate() {
        println!("{:>6}: {}", start + i + 1, line);
    }
    if end < lines.len() {
        println!("... ({} more lines)", lines.len() - end);
    }
    Ok(())
}

/// Split a trailing `:line` or `:start-end` spec off a path. A colon
/// followed by anything non-numeric stays part of the path.
fn split_line_suffix(spec: &str) -> (&str, Option<&str>) {
    if let Some((path, suffix)) = spec.rsplit_once(':') {
        let numeric = suffix
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
        if numeric && !suffix.is_empty() {
            return (path, Some(suffix));
        }
    }
    (spec, None)
}

fn parse_line_range(spec: &str, total: usize) -> Result<(usize, usize)> {
    if let Some((start, end)) = spec.split_once('-') {
        let start: usize = start.parse().context("invalid start line")?;
        let end: usize = end.parse().context("invalid end line")?;
        Ok((start.saturating_sub(1).min(total), end.min(total)))
    } else {
        let line: usize = spec.parse().context("invalid line number")?;
        let start = line.saturating_sub(1).min(total);
        Ok((start, (start + 1).min(total)))
    }
}

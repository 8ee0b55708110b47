use anyhow::{bail, Context, Result};
use globset::{Glob, GlobMatcher};
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::models::Document;

/// Load journal entries from the top level of `dir`.
///
/// Files whose name matches `file_glob` are read, ordered by modification
/// time (oldest first) and labelled with their file name minus `.txt`.
/// Unreadable or non-UTF-8 files are skipped with a warning.
pub fn load_corpus(dir: &Path, file_glob: &str) -> Result<Vec<Document>> {
    if !dir.is_dir() {
        bail!("Journal directory does not exist: {}", dir.display());
    }

    let matcher = build_matcher(file_glob)?;
    let mut entries: Vec<(SystemTime, String, std::path::PathBuf)> = Vec::new();

    let walker = WalkDir::new(dir).min_depth(1).max_depth(1);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if !matcher.is_match(&name) {
            continue;
        }

        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((modified, name, entry.into_path()));
    }

    // Name breaks ties for deterministic ordering
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let mut documents = Vec::with_capacity(entries.len());
    for (_, name, path) in entries {
        match std::fs::read_to_string(&path) {
            Ok(content) => documents.push(Document::new(label_for(&name), content)),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry"),
        }
    }

    tracing::info!(dir = %dir.display(), documents = documents.len(), "loaded corpus");
    Ok(documents)
}

fn label_for(file_name: &str) -> String {
    file_name.replace(".txt", "")
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(Glob::new(pattern)
        .with_context(|| format!("Invalid corpus.file_glob: {}", pattern))?
        .compile_matcher())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_strips_txt() {
        assert_eq!(label_for("2024-01-05.txt"), "2024-01-05");
        assert_eq!(label_for("2024-01-05"), "2024-01-05");
    }

    #[test]
    fn test_default_glob() {
        let matcher = build_matcher("[12]*").unwrap();
        assert!(matcher.is_match("2024-01-05.txt"));
        assert!(matcher.is_match("1999-12-31"));
        assert!(!matcher.is_match("notes.txt"));
        assert!(!matcher.is_match(".DS_Store"));
    }

    #[test]
    fn test_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_corpus(&dir.path().join("nope"), "[12]*").is_err());
    }
}

//! Count-based pruning of old captures

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Whether a file name looks like one of our captures
pub fn is_capture_file(name: &str) -> bool {
    name.starts_with("detected_") && name.ends_with(".jpg")
}

/// List capture files in `dir`, oldest first
///
/// Capture names embed a `YYYYMMDD_HHMMSS` stamp, so name order is
/// chronological order.
pub fn list_captures(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut captures: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| is_capture_file(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    captures.sort();
    Ok(captures)
}

/// Delete the oldest captures so that at most `keep` remain
///
/// Returns the paths that were removed. Individual delete failures are
/// logged and skipped.
pub fn prune_captures(dir: &Path, keep: usize) -> io::Result<Vec<PathBuf>> {
    let captures = list_captures(dir)?;
    if captures.len() <= keep {
        return Ok(Vec::new());
    }

    let excess = captures.len() - keep;
    let mut removed = Vec::with_capacity(excess);
    for path in captures.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => removed.push(path),
            Err(e) => warn!("Failed to remove old capture {}: {}", path.display(), e),
        }
    }

    if !removed.is_empty() {
        info!("Pruned {} old capture(s)", removed.len());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_prune_keeps_newest() {
        let tmp = tempdir().unwrap();
        for name in [
            "detected_20240101_120000.jpg",
            "detected_20240101_115959.jpg",
            "detected_20231231_235959.jpg",
            "detected_20240102_000000.jpg",
            "notes.txt",
        ] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }

        let removed = prune_captures(tmp.path(), 2).unwrap();

        let removed: Vec<String> = removed
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(removed, vec!["detected_20231231_235959.jpg", "detected_20240101_115959.jpg"]);

        let left: Vec<String> = list_captures(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(left, vec!["detected_20240101_120000.jpg", "detected_20240102_000000.jpg"]);
        assert!(tmp.path().join("notes.txt").exists());
    }

    #[test]
    fn test_prune_under_limit_is_noop() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("detected_20240101_120000.jpg"), b"x").unwrap();

        assert!(prune_captures(tmp.path(), 5).unwrap().is_empty());
        assert_eq!(list_captures(tmp.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_capture_name_filter() {
        assert!(is_capture_file("detected_20240101_120000.jpg"));
        assert!(!is_capture_file("detected_20240101_120000.png"));
        assert!(!is_capture_file("snapshot.jpg"));
    }
}

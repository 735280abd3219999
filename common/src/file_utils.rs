//! File helpers for scratch directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns paths to all regular files directly inside `dir`, sorted by name.
/// A missing directory yields an empty list.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Returns paths to all files in `dir` whose name starts with `prefix`.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> io::Result<Vec<PathBuf>> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix))
        })
        .collect())
}

/// Removes every path in `paths`, logging failures instead of returning them.
/// Paths that no longer exist are skipped silently.
///
/// Returns the number of files actually removed.
pub fn remove_files_best_effort<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!("Failed to remove {}: {}", path.display(), err);
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_lists_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("nope");
        assert!(list_files(&missing)?.is_empty());
        Ok(())
    }

    #[test]
    fn prefix_filter_and_removal() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("run1.a"), "x")?;
        fs::write(dir.path().join("run1.b"), "x")?;
        fs::write(dir.path().join("other.a"), "x")?;
        fs::create_dir(dir.path().join("run1.dir"))?;

        let matching = files_with_prefix(dir.path(), "run1")?;
        assert_eq!(matching.len(), 2);

        let mut with_missing = matching.clone();
        with_missing.push(dir.path().join("run1.gone"));
        assert_eq!(remove_files_best_effort(&with_missing), 2);

        let left = list_files(dir.path())?;
        assert_eq!(left, vec![dir.path().join("other.a")]);
        Ok(())
    }
}

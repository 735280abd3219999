//! Per-call scratch storage for intermediate tables and raw tool output.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use common::file_utils::{files_with_prefix, remove_files_best_effort};
use tempfile::TempDir;

static RUN_COUNTER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug)]
enum Root {
    /// Freshly allocated, removed as a whole on release.
    Fresh(Option<TempDir>),
    /// Caller-provided; only this run's files are removed on release.
    Fixed(PathBuf),
}

/// Scratch directory for one correlation call.
///
/// Every file lives under `<dir>/<stem>.*`, where the stem is unique per call
/// within the process, so concurrent runs sharing a fixed directory never
/// collide. Release happens on drop, on every exit path, and is best-effort.
#[derive(Debug)]
pub struct ScratchDir {
    root: Root,
    dir: PathBuf,
    stem: String,
    keep: bool,
}

impl ScratchDir {
    /// Allocates a fresh temporary directory, or reuses `work_dir` (created if
    /// missing) when one is given.
    pub fn create(work_dir: Option<&Path>, keep: bool) -> io::Result<Self> {
        let stem = format!(
            "catcorr-{}-{}",
            std::process::id(),
            RUN_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        let (root, dir) = match work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                (Root::Fixed(dir.to_path_buf()), dir.to_path_buf())
            }
            None => {
                let temp = tempfile::Builder::new().prefix("catcorr-").tempdir()?;
                let dir = temp.path().to_path_buf();
                (Root::Fresh(Some(temp)), dir)
            }
        };

        tracing::debug!("Scratch directory {} (stem {})", dir.display(), stem);

        Ok(Self {
            root,
            dir,
            stem,
            keep,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Base path `<dir>/<stem>` handed to tools that derive their own output names.
    pub fn base(&self) -> PathBuf {
        self.dir.join(&self.stem)
    }

    /// Path of the artifact `<dir>/<stem>.<suffix>`.
    pub fn artifact(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.stem, suffix))
    }

    fn release(&mut self) {
        match &mut self.root {
            Root::Fresh(temp) => {
                let Some(temp) = temp.take() else {
                    return;
                };
                if self.keep {
                    let kept = temp.keep();
                    tracing::info!("Keeping intermediate files in {}", kept.display());
                } else if let Err(err) = temp.close() {
                    tracing::warn!(
                        "Failed to remove scratch directory {}: {}",
                        self.dir.display(),
                        err
                    );
                }
            }
            Root::Fixed(dir) => {
                if self.keep {
                    tracing::info!("Keeping intermediate files in {}", dir.display());
                    return;
                }
                match files_with_prefix(dir, &self.stem) {
                    Ok(files) => {
                        let removed = remove_files_best_effort(&files);
                        tracing::debug!("Removed {} scratch files from {}", removed, dir.display());
                    }
                    Err(err) => {
                        tracing::warn!("Failed to list scratch files in {}: {}", dir.display(), err);
                    }
                }
            }
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.release();
    }
}

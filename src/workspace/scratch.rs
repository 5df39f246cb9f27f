use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{MapZoomError, MapZoomResult};

/// ffmpeg `image2` pattern matching [`Workspace::frame_path`].
pub const FRAME_PATTERN: &str = "frame-%05d.png";

static NEXT_WORKSPACE: AtomicU64 = AtomicU64::new(0);

/// A deletion that failed during [`Workspace::release`]. Logged, never surfaced as a run failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of releasing a workspace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub dir_removed: bool,
    pub warnings: Vec<CleanupWarning>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.dir_removed && self.warnings.is_empty()
    }
}

/// Scratch directory owned by exactly one pipeline run.
///
/// The directory name is unique per process and per run. Dropping an unreleased workspace
/// releases it, so early returns and unwinding still clean up.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create a fresh directory under `root` (the system temp dir when `None`).
    pub fn acquire(root: Option<&Path>) -> MapZoomResult<Self> {
        let root = root
            .map(Path::to_path_buf)
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create scratch root '{}'", root.display()))?;

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = NEXT_WORKSPACE.fetch_add(1, Ordering::Relaxed);
        let dir = root.join(format!(
            "mapzoom-{}-{nanos}-{seq}",
            std::process::id()
        ));

        // `create_dir` (not `_all`) fails if the name is somehow taken.
        std::fs::create_dir(&dir).map_err(|e| {
            MapZoomError::workspace(format!(
                "failed to create workspace '{}': {e}",
                dir.display()
            ))
        })?;
        tracing::debug!(dir = %dir.display(), "workspace acquired");
        Ok(Self {
            dir,
            released: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for the frame at `index`; zero-padded so lexical and numeric order agree.
    pub fn frame_path(&self, index: FrameIndex) -> PathBuf {
        self.dir.join(format!("frame-{:05}.png", index.0))
    }

    pub fn frame_pattern(&self) -> PathBuf {
        self.dir.join(FRAME_PATTERN)
    }

    /// Path for a named intermediate artifact (e.g. the silent encode).
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Delete everything in the workspace, then the directory itself.
    pub fn release(mut self) -> CleanupReport {
        self.release_inner()
    }

    fn release_inner(&mut self) -> CleanupReport {
        if self.released {
            return CleanupReport::default();
        }
        self.released = true;

        let mut report = CleanupReport::default();
        match std::fs::read_dir(&self.dir) {
            Ok(entries) => {
                for entry in entries {
                    let path = match entry {
                        Ok(e) => e.path(),
                        Err(e) => {
                            report.warnings.push(CleanupWarning {
                                path: self.dir.clone(),
                                message: format!("read_dir entry: {e}"),
                            });
                            continue;
                        }
                    };
                    let removed = if path.is_dir() {
                        std::fs::remove_dir_all(&path)
                    } else {
                        std::fs::remove_file(&path)
                    };
                    match removed {
                        Ok(()) => report.files_removed += 1,
                        Err(e) => report.warnings.push(CleanupWarning {
                            path,
                            message: e.to_string(),
                        }),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => report.warnings.push(CleanupWarning {
                path: self.dir.clone(),
                message: format!("read_dir: {e}"),
            }),
        }

        match std::fs::remove_dir(&self.dir) {
            Ok(()) => report.dir_removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.dir_removed = true,
            Err(e) => report.warnings.push(CleanupWarning {
                path: self.dir.clone(),
                message: e.to_string(),
            }),
        }

        for w in &report.warnings {
            tracing::warn!(path = %w.path.display(), error = %w.message, "workspace cleanup warning");
        }
        tracing::debug!(
            dir = %self.dir.display(),
            files_removed = report.files_removed,
            "workspace released"
        );
        report
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release_inner();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/workspace/scratch.rs"]
mod tests;

//! Registry of temporary artifacts.
//!
//! Disassembler output is written to temporary files. They are removed when
//! the session finishes, and from the signal handler if the run is
//! interrupted, unless the user asked to keep them.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::Builder;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TempState {
    paths: Vec<PathBuf>,
    keep: bool,
}

impl TempState {
    fn remove_all(&mut self) -> usize {
        let paths = std::mem::take(&mut self.paths);
        if self.keep {
            for path in &paths {
                debug!(path = %path.display(), "keeping temporary file");
            }
            return 0;
        }
        let mut removed = 0;
        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temporary file"),
            }
        }
        removed
    }
}

impl Drop for TempState {
    fn drop(&mut self) {
        self.remove_all();
    }
}

/// Shared handle; clones refer to the same registry.
#[derive(Clone, Debug, Default)]
pub struct TempFiles {
    inner: Arc<Mutex<TempState>>,
}

impl TempFiles {
    #[must_use]
    pub fn new(keep: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TempState {
                paths: Vec::new(),
                keep,
            })),
        }
    }

    #[must_use]
    pub fn keep(&self) -> bool {
        self.inner.lock().keep
    }

    /// Create an empty registered file named `<prefix>XXXXXX<suffix>` in the
    /// system temp directory.
    pub fn create(&self, prefix: &str, suffix: &str) -> std::io::Result<PathBuf> {
        let file = Builder::new().prefix(prefix).suffix(suffix).tempfile()?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        self.register(&path);
        Ok(path)
    }

    pub fn register(&self, path: &Path) {
        self.inner.lock().paths.push(path.to_path_buf());
    }

    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.inner.lock().paths.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().paths.is_empty()
    }

    /// Remove every registered file. Returns how many were deleted.
    pub fn cleanup(&self) -> usize {
        self.inner.lock().remove_all()
    }
}

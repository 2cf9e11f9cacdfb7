//! Advisory process-level workspace lock.
//!
//! Two orchestrator runs against the same workspace are unsupported; the
//! lock turns that contract into a startup failure instead of silent
//! corruption. Released on drop.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::domain::error::{ConvergeError, Result};

/// Directory for converge-owned state inside a workspace.
pub const STATE_DIR: &str = ".converge";

const LOCK_FILE: &str = "lock";

/// Held for the duration of a run.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: std::fs::File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquire the exclusive lock for a workspace, failing immediately if
    /// another process holds it.
    pub fn acquire(workspace: &Path) -> Result<Self> {
        let dir = workspace.join(STATE_DIR);
        fs::create_dir_all(&dir)?;

        // The state dir ignores itself so locks and run artifacts never
        // show up as workspace changes.
        let gitignore = dir.join(".gitignore");
        if !gitignore.exists() {
            fs::write(&gitignore, "*\n")?;
        }

        let path = dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self { file, path }),
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                Err(ConvergeError::WorkspaceLocked(path))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

//! Rooted working-directory handle.
//!
//! Every session sees the server root as `/`. Arguments are normalized
//! lexically first (so `..` can never climb above `/`), then resolved on disk;
//! a symlink that leads outside the root is refused.

use crate::error::FsError;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDirectory {
    /// Canonical server root.
    root: PathBuf,
    /// Current directory relative to `root`; empty means the root itself.
    relative: PathBuf,
}

impl WorkingDirectory {
    /// Opens a handle positioned at `root`, which must be an existing directory.
    pub async fn open_root(root: &Path) -> Result<Self, FsError> {
        let display = root.display().to_string();
        let root = tokio::fs::canonicalize(root)
            .await
            .map_err(|e| FsError::from_io(display.clone(), e))?;
        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|e| FsError::from_io(display.clone(), e))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(display));
        }
        Ok(Self {
            root,
            relative: PathBuf::new(),
        })
    }

    /// Path shown to clients, always absolute from the session's point of view.
    pub fn display_path(&self) -> String {
        if self.relative.as_os_str().is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.relative.display())
        }
    }

    /// Location of the current directory on the server's filesystem.
    pub fn real_path(&self) -> PathBuf {
        if self.relative.as_os_str().is_empty() {
            return self.root.clone();
        }
        self.root.join(&self.relative)
    }

    /// Resolves `arg` against this directory and returns a handle to the result.
    ///
    /// The handle itself is left untouched, so a failed CD keeps the old directory.
    pub async fn resolve(&self, arg: &str) -> Result<WorkingDirectory, FsError> {
        let lexical = self.normalize(arg);
        let display = virtual_display(&lexical);

        let canonical = tokio::fs::canonicalize(self.root.join(&lexical))
            .await
            .map_err(|e| FsError::from_io(display.clone(), e))?;
        let relative = match canonical.strip_prefix(&self.root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => return Err(FsError::OutsideRoot(display)),
        };

        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|e| FsError::from_io(display.clone(), e))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(display));
        }

        Ok(Self {
            root: self.root.clone(),
            relative,
        })
    }

    /// Lexically applies `arg` to the current directory, clamping `..` at the root.
    fn normalize(&self, arg: &str) -> PathBuf {
        let arg = Path::new(arg);
        let mut parts: Vec<&std::ffi::OsStr> = if arg.has_root() {
            Vec::new()
        } else {
            self.relative
                .components()
                .map(Component::as_os_str)
                .collect()
        };

        for component in arg.components() {
            match component {
                Component::Normal(name) => parts.push(name),
                Component::ParentDir => {
                    parts.pop();
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        parts.iter().collect()
    }
}

fn virtual_display(relative: &Path) -> String {
    format!("/{}", relative.display())
}

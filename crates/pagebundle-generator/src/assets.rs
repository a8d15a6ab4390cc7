//! Output writing and plain asset copying.

use std::path::{Path, PathBuf};

use pagebundle_core::link::{output_path, resolve_output_name};
use thiserror::Error;
use tracing::debug;

/// Asset processing errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// Reading or writing a file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for asset operations.
pub type Result<T> = std::result::Result<T, AssetError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AssetError + '_ {
    move |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Copies assets into the output directory and writes generated files.
#[derive(Debug, Clone)]
pub struct AssetProcessor {
    root: PathBuf,
    dest: PathBuf,
}

impl AssetProcessor {
    /// Create a processor reading below `root` and writing below `root/dest`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, dest: impl AsRef<Path>) -> Self {
        let root = root.into();
        let dest = root.join(dest);
        Self { root, dest }
    }

    /// Output directory.
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Copy a project-relative asset to `dest/<resolved name>`.
    pub async fn copy(&self, file: &Path) -> Result<PathBuf> {
        let target = output_path(&self.dest, None, &resolve_output_name(file));
        let source = self.root.join(file);

        ensure_parent(&target).await?;
        tokio::fs::copy(&source, &target)
            .await
            .map_err(io_error(&source))?;

        debug!(src = %file.display(), dest = %target.display(), "copied asset");
        Ok(target)
    }

    /// Write generated contents to `path`, creating parent directories.
    pub async fn write(&self, path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
        ensure_parent(path).await?;
        tokio::fs::write(path, contents)
            .await
            .map_err(io_error(path))?;
        debug!(path = %path.display(), "wrote output");
        Ok(())
    }

    /// Read a project-relative file as text.
    pub async fn read(&self, file: &Path) -> Result<String> {
        let path = self.root.join(file);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(io_error(&path))
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }
    Ok(())
}

//! Durable media storage consumed by the binder and the runners.

use std::path::{Path, PathBuf};

use crate::error::StorageError;

pub mod filesystem;

pub use filesystem::FileSystemStorage;

/// Binary media storage addressed by relative paths.
pub trait MediaStorage: Send + Sync {
    /// Whether an artifact exists at `relative_path`.
    fn exists(&self, relative_path: &str) -> bool;

    /// Absolute location of `relative_path`.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, StorageError>;

    /// Moves a local file into storage under `relative_dir`, keeping
    /// `file_name` when it is free. Returns the stored relative path.
    fn import(
        &self,
        file: &Path,
        relative_dir: &str,
        file_name: &str,
    ) -> Result<String, StorageError>;
}

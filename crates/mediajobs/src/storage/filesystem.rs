use std::path::{Component, Path, PathBuf};

use crate::error::StorageError;

use super::MediaStorage;

/// Move a file from `src` to `dst`. Uses `rename` first (atomic on the same
/// filesystem) and falls back to copy + delete for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Media storage rooted at a local directory.
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Claims a free file name in `dir` by creating it exclusively.
    /// Tries `name`, then `name_2`, `name_3`, ... before the extension.
    fn reserve_name(&self, dir: &Path, file_name: &str) -> Result<(PathBuf, String), StorageError> {
        let (base, ext) = match file_name.rfind('.') {
            Some(dot) if dot > 0 => (&file_name[..dot], Some(&file_name[dot..])),
            _ => (file_name, None),
        };

        for counter in 1..=1000 {
            let candidate = if counter == 1 {
                file_name.to_string()
            } else {
                match ext {
                    Some(ext) => format!("{}_{}{}", base, counter, ext),
                    None => format!("{}_{}", base, counter),
                }
            };

            let path = dir.join(&candidate);
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok((path, candidate)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(StorageError::WriteFile { path, source: e })
                }
            }
        }

        Err(StorageError::NameExhausted(dir.join(file_name)))
    }
}

/// Rejects empty, absolute and parent-escaping relative paths.
fn checked_relative(relative_path: &str) -> Result<PathBuf, StorageError> {
    let trimmed = relative_path.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidPath(relative_path.to_string()));
    }

    let path = Path::new(trimmed);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(relative_path.to_string()));
            }
        }
    }
    Ok(clean)
}

fn to_relative_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

impl MediaStorage for FileSystemStorage {
    fn exists(&self, relative_path: &str) -> bool {
        match checked_relative(relative_path) {
            Ok(rel) => !rel.as_os_str().is_empty() && self.root.join(rel).is_file(),
            Err(_) => false,
        }
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(checked_relative(relative_path)?))
    }

    fn import(
        &self,
        file: &Path,
        relative_dir: &str,
        file_name: &str,
    ) -> Result<String, StorageError> {
        if !file.is_file() {
            return Err(StorageError::SourceMissing(file.to_path_buf()));
        }
        let rel_dir = checked_relative(relative_dir)?;
        let name_path = checked_relative(file_name)?;
        if name_path.components().count() != 1 {
            return Err(StorageError::InvalidPath(file_name.to_string()));
        }

        let dir = self.root.join(&rel_dir);
        self.ensure_directory(&dir)?;

        let (destination, stored_name) = self.reserve_name(&dir, file_name)?;
        if let Err(e) = move_file(file, &destination) {
            let _ = std::fs::remove_file(&destination);
            return Err(e);
        }

        let stored = to_relative_string(&rel_dir.join(stored_name));
        log::debug!("Imported artifact into storage as {}", stored);
        Ok(stored)
    }
}

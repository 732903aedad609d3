use std::{
    fs, io,
    path::{Component, Path, PathBuf},
};

use crate::storage::{Storage, StorageError};

/// Directory-backed storage. Each key maps to `<root>/<key>.dat`; `/` in a
/// key becomes a subdirectory.
///
/// This is intended for desktop/headless use. Other frontends can implement
/// [`Storage`] directly.
#[derive(Debug, Clone)]
pub struct StdStorage {
    root: PathBuf,
}

impl StdStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && !key.ends_with('/')
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        let mut path = self.root.join(rel);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".dat");
        path.set_file_name(name);
        Ok(path)
    }
}

impl Storage for StdStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Replaced atomically via a temporary sibling.
        let tmp = path.with_extension("dat.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

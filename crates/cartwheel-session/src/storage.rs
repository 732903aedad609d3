use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use zip::write::SimpleFileOptions;

/// Upper bound on one unpacked save file. Battery memory is far smaller.
pub const MAX_SAVE_FILE_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("save archive is unreadable: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("save metadata is invalid: {0}")]
    Metadata(String),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("save file '{0}' is too large")]
    TooLarge(String),
}

/// Flat key/value storage.
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    /// Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: BTreeMap<String, Vec<u8>>,
    puts: usize,
    removes: usize,
    failing: bool,
}

/// In-memory storage. Clones share the same entries, so a caller can keep a
/// handle to inspect what a session wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> usize {
        self.lock().puts
    }

    pub fn remove_count(&self) -> usize {
        self.lock().removes
    }

    /// While set, every `put` fails and leaves the entries alone.
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock().entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut inner = self.lock();
        if inner.failing {
            return Err(io::Error::other("storage unavailable").into());
        }
        inner.puts += 1;
        inner.entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.removes += 1;
        inner.entries.remove(key);
        Ok(())
    }
}

/// One named file of a save collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveFile {
    pub name: String,
    pub content: Vec<u8>,
}

impl SaveFile {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Named-file save collections on top of [`Storage`].
pub trait SaveStore {
    fn load(&mut self, path: &str) -> Result<Option<Vec<SaveFile>>, StorageError>;

    fn save(&mut self, path: &str, files: &[SaveFile]) -> Result<(), StorageError>;

    /// Compares `files` against the last set seen (loaded or checked) and
    /// remembers them. Returns true when they differ.
    fn check_files_changed(&mut self, files: &[SaveFile]) -> bool;

    /// The underlying key/value storage, for legacy layouts.
    fn storage(&mut self) -> &mut dyn Storage;
}

pub const SAVE_FORMAT_VERSION: u32 = 1;

/// Sidecar record stored next to a save collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveMetadata {
    pub version: u32,
    /// Seconds since the Unix epoch.
    pub saved_at: u64,
    pub files: Vec<SaveFileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveFileInfo {
    pub name: String,
    pub size: u64,
}

/// Save collections stored locally as a zip archive at `<path>/files` with
/// a TOML [`SaveMetadata`] record at `<path>/meta`.
#[derive(Debug)]
pub struct LocalSaveStore<S> {
    storage: S,
    last_digest: Option<[u8; 20]>,
}

impl<S: Storage> LocalSaveStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            last_digest: None,
        }
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    pub fn files_key(path: &str) -> String {
        format!("{path}/files")
    }

    pub fn meta_key(path: &str) -> String {
        format!("{path}/meta")
    }

    /// Reads the metadata record without touching the archive.
    pub fn metadata(&self, path: &str) -> Result<Option<SaveMetadata>, StorageError> {
        let Some(raw) = self.storage.get(&Self::meta_key(path))? else {
            return Ok(None);
        };
        let text = std::str::from_utf8(&raw).map_err(|e| StorageError::Metadata(e.to_string()))?;
        toml::from_str(text)
            .map(Some)
            .map_err(|e| StorageError::Metadata(e.to_string()))
    }
}

impl<S: Storage> SaveStore for LocalSaveStore<S> {
    fn load(&mut self, path: &str) -> Result<Option<Vec<SaveFile>>, StorageError> {
        let Some(bytes) = self.storage.get(&Self::files_key(path))? else {
            return Ok(None);
        };

        if let Some(meta) = self.metadata(path)?
            && meta.version > SAVE_FORMAT_VERSION
        {
            return Err(StorageError::Metadata(format!(
                "unsupported save format version {}",
                meta.version
            )));
        }

        let files = unpack(&bytes)?;
        debug!("loaded {} save file(s) from {path}", files.len());
        Ok(Some(files))
    }

    fn save(&mut self, path: &str, files: &[SaveFile]) -> Result<(), StorageError> {
        let result = write_collection(&mut self.storage, path, files);
        if result.is_err() {
            // Whatever made it to storage is unknown now; compare fresh next time.
            self.last_digest = None;
        } else {
            info!("saved {} file(s) to {path}", files.len());
        }
        result
    }

    fn check_files_changed(&mut self, files: &[SaveFile]) -> bool {
        let digest = digest_files(files);
        if self.last_digest == Some(digest) {
            return false;
        }
        self.last_digest = Some(digest);
        true
    }

    fn storage(&mut self) -> &mut dyn Storage {
        &mut self.storage
    }
}

fn write_collection<S: Storage>(
    storage: &mut S,
    path: &str,
    files: &[SaveFile],
) -> Result<(), StorageError> {
    let archive = pack(files)?;
    let meta = SaveMetadata {
        version: SAVE_FORMAT_VERSION,
        saved_at: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        files: files
            .iter()
            .map(|f| SaveFileInfo {
                name: f.name.clone(),
                size: f.content.len() as u64,
            })
            .collect(),
    };
    let meta = toml::to_string(&meta).map_err(|e| StorageError::Metadata(e.to_string()))?;

    storage.put(&LocalSaveStore::<S>::files_key(path), &archive)?;
    storage.put(&LocalSaveStore::<S>::meta_key(path), meta.as_bytes())?;
    Ok(())
}

fn pack(files: &[SaveFile]) -> Result<Vec<u8>, StorageError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for file in files {
        writer.start_file(file.name.as_str(), options)?;
        writer.write_all(&file.content)?;
    }
    Ok(writer.finish()?.into_inner())
}

fn unpack(bytes: &[u8]) -> Result<Vec<SaveFile>, StorageError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut files = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let limit = MAX_SAVE_FILE_SIZE + 1;
        let mut content = Vec::new();
        (&mut entry).take(limit).read_to_end(&mut content)?;
        if content.len() as u64 > MAX_SAVE_FILE_SIZE {
            return Err(StorageError::TooLarge(entry.name().to_string()));
        }
        files.push(SaveFile::new(entry.name(), content));
    }
    Ok(files)
}

fn digest_files(files: &[SaveFile]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    for file in files {
        hasher.update((file.name.len() as u64).to_le_bytes());
        hasher.update(file.name.as_bytes());
        hasher.update((file.content.len() as u64).to_le_bytes());
        hasher.update(&file.content);
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&hasher.finalize());
    out
}

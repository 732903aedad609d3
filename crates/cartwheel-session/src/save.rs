use log::{error, info, warn};

use crate::config::Platform;
use crate::native::NativeCore;
use crate::storage::{SaveFile, SaveStore, StorageError};

/// Name of the battery-memory entry in a save collection.
pub const SAVE_NAME: &str = "sav";

/// Where the GB/GBC cartridge code keeps battery RAM in the core's virtual
/// filesystem.
pub const SRAM_FILE: &str = "/tmp/game.srm";

/// Host-held copy of GBA flash/EEPROM contents.
pub trait SaveBufferAccess {
    fn save_buffer(&self) -> &[u8];
    fn set_save_buffer(&mut self, bytes: Vec<u8>);
}

/// Where battery memory lives while the core runs. Chosen once per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveMedium {
    /// GBA: the core commits and restores through host callbacks.
    SaveBuffer,
    /// GB/GBC: a file in the core's virtual filesystem.
    VirtualFile { path: &'static str },
}

impl SaveMedium {
    pub fn for_platform(platform: Platform) -> Self {
        if platform.is_gba() {
            SaveMedium::SaveBuffer
        } else {
            SaveMedium::VirtualFile { path: SRAM_FILE }
        }
    }

    /// Hands loaded battery memory to the core. A virtual file that already
    /// exists is left alone.
    pub fn restore(
        &self,
        bytes: &[u8],
        buffer: &mut dyn SaveBufferAccess,
        core: &mut dyn NativeCore,
    ) {
        match *self {
            SaveMedium::SaveBuffer => buffer.set_save_buffer(bytes.to_vec()),
            SaveMedium::VirtualFile { path } => {
                let Some(fs) = core.filesystem() else {
                    warn!("core has no filesystem; battery RAM not restored");
                    return;
                };
                if fs.exists(path) {
                    return;
                }
                if let Err(e) = fs.write(path, bytes) {
                    error!("Error restoring {path}: {e}");
                }
            }
        }
    }

    /// Current battery memory, or `None` when there is nothing to save.
    pub fn extract(
        &self,
        buffer: &dyn SaveBufferAccess,
        core: &mut dyn NativeCore,
    ) -> Option<Vec<u8>> {
        match *self {
            SaveMedium::SaveBuffer => Some(buffer.save_buffer().to_vec()),
            SaveMedium::VirtualFile { path } => {
                let fs = core.filesystem()?;
                if !fs.exists(path) {
                    return None;
                }
                fs.read(path).filter(|bytes| !bytes.is_empty())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    NotLoaded,
    Loading,
    Ready,
    LoadFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// Identical to the last loaded or written set.
    Unchanged,
    /// Logged and swallowed.
    Failed,
    /// The core holds no battery memory yet.
    NothingToSave,
    NoPath,
}

/// Loads, migrates and persists battery saves for one session.
pub struct SaveStateManager {
    store: Box<dyn SaveStore>,
    medium: SaveMedium,
    path: Option<String>,
    load_state: LoadState,
}

impl SaveStateManager {
    pub fn new(store: Box<dyn SaveStore>, medium: SaveMedium) -> Self {
        Self {
            store,
            medium,
            path: None,
            load_state: LoadState::NotLoaded,
        }
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = Some(path.into());
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    /// Loads the battery-memory entry, migrating a legacy blob first. Any
    /// failure is logged and treated as "no save".
    pub fn load(&mut self) -> Option<Vec<u8>> {
        let path = self.path.clone()?;
        self.load_state = LoadState::Loading;
        match self.load_from(&path) {
            Ok(save) => {
                self.load_state = LoadState::Ready;
                save
            }
            Err(e) => {
                error!("Error loading save state: {e}");
                self.load_state = LoadState::LoadFailed;
                None
            }
        }
    }

    fn load_from(&mut self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.migrate(path)?;

        let Some(files) = self.store.load(path)? else {
            return Ok(None);
        };
        let save = files
            .iter()
            .find(|f| f.name == SAVE_NAME)
            .map(|f| f.content.clone());

        // Prime change detection with what is already stored.
        self.store.check_files_changed(&files);

        if let Some(save) = &save {
            info!("reading sram ({} bytes)", save.len());
        }
        Ok(save)
    }

    /// Moves a legacy single-blob save into the collection format. No-op when
    /// there is no legacy blob.
    fn migrate(&mut self, path: &str) -> Result<(), StorageError> {
        let Some(blob) = self.store.storage().get(path)? else {
            return Ok(());
        };
        info!("Migrating local saves.");

        self.store.save(path, &[SaveFile::new(SAVE_NAME, blob)])?;

        let storage = self.store.storage();
        storage.remove(path)?;
        storage.remove(&format!("{path}/info"))?;
        Ok(())
    }

    pub fn restore_into(
        &self,
        bytes: &[u8],
        buffer: &mut dyn SaveBufferAccess,
        core: &mut dyn NativeCore,
    ) {
        self.medium.restore(bytes, buffer, core);
    }

    pub fn extract(
        &self,
        buffer: &dyn SaveBufferAccess,
        core: &mut dyn NativeCore,
    ) -> Option<Vec<u8>> {
        self.medium.extract(buffer, core)
    }

    /// Writes `bytes` as the battery-memory entry when it differs from what is
    /// stored. Taking `&mut self` keeps writes for one session serialized.
    pub fn persist(&mut self, bytes: &[u8]) -> PersistOutcome {
        let Some(path) = self.path.as_deref() else {
            return PersistOutcome::NoPath;
        };

        let files = [SaveFile::new(SAVE_NAME, bytes)];
        if !self.store.check_files_changed(&files) {
            return PersistOutcome::Unchanged;
        }
        match self.store.save(path, &files) {
            Ok(()) => {
                info!("sram saved: {}", bytes.len());
                PersistOutcome::Written
            }
            Err(e) => {
                error!("Error saving sram to {path}: {e}");
                PersistOutcome::Failed
            }
        }
    }

    /// Stores `bytes` in the legacy single-blob layout.
    pub fn write_legacy(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        self.store.storage().put(path, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{LocalSaveStore, MemoryStorage, Storage};

    fn manager(storage: &MemoryStorage) -> SaveStateManager {
        let mut m = SaveStateManager::new(
            Box::new(LocalSaveStore::new(storage.clone())),
            SaveMedium::SaveBuffer,
        );
        m.set_path("fp/sav");
        m
    }

    #[test]
    fn legacy_blob_is_migrated_once() {
        let mut storage = MemoryStorage::new();
        storage.put("fp/sav", &[7, 7, 7]).unwrap();
        storage.put("fp/sav/info", b"{}").unwrap();

        let mut m = manager(&storage);
        assert_eq!(m.load(), Some(vec![7, 7, 7]));
        assert_eq!(m.load_state(), LoadState::Ready);
        assert_eq!(storage.keys(), vec!["fp/sav/files", "fp/sav/meta"]);
        assert!(!storage.contains("fp/sav/info"));
        assert_eq!(storage.remove_count(), 2);

        // Second load finds nothing to migrate.
        let puts = storage.put_count();
        assert_eq!(m.load(), Some(vec![7, 7, 7]));
        assert_eq!(storage.put_count(), puts);
    }

    #[test]
    fn missing_save_is_not_an_error() {
        let storage = MemoryStorage::new();
        let mut m = manager(&storage);
        assert_eq!(m.load(), None);
        assert_eq!(m.load_state(), LoadState::Ready);
    }

    #[test]
    fn unreadable_save_is_swallowed() {
        let mut storage = MemoryStorage::new();
        storage.put("fp/sav/files", b"junk").unwrap();
        let mut m = manager(&storage);
        assert_eq!(m.load(), None);
        assert_eq!(m.load_state(), LoadState::LoadFailed);
    }

    #[test]
    fn unchanged_save_is_not_rewritten() {
        let storage = MemoryStorage::new();
        let mut m = manager(&storage);
        assert_eq!(m.persist(&[1, 2]), PersistOutcome::Written);
        let puts = storage.put_count();
        assert_eq!(m.persist(&[1, 2]), PersistOutcome::Unchanged);
        assert_eq!(storage.put_count(), puts);
        assert_eq!(m.persist(&[1, 3]), PersistOutcome::Written);
    }

    #[test]
    fn loaded_save_primes_change_detection() {
        let storage = MemoryStorage::new();
        let mut first = manager(&storage);
        first.persist(&[4, 4]);

        let mut second = manager(&storage);
        assert_eq!(second.load(), Some(vec![4, 4]));
        assert_eq!(second.persist(&[4, 4]), PersistOutcome::Unchanged);
    }

    #[test]
    fn without_path_nothing_happens() {
        let storage = MemoryStorage::new();
        let mut m = SaveStateManager::new(
            Box::new(LocalSaveStore::new(storage.clone())),
            SaveMedium::SaveBuffer,
        );
        assert_eq!(m.load(), None);
        assert_eq!(m.persist(&[1]), PersistOutcome::NoPath);
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn medium_follows_platform() {
        assert_eq!(
            SaveMedium::for_platform(Platform::Gba),
            SaveMedium::SaveBuffer
        );
        assert_eq!(
            SaveMedium::for_platform(Platform::Gbc),
            SaveMedium::VirtualFile { path: SRAM_FILE }
        );
    }
}

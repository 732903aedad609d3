use thiserror::Error;

use crate::config::{Platform, SessionConfig};
use crate::memory::{LinearMemory, MemoryError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("the native core is not available in this build")]
    Unavailable,

    #[error("the native core is already in use by another session")]
    InUse,

    #[error("native core ABI mismatch: expected {expected}, found {found}")]
    AbiMismatch { expected: i32, found: i32 },

    #[error("the native core refused to start (code {0})")]
    StartFailed(i32),

    #[error("core memory access failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("core filesystem error: {0}")]
    Filesystem(String),
}

/// Named areas of the core's address space, exposed read-only for debugging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryRegion {
    Bios,
    Rom,
    InternalRam,
    WorkRam,
    PaletteRam,
    Vram,
    Oam,
    Io,
    Pixels,
}

/// Arguments of the core's start entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StartParams {
    pub platform: Platform,
    pub flash_size: i32,
    pub save_type: i32,
    pub rtc: bool,
    pub mirroring: bool,
    pub gb_hw_type: i32,
    pub gb_colors: i32,
    pub gb_palette: i32,
    pub gb_border: i32,
    pub disable_lookup: bool,
}

impl StartParams {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            platform: config.platform,
            flash_size: config.cartridge.flash_size,
            save_type: config.cartridge.save_type,
            rtc: config.cartridge.rtc,
            mirroring: config.cartridge.mirroring,
            gb_hw_type: config.effective_hw_type(),
            gb_colors: config.gb.colors,
            gb_palette: config.gb.palette,
            gb_border: config.gb.border,
            disable_lookup: config.disable_lookup,
        }
    }
}

/// Callbacks the core makes into the host while it runs.
///
/// All of these are invoked synchronously from inside [`NativeCore`] calls.
pub trait CoreHost {
    fn rom_size(&self) -> usize;

    /// Fill `dest` (exactly `rom_size()` bytes) with the cartridge image.
    fn copy_rom(&mut self, dest: &mut [u8]);

    /// A frame of RGB565 pixels is ready at `offset`.
    fn render_frame(&mut self, memory: LinearMemory<'_>, offset: usize);

    /// `len16` interleaved stereo samples are ready at `offset`.
    fn write_audio(&mut self, memory: LinearMemory<'_>, offset: usize, len16: usize);

    fn audio_sample_rate(&self) -> u32;

    /// Input mask for `joypad`. Only joypad 0 is wired up.
    fn input_state(&mut self, joypad: u32) -> u16;

    /// Flash/EEPROM contents changed; keep a copy.
    fn commit_save(&mut self, data: &[u8]);

    /// Fill `dest` from the host's save copy. Returns false when the host has
    /// nothing to restore.
    fn restore_save(&mut self, dest: &mut [u8]) -> bool;

    fn save_size(&self) -> usize;

    /// The cartridge asked for a Super Game Boy border.
    fn set_border_on(&mut self);

    fn debug_output(&mut self, text: &str) {
        log::debug!(target: "core", "{text}");
    }
}

/// The core's in-memory filesystem, used by the GB/GBC battery code.
pub trait VirtualFs {
    fn exists(&self, path: &str) -> bool;
    fn read(&self, path: &str) -> Option<Vec<u8>>;
    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), CoreError>;
}

/// A running (or runnable) instance of the native core.
pub trait NativeCore {
    fn start(&mut self, params: &StartParams, host: &mut dyn CoreHost) -> Result<(), CoreError>;

    /// Emulates `cycles` CPU cycles. Frames and audio are delivered to `host`.
    fn advance(&mut self, cycles: u32, host: &mut dyn CoreHost);

    fn stop(&mut self);

    fn is_emulating(&self) -> bool;

    /// Nonzero once the cartridge has written to battery-backed memory.
    fn save_update_counter(&self) -> u32;

    fn reset_save_update_counter(&mut self);

    /// Flushes battery-backed memory to its medium (save buffer via
    /// `commit_save`, or the virtual filesystem).
    fn write_battery(&mut self, host: &mut dyn CoreHost);

    fn memory_region(&self, region: MemoryRegion) -> Option<&[u8]>;

    fn filesystem(&mut self) -> Option<&mut dyn VirtualFs>;
}

/// Produces a core instance. Loading happens once per session.
pub trait CoreLoader {
    fn load(&mut self) -> Result<Box<dyn NativeCore>, CoreError>;
}

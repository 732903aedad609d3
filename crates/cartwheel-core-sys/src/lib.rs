#![allow(
    non_camel_case_types,
    non_snake_case,
    dead_code,
    clippy::upper_case_acronyms,
    clippy::missing_safety_doc
)]

//! Low-level (unsafe) bindings to the native handheld emulation core.
//!
//! This crate mirrors the core's public C ABI (`vbacore.h`). All memory
//! addresses crossing the boundary are byte offsets relative to the base
//! returned by [`VBA_get_heap`]. Most consumers should use the typed adapter
//! in `cartwheel-session` instead of calling these functions directly.

use core::ffi::c_void;
use std::os::raw::{c_char, c_int};

/// ABI revision this crate was written against.
pub const VBA_ABI_VERSION: c_int = 3;

/// `platform` argument of [`VBA_start`] for the Game Boy Advance.
pub const VBA_PLATFORM_GBA: c_int = 1;
/// `platform` argument of [`VBA_start`] for the Game Boy / Game Boy Color.
pub const VBA_PLATFORM_GB: c_int = 0;

/// Host callbacks invoked by the core.
///
/// Every callback receives the `user` pointer registered through
/// [`VBA_set_host`]. Offsets are relative to the heap base.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct vba_host_callbacks {
    /// Size in bytes of the cartridge image the host will provide.
    pub get_rom_size: Option<unsafe extern "C" fn(user: *mut c_void) -> c_int>,
    /// Copy the cartridge image into core memory starting at `dest`.
    pub copy_rom_to_memory: Option<unsafe extern "C" fn(user: *mut c_void, dest: u32)>,
    /// A frame of 16-bit pixels is ready at `pix`.
    pub render_frame: Option<unsafe extern "C" fn(user: *mut c_void, pix: u32)>,
    /// `length16` interleaved stereo 16-bit samples are ready at `samples`.
    pub write_sound: Option<unsafe extern "C" fn(user: *mut c_void, samples: u32, length16: c_int)>,
    pub get_audio_sample_rate: Option<unsafe extern "C" fn(user: *mut c_void) -> c_int>,
    pub get_joypad: Option<unsafe extern "C" fn(user: *mut c_void, joypad: c_int) -> c_int>,
    /// Flash or EEPROM contents at `src` changed; the host keeps a copy.
    pub commit_save: Option<unsafe extern "C" fn(user: *mut c_void, src: u32, size: c_int)>,
    /// Fill `size` bytes at `dest` from the host's save copy.
    pub restore_save_memory:
        Option<unsafe extern "C" fn(user: *mut c_void, dest: u32, size: c_int) -> bool>,
    pub get_save_size: Option<unsafe extern "C" fn(user: *mut c_void) -> c_int>,
    /// The cartridge requested a Super Game Boy border.
    pub set_gb_border_on: Option<unsafe extern "C" fn(user: *mut c_void)>,
    pub dbg_output: Option<unsafe extern "C" fn(user: *mut c_void, text: *const c_char)>,
}

unsafe extern "C" {
    pub fn VBA_abi_version() -> c_int;

    /// Registers the host callbacks. `callbacks` must outlive every later call.
    pub fn VBA_set_host(user: *mut c_void, callbacks: *const vba_host_callbacks);

    /// Base and length of the core's linear memory.
    pub fn VBA_get_heap(len_out: *mut usize) -> *mut u8;

    pub fn VBA_start(
        platform: c_int,
        flash_size: c_int,
        save_type: c_int,
        rtc: c_int,
        mirroring: c_int,
        gb_hw_type: c_int,
        gb_colors: c_int,
        gb_palette: c_int,
        gb_border: c_int,
        disable_lookup: c_int,
    ) -> c_int;
    pub fn VBA_do_cycles(cycles: c_int) -> c_int;
    pub fn VBA_stop();
    pub fn VBA_get_emulating() -> c_int;

    // Region offsets within the heap.
    pub fn VBA_get_bios() -> u32;
    pub fn VBA_get_rom() -> u32;
    pub fn VBA_get_internalRAM() -> u32;
    pub fn VBA_get_workRAM() -> u32;
    pub fn VBA_get_paletteRAM() -> u32;
    pub fn VBA_get_vram() -> u32;
    pub fn VBA_get_pix() -> u32;
    pub fn VBA_get_oam() -> u32;
    pub fn VBA_get_ioMem() -> u32;

    pub fn VBA_get_systemFrameSkip() -> c_int;
    pub fn VBA_set_systemFrameSkip(n: c_int);

    pub fn VBA_get_systemSaveUpdateCounter() -> c_int;
    pub fn VBA_reset_systemSaveUpdateCounter();
    pub fn VBA_emuWriteBattery();
    pub fn VBA_agbPrintFlush();

    // In-memory filesystem used by the GB/GBC cartridge code for battery RAM.
    pub fn VBA_fs_exists(path: *const c_char) -> c_int;
    /// Copies up to `cap` bytes into `out`. Returns the file size, or -1 if the
    /// file does not exist. A null `out` only queries the size.
    pub fn VBA_fs_read(path: *const c_char, out: *mut u8, cap: usize) -> isize;
    pub fn VBA_fs_write(path: *const c_char, data: *const u8, len: usize) -> c_int;
}

//! Adapter from the raw `cartwheel-core-sys` surface to [`NativeCore`].
//!
//! All heap offset arithmetic for the native core happens here, through
//! [`LinearMemory`] views built from the heap base. Without the `native`
//! feature the loader reports [`CoreError::Unavailable`].

use crate::native::{CoreError, CoreLoader, NativeCore};

#[cfg(feature = "native")]
use crate::memory::{LinearMemory, LinearMemoryMut};
#[cfg(feature = "native")]
use crate::native::{CoreHost, MemoryRegion, StartParams, VirtualFs};
#[cfg(feature = "native")]
use cartwheel_core_sys as sys;
#[cfg(feature = "native")]
use log::{debug, error};
#[cfg(feature = "native")]
use std::{
    ffi::{CStr, CString},
    os::raw::{c_char, c_int, c_void},
    sync::atomic::{AtomicBool, Ordering},
};

/// Loads the linked native core.
#[derive(Debug, Default)]
pub struct FfiCoreLoader;

impl CoreLoader for FfiCoreLoader {
    #[cfg(feature = "native")]
    fn load(&mut self) -> Result<Box<dyn NativeCore>, CoreError> {
        let core = FfiCore::open()?;
        Ok(Box::new(core))
    }

    #[cfg(not(feature = "native"))]
    fn load(&mut self) -> Result<Box<dyn NativeCore>, CoreError> {
        Err(CoreError::Unavailable)
    }
}

// The core keeps its state in C globals, so only one instance may exist.
#[cfg(feature = "native")]
static CORE_OPEN: AtomicBool = AtomicBool::new(false);

#[cfg(feature = "native")]
static CALLBACKS: sys::vba_host_callbacks = sys::vba_host_callbacks {
    get_rom_size: Some(cb_get_rom_size),
    copy_rom_to_memory: Some(cb_copy_rom_to_memory),
    render_frame: Some(cb_render_frame),
    write_sound: Some(cb_write_sound),
    get_audio_sample_rate: Some(cb_get_audio_sample_rate),
    get_joypad: Some(cb_get_joypad),
    commit_save: Some(cb_commit_save),
    restore_save_memory: Some(cb_restore_save_memory),
    get_save_size: Some(cb_get_save_size),
    set_gb_border_on: Some(cb_set_gb_border_on),
    dbg_output: Some(cb_dbg_output),
};

#[cfg(feature = "native")]
struct HostSlot {
    host: Option<*mut (dyn CoreHost + 'static)>,
}

/// The native core behind the C ABI.
#[cfg(feature = "native")]
pub struct FfiCore {
    slot: Box<HostSlot>,
    running: bool,
}

#[cfg(feature = "native")]
impl FfiCore {
    pub fn open() -> Result<Self, CoreError> {
        let found = unsafe { sys::VBA_abi_version() };
        if found != sys::VBA_ABI_VERSION {
            return Err(CoreError::AbiMismatch {
                expected: sys::VBA_ABI_VERSION,
                found,
            });
        }
        if CORE_OPEN.swap(true, Ordering::AcqRel) {
            return Err(CoreError::InUse);
        }

        let mut slot = Box::new(HostSlot { host: None });
        let user_ptr: *mut c_void = (&mut *slot) as *mut HostSlot as *mut c_void;
        unsafe { sys::VBA_set_host(user_ptr, &CALLBACKS) };
        debug!("native core ABI {found}");

        Ok(Self {
            slot,
            running: false,
        })
    }

    /// Publishes `host` to the callbacks for the duration of `f`.
    fn with_host<R>(&mut self, host: &mut dyn CoreHost, f: impl FnOnce() -> R) -> R {
        let ptr: *mut (dyn CoreHost + '_) = host;
        // Safety: the erased lifetime never escapes. The slot is cleared before
        // returning, and callbacks only run synchronously inside `f`.
        let ptr: *mut (dyn CoreHost + 'static) = unsafe { std::mem::transmute(ptr) };
        self.slot.host = Some(ptr);
        let out = f();
        self.slot.host = None;
        out
    }

    fn region_offset(region: MemoryRegion) -> u32 {
        unsafe {
            match region {
                MemoryRegion::Bios => sys::VBA_get_bios(),
                MemoryRegion::Rom => sys::VBA_get_rom(),
                MemoryRegion::InternalRam => sys::VBA_get_internalRAM(),
                MemoryRegion::WorkRam => sys::VBA_get_workRAM(),
                MemoryRegion::PaletteRam => sys::VBA_get_paletteRAM(),
                MemoryRegion::Vram => sys::VBA_get_vram(),
                MemoryRegion::Oam => sys::VBA_get_oam(),
                MemoryRegion::Io => sys::VBA_get_ioMem(),
                MemoryRegion::Pixels => sys::VBA_get_pix(),
            }
        }
    }

    fn path_cstr(path: &str) -> Result<CString, CoreError> {
        CString::new(path).map_err(|_| CoreError::Filesystem(format!("invalid path {path:?}")))
    }
}

/// Allocation size of each region inside the core.
#[cfg(feature = "native")]
const fn region_len(region: MemoryRegion) -> usize {
    match region {
        MemoryRegion::Bios => 0x4000,
        MemoryRegion::Rom => 0x200_0000,
        MemoryRegion::InternalRam => 0x8000,
        MemoryRegion::WorkRam => 0x4_0000,
        MemoryRegion::PaletteRam => 0x400,
        MemoryRegion::Vram => 0x2_0000,
        MemoryRegion::Oam => 0x400,
        MemoryRegion::Io => 0x400,
        MemoryRegion::Pixels => 4 * 257 * 226,
    }
}

#[cfg(feature = "native")]
impl NativeCore for FfiCore {
    fn start(&mut self, params: &StartParams, host: &mut dyn CoreHost) -> Result<(), CoreError> {
        let platform = if params.platform.is_gba() {
            sys::VBA_PLATFORM_GBA
        } else {
            sys::VBA_PLATFORM_GB
        };
        let rc = self.with_host(host, || unsafe {
            sys::VBA_start(
                platform,
                params.flash_size,
                params.save_type,
                params.rtc as c_int,
                params.mirroring as c_int,
                params.gb_hw_type,
                params.gb_colors,
                params.gb_palette,
                params.gb_border,
                params.disable_lookup as c_int,
            )
        });
        if rc < 0 {
            return Err(CoreError::StartFailed(rc));
        }
        self.running = true;
        Ok(())
    }

    fn advance(&mut self, cycles: u32, host: &mut dyn CoreHost) {
        let cycles = c_int::try_from(cycles).unwrap_or(c_int::MAX);
        self.with_host(host, || unsafe {
            sys::VBA_do_cycles(cycles);
        });
    }

    fn stop(&mut self) {
        if self.running {
            unsafe { sys::VBA_stop() };
            self.running = false;
        }
    }

    fn is_emulating(&self) -> bool {
        unsafe { sys::VBA_get_emulating() != 0 }
    }

    fn save_update_counter(&self) -> u32 {
        let counter = unsafe { sys::VBA_get_systemSaveUpdateCounter() };
        counter.max(0) as u32
    }

    fn reset_save_update_counter(&mut self) {
        unsafe { sys::VBA_reset_systemSaveUpdateCounter() };
    }

    fn write_battery(&mut self, host: &mut dyn CoreHost) {
        self.with_host(host, || unsafe { sys::VBA_emuWriteBattery() });
    }

    fn memory_region(&self, region: MemoryRegion) -> Option<&[u8]> {
        let offset = Self::region_offset(region) as usize;
        if offset == 0 {
            return None;
        }
        let heap = unsafe { heap() };
        let len = region_len(region).min(heap.len().saturating_sub(offset));
        LinearMemory::new(heap).bytes(offset, len).ok()
    }

    fn filesystem(&mut self) -> Option<&mut dyn VirtualFs> {
        Some(self)
    }
}

#[cfg(feature = "native")]
impl VirtualFs for FfiCore {
    fn exists(&self, path: &str) -> bool {
        let Ok(path) = Self::path_cstr(path) else {
            return false;
        };
        unsafe { sys::VBA_fs_exists(path.as_ptr()) != 0 }
    }

    fn read(&self, path: &str) -> Option<Vec<u8>> {
        let path = Self::path_cstr(path).ok()?;
        let size = unsafe { sys::VBA_fs_read(path.as_ptr(), std::ptr::null_mut(), 0) };
        let size = usize::try_from(size).ok()?;
        let mut out = vec![0u8; size];
        let read = unsafe { sys::VBA_fs_read(path.as_ptr(), out.as_mut_ptr(), out.len()) };
        let read = usize::try_from(read).ok()?;
        out.truncate(read.min(size));
        Some(out)
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), CoreError> {
        let c_path = Self::path_cstr(path)?;
        let rc = unsafe { sys::VBA_fs_write(c_path.as_ptr(), data.as_ptr(), data.len()) };
        if rc != 0 {
            return Err(CoreError::Filesystem(format!(
                "writing {path} failed (code {rc})"
            )));
        }
        Ok(())
    }
}

#[cfg(feature = "native")]
impl Drop for FfiCore {
    fn drop(&mut self) {
        self.stop();
        unsafe { sys::VBA_set_host(std::ptr::null_mut(), &CALLBACKS) };
        CORE_OPEN.store(false, Ordering::Release);
    }
}

#[cfg(feature = "native")]
unsafe fn heap<'a>() -> &'a mut [u8] {
    let mut len = 0usize;
    let base = sys::VBA_get_heap(&mut len);
    if base.is_null() || len == 0 {
        return &mut [];
    }
    std::slice::from_raw_parts_mut(base, len)
}

#[cfg(feature = "native")]
unsafe fn host_from_user<'a>(user: *mut c_void) -> Option<&'a mut dyn CoreHost> {
    if user.is_null() {
        return None;
    }
    let slot = &mut *(user as *mut HostSlot);
    slot.host.map(|host| &mut *host)
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_get_rom_size(user: *mut c_void) -> c_int {
    let Some(host) = host_from_user(user) else {
        return 0;
    };
    c_int::try_from(host.rom_size()).unwrap_or(c_int::MAX)
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_copy_rom_to_memory(user: *mut c_void, dest: u32) {
    let Some(host) = host_from_user(user) else {
        return;
    };
    let len = host.rom_size();
    let mut memory = LinearMemoryMut::new(heap());
    match memory.bytes_mut(dest as usize, len) {
        Ok(buf) => host.copy_rom(buf),
        Err(e) => error!("cannot copy ROM into core memory: {e}"),
    }
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_render_frame(user: *mut c_void, pix: u32) {
    let Some(host) = host_from_user(user) else {
        return;
    };
    host.render_frame(LinearMemory::new(heap()), pix as usize);
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_write_sound(user: *mut c_void, samples: u32, length16: c_int) {
    let Some(host) = host_from_user(user) else {
        return;
    };
    let Ok(len16) = usize::try_from(length16) else {
        error!("negative audio sample count {length16}");
        return;
    };
    host.write_audio(LinearMemory::new(heap()), samples as usize, len16);
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_get_audio_sample_rate(user: *mut c_void) -> c_int {
    let Some(host) = host_from_user(user) else {
        return 0;
    };
    c_int::try_from(host.audio_sample_rate()).unwrap_or(c_int::MAX)
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_get_joypad(user: *mut c_void, joypad: c_int) -> c_int {
    let Some(host) = host_from_user(user) else {
        return 0;
    };
    host.input_state(joypad.max(0) as u32) as c_int
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_commit_save(user: *mut c_void, src: u32, size: c_int) {
    let Some(host) = host_from_user(user) else {
        return;
    };
    let len = size.max(0) as usize;
    match LinearMemory::new(heap()).bytes(src as usize, len) {
        Ok(bytes) => host.commit_save(bytes),
        Err(e) => error!("cannot read committed save: {e}"),
    }
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_restore_save_memory(user: *mut c_void, dest: u32, size: c_int) -> bool {
    let Some(host) = host_from_user(user) else {
        return false;
    };
    let len = size.max(0) as usize;
    let mut memory = LinearMemoryMut::new(heap());
    match memory.bytes_mut(dest as usize, len) {
        Ok(buf) => host.restore_save(buf),
        Err(e) => {
            error!("cannot restore save into core memory: {e}");
            false
        }
    }
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_get_save_size(user: *mut c_void) -> c_int {
    let Some(host) = host_from_user(user) else {
        return 0;
    };
    c_int::try_from(host.save_size()).unwrap_or(c_int::MAX)
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_set_gb_border_on(user: *mut c_void) {
    if let Some(host) = host_from_user(user) {
        host.set_border_on();
    }
}

#[cfg(feature = "native")]
unsafe extern "C" fn cb_dbg_output(user: *mut c_void, text: *const c_char) {
    if text.is_null() {
        return;
    }
    let Some(host) = host_from_user(user) else {
        return;
    };
    let text = CStr::from_ptr(text).to_string_lossy();
    host.debug_output(&text);
}

#[cfg(all(test, not(feature = "native")))]
mod tests {
    use super::*;

    #[test]
    fn loader_reports_unavailable_without_native_feature() {
        let result = FfiCoreLoader.load();
        assert!(matches!(result, Err(CoreError::Unavailable)));
    }
}

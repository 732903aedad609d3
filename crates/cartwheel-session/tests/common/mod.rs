#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cartwheel_session::audio::AudioSink;
use cartwheel_session::config::{Platform, Rotation, SessionConfig};
use cartwheel_session::input::{Control, Controller};
use cartwheel_session::memory::LinearMemory;
use cartwheel_session::native::{
    CoreError, CoreHost, CoreLoader, MemoryRegion, NativeCore, StartParams, VirtualFs,
};
use cartwheel_session::save::SRAM_FILE;

pub const PIX_OFFSET: usize = 0x1000;
pub const AUDIO_OFFSET: usize = 0x30000;
pub const ROM_OFFSET: usize = 0x38000;
pub const HEAP_SIZE: usize = 0x40000;

/// Colour the fake core paints every pixel with (pure red).
pub const FAKE_PIXEL: u16 = 0xF800;
/// Interleaved stereo samples produced per advance.
pub const FAKE_AUDIO_LEN16: usize = 8;

#[derive(Debug, Default)]
pub struct FakeState {
    pub start_params: Option<StartParams>,
    pub advances: usize,
    pub cycles: Vec<u32>,
    pub inputs: Vec<u16>,
    pub save_counter: u32,
    pub counter_resets: usize,
    pub battery: Vec<u8>,
    pub restored_save: Option<Vec<u8>>,
    pub rom: Vec<u8>,
    pub stopped: bool,
    pub request_border_on_next_advance: bool,
}

/// Test handle onto a [`FakeCore`]'s observable state.
#[derive(Clone, Default)]
pub struct FakeHandle {
    pub state: Arc<Mutex<FakeState>>,
    pub fs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl FakeHandle {
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Simulates the cartridge writing battery memory.
    pub fn dirty(&self, battery: &[u8]) {
        self.with(|s| {
            s.battery = battery.to_vec();
            s.save_counter += 1;
        });
    }

    pub fn counter(&self) -> u32 {
        self.with(|s| s.save_counter)
    }

    pub fn fs_file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.lock().unwrap().get(path).cloned()
    }
}

struct FakeFs(Arc<Mutex<HashMap<String, Vec<u8>>>>);

impl VirtualFs for FakeFs {
    fn exists(&self, path: &str) -> bool {
        self.0.lock().unwrap().contains_key(path)
    }

    fn read(&self, path: &str) -> Option<Vec<u8>> {
        self.0.lock().unwrap().get(path).cloned()
    }

    fn write(&mut self, path: &str, data: &[u8]) -> Result<(), CoreError> {
        let mut files = self.0.lock().unwrap();
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

/// In-process stand-in for the native core. Paints a solid frame and a short
/// audio batch on every advance.
pub struct FakeCore {
    heap: Vec<u8>,
    handle: FakeHandle,
    fs: FakeFs,
    platform: Platform,
}

impl FakeCore {
    pub fn new() -> (Self, FakeHandle) {
        let handle = FakeHandle::default();
        let core = Self {
            heap: vec![0; HEAP_SIZE],
            fs: FakeFs(handle.fs.clone()),
            handle: handle.clone(),
            platform: Platform::Gba,
        };
        (core, handle)
    }
}

impl NativeCore for FakeCore {
    fn start(&mut self, params: &StartParams, host: &mut dyn CoreHost) -> Result<(), CoreError> {
        self.platform = params.platform;

        let size = host.rom_size();
        host.copy_rom(&mut self.heap[ROM_OFFSET..ROM_OFFSET + size]);
        let rom = self.heap[ROM_OFFSET..ROM_OFFSET + size].to_vec();

        let mut restored = None;
        if params.platform.is_gba() {
            let save_size = host.save_size();
            if save_size > 0 {
                let mut buf = vec![0; save_size];
                if host.restore_save(&mut buf) {
                    restored = Some(buf);
                }
            }
        } else {
            restored = self.fs.read(SRAM_FILE);
        }

        self.handle.with(|s| {
            s.start_params = Some(*params);
            s.rom = rom;
            if let Some(save) = &restored {
                s.battery = save.clone();
            }
            s.restored_save = restored;
            // Start-up always touches battery memory.
            s.save_counter += 1;
        });
        Ok(())
    }

    fn advance(&mut self, cycles: u32, host: &mut dyn CoreHost) {
        let border = self.handle.with(|s| {
            s.advances += 1;
            s.cycles.push(cycles);
            std::mem::take(&mut s.request_border_on_next_advance)
        });
        if border {
            host.set_border_on();
        }

        for px in self.heap[PIX_OFFSET..AUDIO_OFFSET].chunks_exact_mut(2) {
            px.copy_from_slice(&FAKE_PIXEL.to_le_bytes());
        }
        let audio = AUDIO_OFFSET..AUDIO_OFFSET + FAKE_AUDIO_LEN16 * 2;
        for (i, sample) in self.heap[audio].chunks_exact_mut(2).enumerate() {
            sample.copy_from_slice(&((i as i16) * 0x800).to_le_bytes());
        }

        host.render_frame(LinearMemory::new(&self.heap), PIX_OFFSET);
        host.write_audio(
            LinearMemory::new(&self.heap),
            AUDIO_OFFSET,
            FAKE_AUDIO_LEN16,
        );

        let input = host.input_state(0);
        self.handle.with(|s| s.inputs.push(input));
    }

    fn stop(&mut self) {
        self.handle.with(|s| s.stopped = true);
    }

    fn is_emulating(&self) -> bool {
        self.handle.with(|s| s.start_params.is_some() && !s.stopped)
    }

    fn save_update_counter(&self) -> u32 {
        self.handle.counter()
    }

    fn reset_save_update_counter(&mut self) {
        self.handle.with(|s| {
            s.save_counter = 0;
            s.counter_resets += 1;
        });
    }

    fn write_battery(&mut self, host: &mut dyn CoreHost) {
        let battery = self.handle.with(|s| s.battery.clone());
        if battery.is_empty() {
            return;
        }
        if self.platform.is_gba() {
            host.commit_save(&battery);
        } else {
            let _ = self.fs.write(SRAM_FILE, &battery);
        }
    }

    fn memory_region(&self, region: MemoryRegion) -> Option<&[u8]> {
        match region {
            MemoryRegion::Pixels => Some(&self.heap[PIX_OFFSET..AUDIO_OFFSET]),
            _ => None,
        }
    }

    fn filesystem(&mut self) -> Option<&mut dyn VirtualFs> {
        Some(&mut self.fs)
    }
}

pub struct FakeLoader(pub Option<FakeCore>);

impl CoreLoader for FakeLoader {
    fn load(&mut self) -> Result<Box<dyn NativeCore>, CoreError> {
        match self.0.take() {
            Some(core) => Ok(Box::new(core)),
            None => Err(CoreError::Unavailable),
        }
    }
}

/// A controller whose held controls are set from the test.
#[derive(Clone, Default)]
pub struct ScriptedController {
    held: Arc<Mutex<HashSet<Control>>>,
    pub polls: Arc<Mutex<usize>>,
}

impl ScriptedController {
    pub fn press(&self, control: Control) {
        self.held.lock().unwrap().insert(control);
    }

    pub fn release(&self, control: Control) {
        self.held.lock().unwrap().remove(&control);
    }
}

impl Controller for ScriptedController {
    fn poll(&mut self) {
        *self.polls.lock().unwrap() += 1;
    }

    fn is_down(&self, control: Control) -> bool {
        self.held.lock().unwrap().contains(&control)
    }
}

/// Collects everything pushed to the audio sink.
#[derive(Clone, Default)]
pub struct CapturingSink {
    pub left: Arc<Mutex<Vec<f32>>>,
    pub right: Arc<Mutex<Vec<f32>>>,
}

impl AudioSink for CapturingSink {
    fn frequency(&self) -> u32 {
        48_000
    }

    fn push_stereo(&mut self, left: &[f32], right: &[f32]) {
        self.left.lock().unwrap().extend_from_slice(left);
        self.right.lock().unwrap().extend_from_slice(right);
    }
}

/// Config with no warm-up and no autosave, so tests control save timing.
pub fn test_config(platform: Platform, rotation_degrees: i64) -> SessionConfig {
    let mut config = SessionConfig::new(platform);
    config.rotation = Rotation::from_degrees(rotation_degrees).unwrap();
    config.warmup = Duration::ZERO;
    config.autosave_interval = None;
    config.audio_drift_threshold = None;
    config
}

/// A small deterministic cartridge image.
pub fn test_rom(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

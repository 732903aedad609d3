use log::{error, info, warn};
use std::time::Instant;
use thiserror::Error;

use crate::audio::AudioSink;
use crate::bridge::FrameAndAudioBridge;
use crate::config::SessionConfig;
use crate::input::{Controller, ControllerInputMapper, InputState, Poll};
use crate::memory::LinearMemory;
use crate::native::{CoreError, CoreHost, CoreLoader, MemoryRegion, NativeCore, StartParams};
use crate::rom::{RomError, RomImage, RomLoader, RomSource};
use crate::save::{PersistOutcome, SaveBufferAccess, SaveMedium, SaveStateManager};
use crate::storage::SaveStore;
use crate::video::FrameBuffer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Created,
    AwaitingModule,
    AwaitingRom,
    Configured,
    Running,
    Paused,
    Stopped,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("an error occurred attempting to load the emulation core: {0}")]
    Module(#[source] CoreError),

    #[error(transparent)]
    Rom(#[from] RomError),

    #[error("the emulation core failed to start: {0}")]
    Start(#[source] CoreError),

    #[error("{operation} is not allowed while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

/// Host side of the core callbacks. Lives for the whole session.
pub struct SessionHost {
    rom: Option<RomImage>,
    bridge: FrameAndAudioBridge,
    input: InputState,
    save_buffer: Vec<u8>,
    now: Instant,
}

impl SessionHost {
    fn new(bridge: FrameAndAudioBridge) -> Self {
        Self {
            rom: None,
            bridge,
            input: InputState::default(),
            save_buffer: Vec::new(),
            now: Instant::now(),
        }
    }
}

impl CoreHost for SessionHost {
    fn rom_size(&self) -> usize {
        self.rom.as_ref().map_or(0, RomImage::len)
    }

    fn copy_rom(&mut self, dest: &mut [u8]) {
        let Some(rom) = self.rom.as_ref() else {
            return;
        };
        let len = dest.len().min(rom.len());
        if len != rom.len() {
            warn!(
                "core ROM area is {} bytes, image is {}",
                dest.len(),
                rom.len()
            );
        }
        dest[..len].copy_from_slice(&rom.bytes()[..len]);
    }

    fn render_frame(&mut self, memory: LinearMemory<'_>, offset: usize) {
        self.bridge.render_frame(memory, offset);
    }

    fn write_audio(&mut self, memory: LinearMemory<'_>, offset: usize, len16: usize) {
        self.bridge.write_sound(memory, offset, len16);
    }

    fn audio_sample_rate(&self) -> u32 {
        self.bridge.audio_sample_rate()
    }

    fn input_state(&mut self, joypad: u32) -> u16 {
        if joypad == 0 { self.input.bits() } else { 0 }
    }

    fn commit_save(&mut self, data: &[u8]) {
        self.save_buffer.clear();
        self.save_buffer.extend_from_slice(data);
    }

    fn restore_save(&mut self, dest: &mut [u8]) -> bool {
        if self.save_buffer.len() != dest.len() {
            error!(
                "Incompatible save size: have {}, core wants {}",
                self.save_buffer.len(),
                dest.len()
            );
            return false;
        }
        dest.copy_from_slice(&self.save_buffer);
        true
    }

    fn save_size(&self) -> usize {
        self.save_buffer.len()
    }

    fn set_border_on(&mut self) {
        self.bridge.set_border(true, self.now);
    }
}

impl SaveBufferAccess for SessionHost {
    fn save_buffer(&self) -> &[u8] {
        &self.save_buffer
    }

    fn set_save_buffer(&mut self, bytes: Vec<u8>) {
        self.save_buffer = bytes;
    }
}

/// Drives one emulation session from core load to teardown.
pub struct Session {
    config: SessionConfig,
    state: SessionState,
    core: Option<Box<dyn NativeCore>>,
    host: SessionHost,
    mapper: ControllerInputMapper,
    controller: Box<dyn Controller>,
    saves: SaveStateManager,
    started_at: Option<Instant>,
    check_saves: bool,
    last_save_check: Option<Instant>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        store: Box<dyn SaveStore>,
        sink: Box<dyn AudioSink>,
        controller: Box<dyn Controller>,
    ) -> Self {
        let bridge = FrameAndAudioBridge::new(&config, sink);
        let mapper = ControllerInputMapper::new(config.rotation, config.platform.is_gba());
        let saves = SaveStateManager::new(store, SaveMedium::for_platform(config.platform));
        Self {
            config,
            state: SessionState::Created,
            core: None,
            host: SessionHost::new(bridge),
            mapper,
            controller,
            saves,
            started_at: None,
            check_saves: false,
            last_save_check: None,
        }
    }

    fn expect_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    pub fn load_core(&mut self, loader: &mut dyn CoreLoader) -> Result<(), SessionError> {
        self.expect_state("load_core", &[SessionState::Created])?;
        self.state = SessionState::AwaitingModule;
        match loader.load() {
            Ok(core) => {
                info!("Core loaded.");
                self.core = Some(core);
                self.state = SessionState::AwaitingRom;
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Created;
                Err(SessionError::Module(e))
            }
        }
    }

    /// Validates and takes ownership of the cartridge image. On error the
    /// session is left exactly as it was.
    pub fn set_rom(&mut self, source: RomSource) -> Result<(), SessionError> {
        self.expect_state("set_rom", &[SessionState::AwaitingRom])?;
        let rom = RomLoader::load(source, Some(self.config.platform))?;
        self.host.rom = Some(rom);
        self.state = SessionState::Configured;
        Ok(())
    }

    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        self.expect_state("start", &[SessionState::Configured])?;
        let Some(core) = self.core.as_mut() else {
            return Err(SessionError::InvalidState {
                operation: "start",
                state: self.state,
            });
        };

        self.host.now = now;
        self.host.bridge.init();

        let fingerprint = self
            .host
            .rom
            .as_ref()
            .map(|rom| rom.fingerprint().to_string())
            .unwrap_or_default();
        let path = format!("{}{fingerprint}/sav", self.config.storage_prefix);
        self.saves.set_path(path);

        if let Some(bytes) = self.saves.load() {
            self.saves.restore_into(&bytes, &mut self.host, core.as_mut());
        }

        let params = StartParams::from_config(&self.config);
        if let Err(e) = core.start(&params, &mut self.host) {
            return Err(SessionError::Start(e));
        }

        info!(
            "started {:?} session, {} cycles per frame",
            self.config.platform,
            self.config.cycles_per_frame()
        );
        self.started_at = Some(now);
        self.last_save_check = Some(now);
        self.state = SessionState::Running;
        Ok(())
    }

    /// One display tick: emulate a frame, then poll input. Does nothing unless
    /// the session is running.
    pub fn tick(&mut self, now: Instant) {
        if self.state != SessionState::Running {
            return;
        }
        let Some(core) = self.core.as_mut() else {
            return;
        };

        self.host.now = now;
        self.host.bridge.settle(now);

        if !self.check_saves
            && let Some(started) = self.started_at
            && now.saturating_duration_since(started) >= self.config.warmup
        {
            // Core start-up dirties battery memory; start counting from here.
            core.reset_save_update_counter();
            self.check_saves = true;
        }

        core.advance(self.config.cycles_per_frame(), &mut self.host);

        match self.mapper.poll(self.controller.as_mut()) {
            Poll::Input(state) => self.host.input = state,
            Poll::WaitingForRelease => self.host.input = InputState::default(),
            Poll::PauseRequested => {
                self.host.input = InputState::default();
                self.pause();
                return;
            }
        }

        if let (Some(interval), Some(last)) = (self.config.autosave_interval, self.last_save_check)
            && now.saturating_duration_since(last) >= interval
        {
            self.last_save_check = Some(now);
            self.save_state();
        }
    }

    /// Freezes ticks and persists the save. Returns false when the session was
    /// not running.
    pub fn pause(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        self.state = SessionState::Paused;
        info!("paused");
        self.save_state();
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != SessionState::Paused {
            return false;
        }
        self.mapper.rearm();
        self.host.input = InputState::default();
        self.state = SessionState::Running;
        info!("resumed");
        true
    }

    /// Final save attempt, then releases the core.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        let started = matches!(self.state, SessionState::Running | SessionState::Paused);
        if started {
            self.save_state();
        }
        if let Some(core) = self.core.as_mut()
            && started
        {
            core.stop();
        }
        self.state = SessionState::Stopped;
        info!("stopped");
    }

    /// Toggles the GB/GBC border at runtime.
    pub fn set_border_enabled(&mut self, on: bool, now: Instant) -> bool {
        self.host.now = now;
        self.host.bridge.set_border(on, now)
    }

    /// Persists battery memory if the core reports it dirty. Safe to call at
    /// any time; does nothing before start, during warm-up, or when clean.
    pub fn save_state(&mut self) -> Option<PersistOutcome> {
        if !matches!(self.state, SessionState::Running | SessionState::Paused)
            || self.saves.path().is_none()
            || !self.check_saves
        {
            return None;
        }
        let core = self.core.as_mut()?;
        if core.save_update_counter() == 0 {
            return None;
        }

        info!("saving sram.");
        core.write_battery(&mut self.host);
        let outcome = match self.saves.extract(&self.host, core.as_mut()) {
            Some(bytes) => self.saves.persist(&bytes),
            None => PersistOutcome::NothingToSave,
        };
        // Reset regardless of outcome.
        core.reset_save_update_counter();
        Some(outcome)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn rom(&self) -> Option<&RomImage> {
        self.host.rom.as_ref()
    }

    pub fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.host.bridge.framebuffer()
    }

    pub fn bridge(&self) -> &FrameAndAudioBridge {
        &self.host.bridge
    }

    /// Mask the core reads on its next input poll.
    pub fn input_state(&self) -> InputState {
        self.host.input
    }

    pub fn saves(&self) -> &SaveStateManager {
        &self.saves
    }

    /// True once the warm-up window has passed and dirty signals count.
    pub fn checking_saves(&self) -> bool {
        self.check_saves
    }

    /// True while the loaded core reports it is emulating a cartridge.
    pub fn is_emulating(&self) -> bool {
        self.core.as_ref().is_some_and(|core| core.is_emulating())
    }

    pub fn memory_region(&self, region: MemoryRegion) -> Option<&[u8]> {
        self.core.as_ref()?.memory_region(region)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Running | SessionState::Paused) {
            self.stop();
        }
    }
}

use std::time::Instant;

use crate::audio::{AudioBridge, AudioSink};
use crate::config::SessionConfig;
use crate::memory::LinearMemory;
use crate::video::{FrameBuffer, VideoBridge};

/// Receives the core's render and sound callbacks and owns the host-side
/// buffers they fill.
pub struct FrameAndAudioBridge {
    video: VideoBridge,
    audio: AudioBridge,
}

impl FrameAndAudioBridge {
    pub fn new(config: &SessionConfig, sink: Box<dyn AudioSink>) -> Self {
        Self {
            video: VideoBridge::new(
                config.platform,
                config.gb.border_enabled(),
                config.border_settle,
            ),
            audio: AudioBridge::new(sink, config.audio_drift_threshold, config.debug),
        }
    }

    pub fn init(&mut self) {
        self.video.init_screen();
    }

    pub fn render_frame(&mut self, memory: LinearMemory<'_>, offset: usize) -> bool {
        self.video.draw_frame(memory, offset)
    }

    pub fn write_sound(&mut self, memory: LinearMemory<'_>, offset: usize, len16: usize) {
        self.audio.write_sound(memory, offset, len16);
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn set_border(&mut self, on: bool, now: Instant) -> bool {
        self.video.set_border(on, now)
    }

    pub fn settle(&mut self, now: Instant) {
        self.video.settle(now);
    }

    pub fn video(&self) -> &VideoBridge {
        &self.video
    }

    pub fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.video.framebuffer()
    }
}

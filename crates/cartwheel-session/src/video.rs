use log::{debug, error};
use std::time::{Duration, Instant};

use crate::config::Platform;
use crate::memory::LinearMemory;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
}

impl Geometry {
    pub const GBA: Geometry = Geometry {
        width: 240,
        height: 160,
    };
    pub const GB: Geometry = Geometry {
        width: 162,
        height: 145,
    };
    pub const GB_BORDER: Geometry = Geometry {
        width: 258,
        height: 225,
    };

    pub fn for_platform(platform: Platform, border: bool) -> Self {
        match (platform, border) {
            (Platform::Gba, _) => Self::GBA,
            (_, false) => Self::GB,
            (_, true) => Self::GB_BORDER,
        }
    }

    pub const fn pixel_count(self) -> usize {
        self.width * self.height
    }
}

// round(c / 31 * 255) for every 5-bit channel value.
const CHANNEL_LUT: [u8; 32] = {
    let mut lut = [0u8; 32];
    let mut c = 0;
    while c < 32 {
        lut[c] = ((c * 510 + 31) / 62) as u8;
        c += 1;
    }
    lut
};

/// Expands a 5-bit channel value to 8 bits.
#[inline]
pub fn expand_channel(c: u8) -> u8 {
    CHANNEL_LUT[(c & 0x1F) as usize]
}

/// Decodes one core colour word (red in bits 11..=15, green 6..=10, blue
/// 1..=5) to opaque RGBA.
#[inline]
pub fn decode_color(word: u16) -> [u8; 4] {
    [
        expand_channel((word >> 11) as u8),
        expand_channel((word >> 6) as u8),
        expand_channel((word >> 1) as u8),
        0xFF,
    ]
}

/// Host-side RGBA8888 frame, row-major.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    geometry: Geometry,
    pixels: Vec<u8>,
    visible: bool,
}

impl FrameBuffer {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            pixels: vec![0xFF; geometry.pixel_count() * 4],
            visible: true,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// False while a geometry change is settling.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn reset(&mut self, geometry: Geometry) {
        self.geometry = geometry;
        self.pixels.clear();
        self.pixels.resize(geometry.pixel_count() * 4, 0);
        self.visible = false;
    }
}

/// Pixel half of the frame/audio bridge.
#[derive(Debug)]
pub struct VideoBridge {
    platform: Platform,
    settle: Duration,
    frame: Option<FrameBuffer>,
    border: bool,
    blank_until: Option<Instant>,
    frames_drawn: u64,
    frames_dropped: u64,
}

impl VideoBridge {
    pub fn new(platform: Platform, border: bool, settle: Duration) -> Self {
        Self {
            platform,
            settle,
            frame: None,
            border: border && !platform.is_gba(),
            blank_until: None,
            frames_drawn: 0,
            frames_dropped: 0,
        }
    }

    /// Allocates the framebuffer for the current geometry, filled white.
    pub fn init_screen(&mut self) {
        let geometry = Geometry::for_platform(self.platform, self.border);
        debug!("screen {}x{}", geometry.width, geometry.height);
        self.frame = Some(FrameBuffer::new(geometry));
        self.blank_until = None;
    }

    pub fn border_enabled(&self) -> bool {
        self.border
    }

    /// Switches the border on or off. The framebuffer is cleared, hidden and
    /// resized; frames are dropped until `now + settle`.
    ///
    /// Has no effect on GBA or when the state does not change.
    pub fn set_border(&mut self, on: bool, now: Instant) -> bool {
        if self.platform.is_gba() || self.border == on {
            return false;
        }
        self.border = on;
        let geometry = Geometry::for_platform(self.platform, on);
        match self.frame.as_mut() {
            Some(frame) => frame.reset(geometry),
            None => {
                let mut frame = FrameBuffer::new(geometry);
                frame.reset(geometry);
                self.frame = Some(frame);
            }
        }
        self.blank_until = Some(now + self.settle);
        debug!(
            "border {}: screen {}x{}",
            if on { "on" } else { "off" },
            geometry.width,
            geometry.height
        );
        true
    }

    /// Ends the blank window once the settle delay has elapsed.
    pub fn settle(&mut self, now: Instant) {
        if let Some(until) = self.blank_until
            && now >= until
        {
            self.blank_until = None;
            if let Some(frame) = self.frame.as_mut() {
                frame.visible = true;
            }
        }
    }

    pub fn is_blanked(&self) -> bool {
        self.blank_until.is_some()
    }

    /// Decodes the frame the core just rendered at `offset`. Returns false when
    /// the frame was dropped.
    pub fn draw_frame(&mut self, memory: LinearMemory<'_>, offset: usize) -> bool {
        let Some(frame) = self.frame.as_mut() else {
            self.frames_dropped += 1;
            return false;
        };
        if self.blank_until.is_some() {
            self.frames_dropped += 1;
            return false;
        }

        let count = frame.geometry.pixel_count();
        let words = match memory.words(offset, count) {
            Ok(words) => words,
            Err(e) => {
                error!("dropping frame: {e}");
                self.frames_dropped += 1;
                return false;
            }
        };

        for (px, word) in frame.pixels.chunks_exact_mut(4).zip(words) {
            px.copy_from_slice(&decode_color(word));
        }
        frame.visible = true;
        self.frames_drawn += 1;
        true
    }

    pub fn framebuffer(&self) -> Option<&FrameBuffer> {
        self.frame.as_ref()
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_expansion_rounds() {
        assert_eq!(expand_channel(0), 0);
        assert_eq!(expand_channel(31), 255);
        for c in 0..32u32 {
            let expected = ((c as f64 / 31.0) * 255.0).round() as u8;
            assert_eq!(expand_channel(c as u8), expected, "channel {c}");
        }
    }

    #[test]
    fn decode_is_monotonic_per_channel() {
        let mut prev = [0u8; 3];
        for c in 0..32u16 {
            let rgba = decode_color((c << 11) | (c << 6) | (c << 1));
            for ch in 0..3 {
                assert!(rgba[ch] >= prev[ch]);
            }
            assert_eq!(rgba[3], 0xFF);
            prev = [rgba[0], rgba[1], rgba[2]];
        }
    }

    #[test]
    fn decode_ignores_unused_bits() {
        assert_eq!(decode_color(0x0021), decode_color(0x0020));
        assert_eq!(decode_color(0xF800), [255, 0, 0, 255]);
        assert_eq!(decode_color(0x07C0), [0, 255, 0, 255]);
        assert_eq!(decode_color(0x003E), [0, 0, 255, 255]);
    }

    #[test]
    fn frame_is_decoded_row_major() {
        let mut bridge = VideoBridge::new(Platform::Gba, false, Duration::ZERO);
        bridge.init_screen();

        let count = Geometry::GBA.pixel_count();
        let mut heap = vec![0u8; 4 + count * 2];
        heap[4..6].copy_from_slice(&0xF800u16.to_le_bytes());
        let last = 4 + (count - 1) * 2;
        heap[last..last + 2].copy_from_slice(&0x003Eu16.to_le_bytes());

        assert!(bridge.draw_frame(LinearMemory::new(&heap), 4));
        let pixels = bridge.framebuffer().unwrap().pixels();
        assert_eq!(pixels.len(), 240 * 160 * 4);
        assert_eq!(&pixels[..4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[4..8], &[0, 0, 0, 255]);
        assert_eq!(&pixels[pixels.len() - 4..], &[0, 0, 255, 255]);
    }

    #[test]
    fn out_of_range_frames_are_dropped() {
        let mut bridge = VideoBridge::new(Platform::Gb, false, Duration::ZERO);
        bridge.init_screen();
        let heap = vec![0u8; 64];
        assert!(!bridge.draw_frame(LinearMemory::new(&heap), 0));
        assert_eq!(bridge.frames_dropped(), 1);
        // Untouched: still the initial white fill.
        let pixels = bridge.framebuffer().unwrap().pixels();
        assert!(pixels.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn border_toggle_blanks_until_settled() {
        let start = Instant::now();
        let settle = Duration::from_millis(250);
        let mut bridge = VideoBridge::new(Platform::Gbc, false, settle);
        bridge.init_screen();
        assert_eq!(bridge.framebuffer().unwrap().geometry(), Geometry::GB);

        assert!(bridge.set_border(true, start));
        let frame = bridge.framebuffer().unwrap();
        assert_eq!(frame.geometry(), Geometry::GB_BORDER);
        assert!(!frame.is_visible());
        assert!(frame.pixels().iter().all(|&b| b == 0));

        let heap = vec![0u8; Geometry::GB_BORDER.pixel_count() * 2];
        bridge.settle(start + Duration::from_millis(100));
        assert!(!bridge.draw_frame(LinearMemory::new(&heap), 0));

        bridge.settle(start + settle);
        assert!(!bridge.is_blanked());
        assert!(bridge.draw_frame(LinearMemory::new(&heap), 0));
        assert!(bridge.framebuffer().unwrap().is_visible());
    }

    #[test]
    fn gba_has_no_border() {
        let mut bridge = VideoBridge::new(Platform::Gba, true, Duration::ZERO);
        assert!(!bridge.border_enabled());
        bridge.init_screen();
        assert!(!bridge.set_border(true, Instant::now()));
        assert_eq!(bridge.framebuffer().unwrap().geometry(), Geometry::GBA);
    }
}

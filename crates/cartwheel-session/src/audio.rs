use log::{error, info};
use std::time::{Duration, Instant};

use crate::config::CORE_FRAME_RATE;
use crate::memory::LinearMemory;

/// Delivered half-samples after which one stereo sample is dropped.
pub const DEFAULT_DRIFT_THRESHOLD: u32 = 548;

/// Core samples are signed 16-bit values mixed at this full-scale level.
const SAMPLE_DIVISOR: f32 = 16384.0;

const STATS_WINDOW: Duration = Duration::from_secs(60);

/// Destination for de-interleaved PCM.
pub trait AudioSink {
    /// Output rate in Hz.
    fn frequency(&self) -> u32;

    /// `left` and `right` always have the same length.
    fn push_stereo(&mut self, left: &[f32], right: &[f32]);
}

/// Discards everything. Used for headless runs.
#[derive(Debug, Clone, Copy)]
pub struct NullAudioSink {
    pub frequency: u32,
}

impl Default for NullAudioSink {
    fn default() -> Self {
        Self { frequency: 48_000 }
    }
}

impl AudioSink for NullAudioSink {
    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn push_stereo(&mut self, _left: &[f32], _right: &[f32]) {}
}

struct Stats {
    window_start: Instant,
    samples: u64,
}

/// Audio half of the frame/audio bridge.
pub struct AudioBridge {
    sink: Box<dyn AudioSink>,
    drift_threshold: Option<u32>,
    drift_acc: u32,
    left: Vec<f32>,
    right: Vec<f32>,
    stats: Option<Stats>,
}

impl AudioBridge {
    pub fn new(sink: Box<dyn AudioSink>, drift_threshold: Option<u32>, debug: bool) -> Self {
        Self {
            sink,
            drift_threshold: drift_threshold.filter(|&t| t > 0),
            drift_acc: 0,
            left: Vec::new(),
            right: Vec::new(),
            stats: debug.then(|| Stats {
                window_start: Instant::now(),
                samples: 0,
            }),
        }
    }

    /// Sample rate reported to the core. The core runs slightly slower than
    /// 60 Hz, so the sink rate is scaled to keep its buffer from draining.
    pub fn sample_rate(&self) -> u32 {
        (self.sink.frequency() as f64 * CORE_FRAME_RATE / 60.0).round() as u32
    }

    /// Forwards `len16` interleaved samples found at `offset`.
    pub fn write_sound(&mut self, memory: LinearMemory<'_>, offset: usize, len16: usize) {
        let len16 = self.correct_drift(len16);

        if let Some(stats) = self.stats.as_mut() {
            stats.samples += (len16 >> 1) as u64;
            let elapsed = stats.window_start.elapsed();
            if elapsed >= STATS_WINDOW {
                info!(
                    "audio: {:.1} samples/s",
                    stats.samples as f64 / elapsed.as_secs_f64()
                );
                stats.samples = 0;
                stats.window_start = Instant::now();
            }
        }

        if offset % 2 != 0 {
            error!("audio offset {offset:#x} is not 16-bit aligned");
            return;
        }
        if len16 % 2 != 0 {
            error!("audio sample count {len16} is odd");
            return;
        }

        let words = match memory.words(offset, len16) {
            Ok(words) => words,
            Err(e) => {
                error!("dropping audio: {e}");
                return;
            }
        };

        self.left.clear();
        self.right.clear();
        let mut words = words.map(|w| w as i16 as f32 / SAMPLE_DIVISOR);
        while let (Some(l), Some(r)) = (words.next(), words.next()) {
            self.left.push(l);
            self.right.push(r);
        }
        self.sink.push_stereo(&self.left, &self.right);
    }

    fn correct_drift(&mut self, len16: usize) -> usize {
        let Some(threshold) = self.drift_threshold else {
            return len16;
        };
        self.drift_acc = self.drift_acc.saturating_add((len16 >> 1) as u32);
        if self.drift_acc >= threshold {
            self.drift_acc %= threshold;
            len16.saturating_sub(2)
        } else {
            len16
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<(Vec<f32>, Vec<f32>)>>>);

    impl AudioSink for Capture {
        fn frequency(&self) -> u32 {
            48_000
        }

        fn push_stereo(&mut self, left: &[f32], right: &[f32]) {
            let mut batches = self.0.lock().unwrap();
            batches.push((left.to_vec(), right.to_vec()));
        }
    }

    fn heap_of(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn samples_are_deinterleaved_and_scaled() {
        let capture = Capture::default();
        let mut bridge = AudioBridge::new(Box::new(capture.clone()), None, false);
        let heap = heap_of(&[0x4000, -0x4000, 0x2000, 0]);
        bridge.write_sound(LinearMemory::new(&heap), 0, 4);

        let batches = capture.0.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, vec![1.0, 0.5]);
        assert_eq!(batches[0].1, vec![-1.0, 0.0]);
    }

    #[test]
    fn malformed_batches_are_rejected() {
        let capture = Capture::default();
        let mut bridge = AudioBridge::new(Box::new(capture.clone()), None, false);
        let heap = heap_of(&[1, 2, 3, 4]);
        bridge.write_sound(LinearMemory::new(&heap), 1, 2);
        bridge.write_sound(LinearMemory::new(&heap), 0, 3);
        bridge.write_sound(LinearMemory::new(&heap), 0, 16);
        assert!(capture.0.lock().unwrap().is_empty());
    }

    #[test]
    fn drift_correction_drops_one_stereo_sample() {
        let capture = Capture::default();
        let mut bridge = AudioBridge::new(Box::new(capture.clone()), Some(8), false);
        let heap = heap_of(&[0; 8]);
        // 4 half-samples per call: the second call crosses the threshold.
        bridge.write_sound(LinearMemory::new(&heap), 0, 8);
        bridge.write_sound(LinearMemory::new(&heap), 0, 8);
        bridge.write_sound(LinearMemory::new(&heap), 0, 8);

        let sizes: Vec<usize> = capture
            .0
            .lock()
            .unwrap()
            .iter()
            .map(|(l, _)| l.len())
            .collect();
        assert_eq!(sizes, vec![4, 3, 4]);
    }

    #[test]
    fn reported_rate_tracks_core_frame_rate() {
        let bridge = AudioBridge::new(Box::new(NullAudioSink::default()), None, false);
        assert_eq!(bridge.sample_rate(), 47_782);
    }
}

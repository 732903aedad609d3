use cartwheel_session::audio::AudioSink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Queued audio beyond this many seconds is dropped.
const MAX_BUFFERED_SECS: usize = 1;

type SampleQueue = Arc<Mutex<VecDeque<(f32, f32)>>>;

/// Plays session audio through the default output device.
pub struct CpalSink {
    queue: SampleQueue,
    frequency: u32,
    capacity: usize,
    _stream: cpal::Stream,
}

impl AudioSink for CpalSink {
    fn frequency(&self) -> u32 {
        self.frequency
    }

    fn push_stereo(&mut self, left: &[f32], right: &[f32]) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.extend(left.iter().copied().zip(right.iter().copied()));
        let excess = queue.len().saturating_sub(self.capacity);
        queue.drain(..excess);
    }
}

fn fill<T>(data: &mut [T], channels: usize, queue: &SampleQueue, convert: impl Fn(f32) -> T) {
    let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
    for frame in data.chunks_mut(channels) {
        let (left, right) = queue.pop_front().unwrap_or((0.0, 0.0));
        frame[0] = convert(left);
        if channels > 1 {
            frame[1] = convert(right);
        }
        for extra in frame.iter_mut().skip(2) {
            *extra = convert(0.0);
        }
    }
}

/// Start audio playback using `cpal`.
///
/// Returns `None` (after logging why) when no usable output device exists.
pub fn start_stream() -> Option<CpalSink> {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        warn!("no audio output device; continuing without sound");
        return None;
    };
    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            warn!("no supported output config: {e}");
            return None;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let frequency = config.sample_rate;
    let channels = config.channels as usize;
    let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::new()));
    let err_fn = |err| warn!("cpal stream error: {err}");

    let cb_queue = Arc::clone(&queue);
    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                fill(data, channels, &cb_queue, |s| {
                    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                })
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _| {
                fill(data, channels, &cb_queue, |s| {
                    ((s.clamp(-1.0, 1.0) * 32767.0) as i32 + 32768) as u16
                })
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| fill(data, channels, &cb_queue, |s| s.clamp(-1.0, 1.0)),
            err_fn,
            None,
        ),
        other => {
            warn!("unsupported sample format {other:?}");
            return None;
        }
    };

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to open audio stream: {e}");
            return None;
        }
    };
    if let Err(e) = stream.play() {
        warn!("failed to play stream: {e}");
        return None;
    }

    info!("audio: {frequency} Hz, {channels} channel(s)");
    Some(CpalSink {
        queue,
        frequency,
        capacity: frequency as usize * MAX_BUFFERED_SECS,
        _stream: stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_pads_with_silence_and_extra_channels() {
        let queue: SampleQueue = Arc::new(Mutex::new(VecDeque::from([(0.5, -0.5)])));
        let mut out = [9.0f32; 6];
        fill(&mut out, 3, &queue, |s| s);
        assert_eq!(out, [0.5, -0.5, 0.0, 0.0, 0.0, 0.0]);
        assert!(queue.lock().unwrap().is_empty());
    }
}

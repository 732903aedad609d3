use std::time::{Duration, Instant};

/// Ticks the loop falls behind before it stops trying to catch up.
const MAX_LAG_FRAMES: u32 = 4;

/// Fixed-rate tick source.
///
/// Paced loops sleep until each tick is due. Unpaced loops return
/// immediately with a virtual timestamp advancing by one period per tick, so
/// timers inside the session still see a steady clock.
#[derive(Debug)]
pub struct DisplayLoop {
    frame_time: Duration,
    paced: bool,
    origin: Instant,
    next: Instant,
    ticks: u64,
}

impl DisplayLoop {
    pub fn new(hz: f64, paced: bool) -> Self {
        let frame_time = Duration::from_nanos((1e9_f64 / hz) as u64);
        let origin = Instant::now();
        Self {
            frame_time,
            paced,
            origin,
            next: origin,
            ticks: 0,
        }
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Time since the loop started, on the loop's own clock.
    pub fn elapsed(&self) -> Duration {
        if self.paced {
            self.origin.elapsed()
        } else {
            self.frame_time * self.ticks as u32
        }
    }

    /// Waits for the next tick and returns its timestamp.
    pub fn wait(&mut self) -> Instant {
        self.ticks += 1;
        if !self.paced {
            return self.origin + self.frame_time * self.ticks as u32;
        }

        let now = Instant::now();
        if now < self.next {
            std::thread::sleep(self.next - now);
        } else if now - self.next > self.frame_time * MAX_LAG_FRAMES {
            self.next = now;
        }
        let tick = self.next;
        self.next += self.frame_time;
        tick
    }
}

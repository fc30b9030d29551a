use std::time::{Duration, Instant};

/// Caps a loop at one iteration per `fps_wait`, counting the time already spent
/// in the iteration.
pub struct FpsLimiter {
    fps_control: Instant,
    fps_wait: Duration,
}

impl FpsLimiter {
    pub fn new(fps_wait: Duration) -> Self {
        Self {
            fps_control: Instant::now(),
            fps_wait,
        }
    }

    /// Marks the start of an iteration.
    pub fn begin(&mut self) {
        self.fps_control = Instant::now();
    }

    /// Time left before the iteration budget is spent.
    pub fn remaining(&self) -> Duration {
        self.fps_wait.saturating_sub(self.fps_control.elapsed())
    }

    pub fn wait(&self) {
        let remaining = self.remaining();
        if !remaining.is_zero() {
            spin_sleep::sleep(remaining);
        }
    }
}

/// Counts frames and yields the count once per elapsed second.
pub struct FrameRateCounter {
    window_start: Instant,
    frames: u32,
}

impl Default for FrameRateCounter {
    fn default() -> Self {
        Self::starting_at(Instant::now())
    }
}

impl FrameRateCounter {
    pub fn starting_at(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
        }
    }

    pub fn tick(&mut self) -> Option<u32> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            let fps = self.frames;
            self.frames = 0;
            self.window_start = now;
            return Some(fps);
        }
        None
    }
}

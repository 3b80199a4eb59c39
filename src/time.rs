//! Platform-agnostic time utilities
//!
//! Millisecond timestamps for the frame driver, plus frame-delta and FPS
//! bookkeeping.

#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
pub fn now_ms() -> f64 {
    web_sys::window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

#[cfg(not(all(target_arch = "wasm32", feature = "wasm")))]
pub fn now_ms() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs_f64() * 1000.0
}

/// Elapsed time between successive frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameClock {
    last_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `now_ms` and return the delta to the previous frame.
    ///
    /// The first frame after construction or [`reset`](Self::reset) gets 0;
    /// a clock that runs backwards also yields 0.
    pub fn tick(&mut self, now_ms: f64) -> f64 {
        let dt = match self.last_ms {
            Some(last) if now_ms > last => now_ms - last,
            _ => 0.0,
        };
        self.last_ms = Some(now_ms);
        dt
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}

/// Rolling frames-per-second over the last 60 frames.
pub struct FpsCounter {
    frames: Vec<f64>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            frames: Vec::with_capacity(61),
        }
    }

    pub fn tick(&mut self, now_ms: f64) {
        self.frames.push(now_ms);
        if self.frames.len() > 60 {
            self.frames.remove(0);
        }
    }

    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frames.first(), self.frames.last()) else {
            return 0.0;
        };
        let elapsed = last - first;
        if self.frames.len() < 2 || elapsed <= 0.0 {
            return 0.0;
        }
        (self.frames.len() as f64 - 1.0) / (elapsed / 1000.0)
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

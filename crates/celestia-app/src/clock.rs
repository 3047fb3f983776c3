//! Simulation clock: wall-clock frames drive a Julian date.
//!
//! The date advances by elapsed real seconds times the time rate. Long
//! frames (window drags, breakpoints) are clamped so the simulation does not
//! leap forward.

use std::time::Instant;

use celestia_render::astro::J2000;
use tracing::warn;

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Longest frame the clock will honor, in seconds.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Fastest rate the time controls allow, in simulated seconds per second.
pub const MAX_TIME_RATE: f64 = 1.0e9;

pub struct SimulationClock {
    previous_time: Instant,
    /// Julian date.
    now: f64,
    /// Simulated seconds per real second; negative runs time backwards.
    time_rate: f64,
    paused: bool,
    frame_count: u64,
}

impl SimulationClock {
    pub fn new(start: f64) -> Self {
        Self {
            previous_time: Instant::now(),
            now: start,
            time_rate: 1.0,
            paused: false,
            frame_count: 0,
        }
    }

    /// Measure the time since the previous tick and advance the date.
    /// Returns the new Julian date.
    pub fn tick(&mut self) -> f64 {
        let current_time = Instant::now();
        let frame_time = current_time
            .duration_since(self.previous_time)
            .as_secs_f64();
        self.previous_time = current_time;
        self.advance(frame_time)
    }

    /// Advance by an explicit frame time in seconds.
    pub fn advance(&mut self, mut frame_time: f64) -> f64 {
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }
        if !self.paused {
            self.now += frame_time * self.time_rate / SECONDS_PER_DAY;
        }
        self.frame_count += 1;
        self.now
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn set_now(&mut self, jd: f64) {
        self.now = jd;
    }

    pub fn time_rate(&self) -> f64 {
        self.time_rate
    }

    /// Clamped to `±MAX_TIME_RATE`.
    pub fn set_time_rate(&mut self, rate: f64) {
        self.time_rate = rate.clamp(-MAX_TIME_RATE, MAX_TIME_RATE);
    }

    pub fn faster(&mut self) {
        self.set_time_rate(self.time_rate * 10.0);
    }

    pub fn slower(&mut self) {
        self.set_time_rate(self.time_rate / 10.0);
    }

    pub fn reverse(&mut self) {
        self.time_rate = -self.time_rate;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(J2000)
    }
}

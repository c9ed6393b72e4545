use crate::constants::{PROGRESS_DAMPING, TIMER_SECOND_MS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerTick {
    Idle,
    Running { time_left: u32 },
    Expired,
}

/// Whole-second countdown for one turn.
#[derive(Clone, Debug)]
pub struct RoundTimer {
    duration: u32,
    time_left: u32,
    active: bool,
    carry_ms: u64,
    smoothed_progress: f32,
}

impl RoundTimer {
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            time_left: duration,
            active: false,
            carry_ms: 0,
            smoothed_progress: 0.0,
        }
    }

    pub fn start(&mut self, duration: u32) {
        self.duration = duration;
        self.time_left = duration;
        self.active = true;
        self.carry_ms = 0;
        self.smoothed_progress = 0.0;
    }

    /// Back to the idle state of a freshly built timer.
    pub fn reset(&mut self, duration: u32) {
        *self = Self::new(duration);
    }

    pub fn cancel(&mut self) {
        self.active = false;
        self.carry_ms = 0;
    }

    /// One-second decrement. Expiry deactivates the timer in the same call.
    pub fn tick(&mut self) -> TimerTick {
        if !self.active {
            return TimerTick::Idle;
        }
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            self.active = false;
            self.carry_ms = 0;
            return TimerTick::Expired;
        }
        TimerTick::Running {
            time_left: self.time_left,
        }
    }

    /// Advances by `dt_ms`, ticking once per accumulated second. Stops at the
    /// first expiry so leftover time never leaks into the next turn.
    pub fn step(&mut self, dt_ms: u64) -> TimerTick {
        if !self.active {
            return TimerTick::Idle;
        }
        self.carry_ms += dt_ms;
        let mut last = TimerTick::Running {
            time_left: self.time_left,
        };
        while self.carry_ms >= TIMER_SECOND_MS {
            self.carry_ms -= TIMER_SECOND_MS;
            last = self.tick();
            if last == TimerTick::Expired {
                break;
            }
        }
        self.smooth_progress();
        last
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn progress(&self) -> f32 {
        if self.duration == 0 {
            return 1.0;
        }
        1.0 - self.time_left as f32 / self.duration as f32
    }

    pub fn smoothed_progress(&self) -> f32 {
        self.smoothed_progress
    }

    /// Cosmetic easing toward [`Self::progress`].
    pub fn smooth_progress(&mut self) -> f32 {
        let target = self.progress();
        self.smoothed_progress += (target - self.smoothed_progress) * PROGRESS_DAMPING;
        self.smoothed_progress
    }
}

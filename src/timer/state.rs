//! Countdown state
//!
//! Pure counting logic, independent of how ticks are produced.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    #[default]
    Idle,
    Running,
    Paused,
}

/// Result of advancing the count by one second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A normal tick with the new elapsed count
    Counted(u32),
    /// The bound was reached; the caller must run the finish sequence
    Expired,
    /// The timer is not running
    Ignored,
}

/// Elapsed-seconds counter bounded by a configured duration.
///
/// Every phase change bumps a generation number. Ticks and the finish
/// sequence carry the generation their ticker was started with, so a ticker
/// that outlives a pause or stop cannot touch the count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerState {
    seconds_configured: u32,
    seconds_elapsed: u32,
    phase: TimerPhase,
    generation: u64,
}

impl TimerState {
    pub fn new(seconds_configured: u32) -> Self {
        Self {
            seconds_configured,
            seconds_elapsed: 0,
            phase: TimerPhase::Idle,
            generation: 0,
        }
    }

    pub fn seconds_configured(&self) -> u32 {
        self.seconds_configured
    }

    pub fn seconds_elapsed(&self) -> u32 {
        self.seconds_elapsed
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn enter(&mut self, phase: TimerPhase) {
        self.phase = phase;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Running or paused
    pub fn is_active(&self) -> bool {
        self.phase != TimerPhase::Idle
    }

    /// Enter the running phase. Returns false if already active.
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        self.seconds_elapsed = 0;
        self.enter(TimerPhase::Running);
        true
    }

    /// Suspend counting, keeping the elapsed count.
    pub fn pause(&mut self) -> bool {
        if self.phase != TimerPhase::Running {
            return false;
        }
        self.enter(TimerPhase::Paused);
        true
    }

    /// Continue counting from the paused value.
    pub fn resume(&mut self) -> bool {
        if self.phase != TimerPhase::Paused {
            return false;
        }
        self.enter(TimerPhase::Running);
        true
    }

    /// Halt and reset. Returns the count at the moment of stopping, or `None`
    /// if the timer was idle.
    pub fn stop(&mut self) -> Option<u32> {
        if !self.is_active() {
            return None;
        }
        let elapsed = self.seconds_elapsed;
        self.enter(TimerPhase::Idle);
        self.seconds_elapsed = 0;
        Some(elapsed)
    }

    /// Advance by one second on behalf of the ticker started at `generation`.
    ///
    /// The tick that would make the count reach the configured bound reports
    /// `Expired` instead, so counted ticks range over `1..seconds_configured`.
    /// A bound of zero expires on the first tick.
    pub fn tick(&mut self, generation: u64) -> TickOutcome {
        if self.phase != TimerPhase::Running || generation != self.generation {
            return TickOutcome::Ignored;
        }
        let next = self.seconds_elapsed.saturating_add(1);
        if next < self.seconds_configured {
            self.seconds_elapsed = next;
            TickOutcome::Counted(next)
        } else {
            TickOutcome::Expired
        }
    }

    /// Complete the finish sequence after `Expired`. Returns false if the
    /// timer changed phase since that tick.
    pub fn finish(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.enter(TimerPhase::Idle);
        self.seconds_elapsed = 0;
        true
    }
}

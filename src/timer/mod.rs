//! Recording countdown
//!
//! A bounded one-second ticker with pause/resume/stop and observer events.

pub mod countdown;
pub mod state;

pub use countdown::{CountdownTimer, TimerObserver};
pub use state::{TickOutcome, TimerPhase, TimerState};

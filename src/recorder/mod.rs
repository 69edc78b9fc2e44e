//! Recording state machine
//!
//! - `RecordingCoordinator` drives one recording at a time from start to the
//!   final transformed clip
//! - `RecordingSession` tracks the files and state of that recording

pub mod coordinator;
pub mod state;

pub use coordinator::{RecordingCoordinator, RecordingError, RecordingEvent, StopOutcome};
pub use state::{RecordingSession, RecordingState};

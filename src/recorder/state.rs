//! Recording state management
//!
//! Defines the recording state machine and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Current state of the recording system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// No recording in progress
    #[default]
    Idle,
    /// Camera is writing the raw file
    Recording,
    /// Stop requested, waiting for the file to close
    Finishing,
    /// Crop and resize stages running
    Transforming,
    /// Final clip produced; returns to idle right after
    Complete,
    /// Recording or transform failed; returns to idle right after
    Failed,
}

impl RecordingState {
    /// A session in this state blocks new recordings
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RecordingState::Recording | RecordingState::Finishing | RecordingState::Transforming
        )
    }
}

/// One capture-to-final-file lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: Uuid,

    pub state: RecordingState,

    /// Seconds counted by the timer so far
    pub elapsed_seconds: u32,

    pub max_duration_seconds: u32,

    /// Path the camera writes to
    pub raw_file_path: Option<PathBuf>,

    /// Output of the crop stage
    pub cropped_file_path: Option<PathBuf>,

    /// Output of the resize stage
    pub final_file_path: Option<PathBuf>,

    /// Where the persistence sink stored the clip
    pub saved_file_path: Option<PathBuf>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    /// Why the session failed
    pub error: Option<String>,
}

impl RecordingSession {
    /// Create a new session starting now
    pub fn new(max_duration_seconds: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecordingState::Idle,
            elapsed_seconds: 0,
            max_duration_seconds,
            raw_file_path: None,
            cropped_file_path: None,
            final_file_path: None,
            saved_file_path: None,
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Mark the session finished in `state`
    pub fn end(&mut self, state: RecordingState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

//! Capture graph
//!
//! The set of inputs and outputs wired together for preview and recording.
//! All mutation goes through a [`GraphTransaction`]: changes are staged and
//! become visible only on `commit`, which refuses any configuration without
//! a video input. Dropping a transaction without committing discards it, so
//! readers never observe a half-applied swap.

use super::error::CaptureError;
use super::traits::{CameraPosition, DeviceInput, MediaKind};

/// Live capture graph
#[derive(Debug, Default)]
pub struct CaptureGraph {
    video_input: Option<DeviceInput>,
    audio_input: Option<DeviceInput>,
    preview_attached: bool,
    output_attached: bool,
    running: bool,
    revision: u64,
}

impl CaptureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video_input(&self) -> Option<&DeviceInput> {
        self.video_input.as_ref()
    }

    pub fn audio_input(&self) -> Option<&DeviceInput> {
        self.audio_input.as_ref()
    }

    /// Number of active video inputs (0 before the first commit, 1 after)
    pub fn video_input_count(&self) -> usize {
        usize::from(self.video_input.is_some())
    }

    pub fn active_position(&self) -> Option<CameraPosition> {
        self.video_input.as_ref().and_then(|input| input.position)
    }

    pub fn has_preview(&self) -> bool {
        self.preview_attached
    }

    pub fn has_output(&self) -> bool {
        self.output_attached
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Incremented on every committed transaction
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    /// Open a reconfiguration transaction
    pub fn begin_configuration(&mut self) -> GraphTransaction<'_> {
        GraphTransaction {
            video_input: self.video_input.clone(),
            audio_input: self.audio_input.clone(),
            preview_attached: self.preview_attached,
            output_attached: self.output_attached,
            committed: false,
            graph: self,
        }
    }
}

/// Staged changes to a [`CaptureGraph`]
pub struct GraphTransaction<'a> {
    graph: &'a mut CaptureGraph,
    video_input: Option<DeviceInput>,
    audio_input: Option<DeviceInput>,
    preview_attached: bool,
    output_attached: bool,
    committed: bool,
}

impl GraphTransaction<'_> {
    /// Whether `input` fits: one video and one audio input at most.
    pub fn can_add_input(&self, input: &DeviceInput) -> bool {
        match input.kind {
            MediaKind::Video => self.video_input.is_none(),
            MediaKind::Audio => self.audio_input.is_none(),
        }
    }

    pub fn add_input(&mut self, input: DeviceInput) -> Result<(), CaptureError> {
        if !self.can_add_input(&input) {
            return Err(CaptureError::Configuration(format!(
                "graph already has a {} input",
                input.kind
            )));
        }
        match input.kind {
            MediaKind::Video => self.video_input = Some(input),
            MediaKind::Audio => self.audio_input = Some(input),
        }
        Ok(())
    }

    pub fn remove_input(&mut self, kind: MediaKind) -> Option<DeviceInput> {
        match kind {
            MediaKind::Video => self.video_input.take(),
            MediaKind::Audio => self.audio_input.take(),
        }
    }

    /// Staged video input, if any
    pub fn video_input(&self) -> Option<&DeviceInput> {
        self.video_input.as_ref()
    }

    pub fn attach_preview(&mut self) {
        self.preview_attached = true;
    }

    pub fn attach_output(&mut self) {
        self.output_attached = true;
    }

    /// Apply the staged configuration.
    ///
    /// Fails with [`CaptureError::NoVideoInput`] and leaves the graph
    /// untouched if no video input is staged.
    pub fn commit(mut self) -> Result<(), CaptureError> {
        if self.video_input.is_none() {
            return Err(CaptureError::NoVideoInput);
        }

        self.graph.video_input = self.video_input.take();
        self.graph.audio_input = self.audio_input.take();
        self.graph.preview_attached = self.preview_attached;
        self.graph.output_attached = self.output_attached;
        self.graph.revision += 1;
        self.committed = true;

        tracing::debug!(
            "Capture graph committed (revision {}, camera {:?})",
            self.graph.revision,
            self.graph.active_position()
        );
        Ok(())
    }
}

impl Drop for GraphTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            tracing::debug!("Capture graph transaction rolled back");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{audio_input, video_input};

    fn configured_graph() -> CaptureGraph {
        let mut graph = CaptureGraph::new();
        let mut tx = graph.begin_configuration();
        tx.add_input(video_input(CameraPosition::Front)).unwrap();
        tx.add_input(audio_input()).unwrap();
        tx.attach_output();
        tx.commit().unwrap();
        graph
    }

    #[test]
    fn test_commit_applies_inputs() {
        let graph = configured_graph();
        assert_eq!(graph.video_input_count(), 1);
        assert_eq!(graph.active_position(), Some(CameraPosition::Front));
        assert!(graph.audio_input().is_some());
        assert!(graph.has_output());
        assert_eq!(graph.revision(), 1);
    }

    #[test]
    fn test_second_video_input_rejected() {
        let mut graph = configured_graph();
        let mut tx = graph.begin_configuration();
        let err = tx.add_input(video_input(CameraPosition::Back)).unwrap_err();
        assert!(matches!(err, CaptureError::Configuration(_)));
    }

    #[test]
    fn test_commit_without_video_is_refused() {
        let mut graph = configured_graph();
        let mut tx = graph.begin_configuration();
        tx.remove_input(MediaKind::Video);
        assert!(matches!(tx.commit(), Err(CaptureError::NoVideoInput)));

        assert_eq!(graph.video_input_count(), 1);
        assert_eq!(graph.revision(), 1);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let mut graph = configured_graph();
        {
            let mut tx = graph.begin_configuration();
            tx.remove_input(MediaKind::Video);
            tx.add_input(video_input(CameraPosition::Back)).unwrap();
        }
        assert_eq!(graph.active_position(), Some(CameraPosition::Front));
        assert_eq!(graph.revision(), 1);
    }

    #[test]
    fn test_swap_inside_transaction() {
        let mut graph = configured_graph();
        let mut tx = graph.begin_configuration();
        let old = tx.remove_input(MediaKind::Video).unwrap();
        assert_eq!(old.position, Some(CameraPosition::Front));
        tx.add_input(video_input(CameraPosition::Back)).unwrap();
        tx.commit().unwrap();

        assert_eq!(graph.video_input_count(), 1);
        assert_eq!(graph.active_position(), Some(CameraPosition::Back));
        assert!(graph.audio_input().is_some());
    }
}

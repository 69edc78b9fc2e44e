//! Record command handler
//!
//! Interactive loop on stdin: Enter starts or stops a recording, `s`
//! switches camera, `q` quits. Recorder events are printed as they arrive.

use super::{build_pipeline, load_config};
use crate::capture::{
    CameraPosition, CaptureSession, FfmpegDeviceProvider, FfmpegRecordingSink, FsStorageProbe,
    PreviewLayer, PreviewSurface, VideoOrientation,
};
use crate::export::ExportStage;
use crate::recorder::{RecordingCoordinator, RecordingEvent, RecordingState, StopOutcome};
use crate::utils::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

/// Options for `squarecam record`
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    pub config: Option<PathBuf>,
    pub max_duration: Option<u32>,
    pub library: Option<PathBuf>,
}

/// Preview surface for a terminal: there is nothing to draw, so it only
/// reports what the session does with it.
struct TerminalPreview;

impl PreviewSurface for TerminalPreview {
    fn attach(&self, layer: PreviewLayer) {
        tracing::debug!(
            "Preview attached: {}x{} {:?}",
            layer.resolution.width,
            layer.resolution.height,
            layer.gravity
        );
    }

    fn orientation(&self) -> VideoOrientation {
        VideoOrientation::Portrait
    }

    fn camera_changed(&self, position: CameraPosition) {
        tracing::debug!("Preview now showing the {} camera", position);
    }
}

pub async fn handle_record(options: RecordOptions) -> anyhow::Result<()> {
    let config = load_config(
        options.config.as_deref(),
        options.max_duration,
        options.library,
    )
    .map_err(AppError::from)?;

    let preview: Arc<dyn PreviewSurface> = Arc::new(TerminalPreview);
    let capture = CaptureSession::initialize(
        &config,
        Arc::new(FfmpegDeviceProvider::new(config.devices.clone())),
        Box::new(FfmpegRecordingSink::default()),
        Arc::new(FsStorageProbe::new()),
        &preview,
    )
    .await
    .map_err(AppError::from)?;

    let coordinator =
        RecordingCoordinator::spawn(&config, capture, Arc::new(build_pipeline(&config)));
    let mut events = coordinator.subscribe();

    println!(
        "Ready ({}s max). Enter: start/stop, s: switch camera, q: quit",
        config.max_duration_secs
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => toggle(&coordinator).await,
                    "s" => match coordinator.switch_camera().await {
                        Ok(_) => {}
                        Err(e) => eprintln!("Camera switch failed: {}", e),
                    },
                    "q" => break,
                    other => println!("Unknown command: {:?}", other),
                }
            }
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} recorder events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    if coordinator.state().is_active() {
        if coordinator.stop().await? == StopOutcome::Stopping {
            println!("Stopping the current recording...");
        }
        println!("Waiting for the clip to finish processing...");
        wait_for_idle(&mut events).await;
    }

    coordinator.shutdown().await;
    Ok(())
}

async fn toggle(coordinator: &RecordingCoordinator) {
    match coordinator.state() {
        RecordingState::Idle | RecordingState::Complete | RecordingState::Failed => {
            if let Err(e) = coordinator.start().await {
                eprintln!("Could not start recording: {}", e);
            }
        }
        RecordingState::Recording => {
            if let Err(e) = coordinator.stop().await {
                eprintln!("Could not stop recording: {}", e);
            }
        }
        state => println!("Busy ({:?}), please wait", state),
    }
}

async fn wait_for_idle(events: &mut Receiver<RecordingEvent>) {
    loop {
        match events.recv().await {
            Ok(RecordingEvent::StateChanged(RecordingState::Idle)) | Err(RecvError::Closed) => {
                return
            }
            Ok(event) => print_event(&event),
            Err(RecvError::Lagged(_)) => {}
        }
    }
}

fn print_event(event: &RecordingEvent) {
    match event {
        RecordingEvent::StateChanged(state) => println!("[{:?}]", state),
        RecordingEvent::Tick { label, .. } => println!("  {}", label),
        RecordingEvent::CameraSwitched(position) => println!("Switched to the {} camera", position),
        RecordingEvent::CaptureStarted(path) => println!("Recording to {}", path.display()),
        RecordingEvent::Transform(progress) => match &progress.stage {
            ExportStage::Error { message } => eprintln!("  transform failed: {}", message),
            stage => println!("  {:?} ({:.0}%)", stage, progress.percent),
        },
        RecordingEvent::Completed(output) => match &output.saved {
            Some(saved) => println!("Saved {}", saved.display()),
            None => println!("Finished {} (not saved)", output.final_path.display()),
        },
        RecordingEvent::Error(message) => eprintln!("Error: {}", message),
    }
}

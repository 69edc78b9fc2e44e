//! In-process fakes for the capture, export and persistence contracts

use crate::capture::error::{CaptureError, DeviceError};
use crate::capture::session::CaptureSession;
use crate::capture::traits::{
    CameraPosition, CaptureDeviceProvider, DeviceInput, MediaKind, PreviewLayer, PreviewSurface,
    RecordingCallback, RecordingRequest, RecordingSink, StorageProbe, VideoOrientation,
};
use crate::config::CaptureConfig;
use crate::export::persistence::{PersistenceSink, SavedClip};
use crate::export::pipeline::MediaExporter;
use crate::export::types::{
    ExportError, ExportJob, PersistenceError, Size, TransformStage, VideoTrackInfo,
};
use crate::timer::TimerObserver;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Timer

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    WillStart,
    DidStart,
    Tick(u32),
    WillPause(u32),
    DidPause(u32),
    WillResume(u32),
    DidResume(u32),
    WillStop(u32),
    DidStop(u32),
    WillFinish,
    DidFinish,
}

/// Records every timer callback in order
#[derive(Debug, Default)]
pub struct TimerEventLog {
    events: Mutex<Vec<TimerEvent>>,
}

impl TimerEventLog {
    pub fn events(&self) -> Vec<TimerEvent> {
        self.events.lock().clone()
    }

    pub fn ticks(&self) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TimerEvent::Tick(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: TimerEvent) {
        self.events.lock().push(event);
    }
}

impl TimerObserver for TimerEventLog {
    fn will_start(&self) {
        self.push(TimerEvent::WillStart);
    }
    fn did_start(&self) {
        self.push(TimerEvent::DidStart);
    }
    fn on_tick(&self, elapsed: u32) {
        self.push(TimerEvent::Tick(elapsed));
    }
    fn will_pause(&self, elapsed: u32) {
        self.push(TimerEvent::WillPause(elapsed));
    }
    fn did_pause(&self, elapsed: u32) {
        self.push(TimerEvent::DidPause(elapsed));
    }
    fn will_resume(&self, elapsed: u32) {
        self.push(TimerEvent::WillResume(elapsed));
    }
    fn did_resume(&self, elapsed: u32) {
        self.push(TimerEvent::DidResume(elapsed));
    }
    fn will_stop(&self, elapsed: u32) {
        self.push(TimerEvent::WillStop(elapsed));
    }
    fn did_stop(&self, elapsed: u32) {
        self.push(TimerEvent::DidStop(elapsed));
    }
    fn will_finish(&self) {
        self.push(TimerEvent::WillFinish);
    }
    fn did_finish(&self) {
        self.push(TimerEvent::DidFinish);
    }
}

// ---------------------------------------------------------------------------
// Devices

pub fn video_input(position: CameraPosition) -> DeviceInput {
    DeviceInput {
        id: format!("fake-{}", position),
        name: format!("Fake {} camera", position),
        kind: MediaKind::Video,
        position: Some(position),
        format: "fake".to_string(),
    }
}

pub fn audio_input() -> DeviceInput {
    DeviceInput {
        id: "fake-mic".to_string(),
        name: "Fake microphone".to_string(),
        kind: MediaKind::Audio,
        position: None,
        format: "fake".to_string(),
    }
}

/// Device provider with both cameras and a microphone unless removed
#[derive(Debug, Default)]
pub struct FakeDeviceProvider {
    missing_cameras: Mutex<Vec<CameraPosition>>,
    audio_missing: Mutex<bool>,
    acquisitions: Mutex<Vec<(MediaKind, Option<CameraPosition>)>>,
}

impl FakeDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_camera(&self, position: CameraPosition) {
        self.missing_cameras.lock().push(position);
    }

    pub fn restore_camera(&self, position: CameraPosition) {
        self.missing_cameras.lock().retain(|p| *p != position);
    }

    pub fn remove_audio(&self) {
        *self.audio_missing.lock() = true;
    }

    pub fn acquisitions(&self) -> Vec<(MediaKind, Option<CameraPosition>)> {
        self.acquisitions.lock().clone()
    }
}

#[async_trait]
impl CaptureDeviceProvider for FakeDeviceProvider {
    async fn acquire_input(
        &self,
        kind: MediaKind,
        position: Option<CameraPosition>,
    ) -> Result<DeviceInput, DeviceError> {
        self.acquisitions.lock().push((kind, position));

        match kind {
            MediaKind::Video => match position {
                Some(p) if !self.missing_cameras.lock().contains(&p) => Ok(video_input(p)),
                _ => Err(DeviceError::NotFound { kind, position }),
            },
            MediaKind::Audio => {
                if *self.audio_missing.lock() {
                    Err(DeviceError::NotFound {
                        kind,
                        position: None,
                    })
                } else {
                    Ok(audio_input())
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Recording sink

#[derive(Default)]
struct SinkShared {
    requests: Vec<RecordingRequest>,
    stops: usize,
    switched: Vec<DeviceInput>,
    fail_next_start: Option<String>,
    fail_on_stop: Option<String>,
    active: Option<(PathBuf, RecordingCallback)>,
}

/// Recording sink that completes asynchronously when stopped
pub struct FakeRecordingSink {
    shared: Arc<Mutex<SinkShared>>,
}

/// Inspection and fault injection for a [`FakeRecordingSink`]
#[derive(Clone)]
pub struct FakeSinkHandle {
    shared: Arc<Mutex<SinkShared>>,
}

impl FakeRecordingSink {
    pub fn new() -> (Self, FakeSinkHandle) {
        let shared = Arc::new(Mutex::new(SinkShared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FakeSinkHandle { shared },
        )
    }
}

impl FakeSinkHandle {
    pub fn requests(&self) -> Vec<RecordingRequest> {
        self.shared.lock().requests.clone()
    }

    pub fn stop_count(&self) -> usize {
        self.shared.lock().stops
    }

    pub fn switched_inputs(&self) -> Vec<DeviceInput> {
        self.shared.lock().switched.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    pub fn fail_next_start(&self, message: &str) {
        self.shared.lock().fail_next_start = Some(message.to_string());
    }

    /// The next stop completes with this error instead of a path
    pub fn fail_on_stop(&self, message: &str) {
        self.shared.lock().fail_on_stop = Some(message.to_string());
    }

    /// End the active recording successfully without a stop request
    pub fn finish_active(&self) {
        let active = self.shared.lock().active.take();
        if let Some((path, on_finish)) = active {
            on_finish(Ok(path));
        }
    }

    /// End the active recording with a write failure
    pub fn fail_active(&self, message: &str) {
        let active = self.shared.lock().active.take();
        if let Some((_, on_finish)) = active {
            on_finish(Err(CaptureError::Sink(message.to_string())));
        }
    }
}

#[async_trait]
impl RecordingSink for FakeRecordingSink {
    async fn start_recording(
        &mut self,
        request: RecordingRequest,
        on_finish: RecordingCallback,
    ) -> Result<(), CaptureError> {
        let mut shared = self.shared.lock();
        if let Some(message) = shared.fail_next_start.take() {
            return Err(CaptureError::Sink(message));
        }
        if shared.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        shared.active = Some((request.output_path.clone(), on_finish));
        shared.requests.push(request);
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CaptureError> {
        let (active, failure) = {
            let mut shared = self.shared.lock();
            shared.stops += 1;
            (shared.active.take(), shared.fail_on_stop.take())
        };

        if let Some((path, on_finish)) = active {
            let result = match failure {
                Some(message) => Err(CaptureError::Sink(message)),
                None => Ok(path),
            };
            tokio::spawn(async move {
                on_finish(result);
            });
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    async fn video_input_changed(&mut self, input: &DeviceInput) -> Result<(), CaptureError> {
        self.shared.lock().switched.push(input.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Storage and preview

/// Storage probe reporting a fixed amount of free space
#[derive(Debug)]
pub struct FakeStorage {
    available: Mutex<Option<u64>>,
    failing: bool,
}

impl FakeStorage {
    pub fn new(available: u64) -> Self {
        Self {
            available: Mutex::new(Some(available)),
            failing: false,
        }
    }

    pub fn unknown() -> Self {
        Self {
            available: Mutex::new(None),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            available: Mutex::new(None),
            failing: true,
        }
    }

    pub fn set_available(&self, available: u64) {
        *self.available.lock() = Some(available);
    }
}

impl StorageProbe for FakeStorage {
    fn available_bytes(&self, _dir: &Path) -> std::io::Result<Option<u64>> {
        if self.failing {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "statvfs failed",
            ));
        }
        Ok(*self.available.lock())
    }
}

#[derive(Debug, Default)]
pub struct FakePreview {
    orientation: Mutex<VideoOrientation>,
    layers: Mutex<Vec<PreviewLayer>>,
    cameras: Mutex<Vec<CameraPosition>>,
}

impl FakePreview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_orientation(&self, orientation: VideoOrientation) {
        *self.orientation.lock() = orientation;
    }

    pub fn layers(&self) -> Vec<PreviewLayer> {
        self.layers.lock().clone()
    }

    pub fn cameras(&self) -> Vec<CameraPosition> {
        self.cameras.lock().clone()
    }
}

impl PreviewSurface for FakePreview {
    fn attach(&self, layer: PreviewLayer) {
        self.layers.lock().push(layer);
    }

    fn orientation(&self) -> VideoOrientation {
        *self.orientation.lock()
    }

    fn camera_changed(&self, position: CameraPosition) {
        self.cameras.lock().push(position);
    }
}

// ---------------------------------------------------------------------------
// Export and persistence

/// Exporter that records jobs instead of encoding.
///
/// Probing a path produced by an earlier job reports that job's render size;
/// any other path reports the configured source size.
#[derive(Debug)]
pub struct FakeExporter {
    source: Size,
    fail_stage: Option<TransformStage>,
    delay: Option<Duration>,
    jobs: Mutex<Vec<ExportJob>>,
}

impl FakeExporter {
    pub fn new(source: Size) -> Self {
        Self {
            source,
            fail_stage: None,
            delay: None,
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(source: Size, stage: TransformStage) -> Self {
        Self {
            fail_stage: Some(stage),
            ..Self::new(source)
        }
    }

    /// Make every export take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn jobs(&self) -> Vec<ExportJob> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl MediaExporter for FakeExporter {
    async fn probe(&self, path: &Path) -> Result<VideoTrackInfo, ExportError> {
        let size = self
            .jobs
            .lock()
            .iter()
            .find(|job| job.output == path)
            .map(|job| job.plan.render_size)
            .unwrap_or(self.source);

        Ok(VideoTrackInfo {
            width: size.width,
            height: size.height,
            fps: 30.0,
            duration_secs: 3.0,
            has_audio: true,
        })
    }

    async fn export(&self, job: &ExportJob) -> Result<(), ExportError> {
        self.jobs.lock().push(job.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_stage == Some(job.stage) {
            return Err(ExportError::Ffmpeg(format!("injected {} failure", job.stage)));
        }
        Ok(())
    }
}

/// Persistence sink that remembers what it was asked to save
#[derive(Debug, Default)]
pub struct FakePersistence {
    incompatible: bool,
    failing: bool,
    save_calls: Mutex<usize>,
    saved: Mutex<Vec<PathBuf>>,
}

impl FakePersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incompatible() -> Self {
        Self {
            incompatible: true,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.lock().clone()
    }

    pub fn save_calls(&self) -> usize {
        *self.save_calls.lock()
    }
}

#[async_trait]
impl PersistenceSink for FakePersistence {
    async fn is_compatible(&self, _path: &Path) -> bool {
        !self.incompatible
    }

    async fn save(&self, path: &Path) -> Result<SavedClip, PersistenceError> {
        *self.save_calls.lock() += 1;
        if self.failing {
            return Err(PersistenceError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "library is read-only",
            )));
        }
        self.saved.lock().push(path.to_path_buf());
        Ok(SavedClip {
            path: path.with_extension("saved.mov"),
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures

pub fn test_config(max_duration_secs: u32) -> CaptureConfig {
    CaptureConfig {
        max_duration_secs,
        temp_dir: std::env::temp_dir().join("squarecam-tests"),
        library_dir: std::env::temp_dir().join("squarecam-tests-library"),
        ..CaptureConfig::default()
    }
}

/// A capture session wired to fakes, plus handles to inspect them
pub struct SessionFixture {
    pub provider: Arc<FakeDeviceProvider>,
    pub sink: FakeSinkHandle,
    pub storage: Arc<FakeStorage>,
    pub preview: Arc<FakePreview>,
    pub preview_surface: Arc<dyn PreviewSurface>,
}

impl SessionFixture {
    pub fn new() -> Self {
        let preview = Arc::new(FakePreview::new());
        let (_, sink) = FakeRecordingSink::new();
        Self {
            provider: Arc::new(FakeDeviceProvider::new()),
            sink,
            storage: Arc::new(FakeStorage::new(u64::MAX)),
            preview_surface: preview.clone(),
            preview,
        }
    }

    pub async fn initialize(&mut self, config: &CaptureConfig) -> Result<CaptureSession, CaptureError> {
        let (recording_sink, handle) = FakeRecordingSink::new();
        self.sink = handle;
        CaptureSession::initialize(
            config,
            self.provider.clone(),
            Box::new(recording_sink),
            self.storage.clone(),
            &self.preview_surface,
        )
        .await
    }
}

//! FFmpeg capture backend
//!
//! Devices are named in the configuration and opened by an ffmpeg process
//! per segment. Stopping sends `q` on stdin so ffmpeg finalizes the
//! container; a watcher task joins the segments and reports the result.

use super::error::{CaptureError, DeviceError};
use super::traits::{
    CameraPosition, CaptureDeviceProvider, DeviceInput, MediaKind, RecordingCallback,
    RecordingRequest, RecordingSink,
};
use crate::config::DeviceConfig;
use crate::utils::paths::MOVIE_EXTENSION;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Resolves camera positions and the microphone from [`DeviceConfig`]
#[derive(Debug, Clone)]
pub struct FfmpegDeviceProvider {
    devices: DeviceConfig,
}

impl FfmpegDeviceProvider {
    pub fn new(devices: DeviceConfig) -> Self {
        Self { devices }
    }

    /// Device nodes can be checked up front; other backends only fail once
    /// ffmpeg opens them.
    fn device_present(format: &str, id: &str) -> bool {
        match format {
            "v4l2" => Path::new(id).exists(),
            _ => true,
        }
    }
}

#[async_trait]
impl CaptureDeviceProvider for FfmpegDeviceProvider {
    async fn acquire_input(
        &self,
        kind: MediaKind,
        position: Option<CameraPosition>,
    ) -> Result<DeviceInput, DeviceError> {
        let not_found = || DeviceError::NotFound { kind, position };

        match kind {
            MediaKind::Video => {
                let position = position.ok_or_else(not_found)?;
                let id = self.devices.camera(position).trim();
                if id.is_empty() || !Self::device_present(&self.devices.video_format, id) {
                    return Err(not_found());
                }

                tracing::debug!("Acquired {} camera: {}", position, id);
                Ok(DeviceInput {
                    id: id.to_string(),
                    name: format!("{} camera", position),
                    kind,
                    position: Some(position),
                    format: self.devices.video_format.clone(),
                })
            }
            MediaKind::Audio => {
                let id = self.devices.audio.trim();
                if id.is_empty() {
                    return Err(not_found());
                }

                tracing::debug!("Acquired microphone: {}", id);
                Ok(DeviceInput {
                    id: id.to_string(),
                    name: "microphone".to_string(),
                    kind,
                    position: None,
                    format: self.devices.audio_format.clone(),
                })
            }
        }
    }
}

/// Control messages for the task that owns the ffmpeg processes of one
/// recording
enum SegmentControl {
    Switch(DeviceInput),
    Stop,
}

struct ActiveRecording {
    control: mpsc::UnboundedSender<SegmentControl>,
    finished: Arc<AtomicBool>,
}

/// Recording sink backed by ffmpeg.
///
/// A recording is written as one or more segments. Switching camera while
/// recording closes the current segment and opens the next one on the new
/// device; once the recording stops the segments are joined into the
/// requested output file.
pub struct FfmpegRecordingSink {
    ffmpeg: String,
    active: Option<ActiveRecording>,
}

impl Default for FfmpegRecordingSink {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRecordingSink {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            active: None,
        }
    }
}

#[async_trait]
impl RecordingSink for FfmpegRecordingSink {
    async fn start_recording(
        &mut self,
        request: RecordingRequest,
        on_finish: RecordingCallback,
    ) -> Result<(), CaptureError> {
        if self.is_recording() {
            return Err(CaptureError::AlreadyRecording);
        }

        let writer = SegmentWriter::new(self.ffmpeg.clone(), request);
        let first = writer.spawn_segment().await?;

        let (control, inbox) = mpsc::unbounded_channel();
        let finished = Arc::new(AtomicBool::new(false));
        let watcher_finished = Arc::clone(&finished);

        tokio::spawn(async move {
            let result = writer.run(first, inbox).await;

            match &result {
                Ok(path) => tracing::info!("FFmpeg capture finished: {:?}", path),
                Err(e) => tracing::error!("FFmpeg capture failed: {}", e),
            }

            watcher_finished.store(true, Ordering::SeqCst);
            on_finish(result);
        });

        self.active = Some(ActiveRecording { control, finished });
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CaptureError> {
        if let Some(active) = &self.active {
            let _ = active.control.send(SegmentControl::Stop);
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| !active.finished.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    async fn video_input_changed(&mut self, input: &DeviceInput) -> Result<(), CaptureError> {
        let Some(active) = self.active.as_ref().filter(|_| self.is_recording()) else {
            return Ok(());
        };

        tracing::info!("Camera changed to {}; starting a new segment", input.name);
        active
            .control
            .send(SegmentControl::Switch(input.clone()))
            .map_err(|_| CaptureError::Sink("Recording already finished".to_string()))
    }
}

/// One running ffmpeg capture process
struct Segment {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: JoinHandle<String>,
    path: PathBuf,
}

impl Segment {
    /// Send `q` so ffmpeg finalizes the container
    async fn request_stop(&mut self) {
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::warn!("Failed to signal FFmpeg to stop: {}", e);
            }
            let _ = stdin.flush().await;
        }
    }

    /// Wait for the process to exit and check that it wrote its file
    async fn finish(mut self) -> Result<PathBuf, CaptureError> {
        let status = self.child.wait().await?;
        let stderr = self.stderr.await.unwrap_or_default();

        if !status.success() {
            return Err(CaptureError::Sink(format!(
                "FFmpeg exited with {}: {}",
                status,
                stderr.trim()
            )));
        }
        if !self.path.exists() {
            return Err(CaptureError::Sink(format!(
                "FFmpeg exited without writing {:?}",
                self.path
            )));
        }
        Ok(self.path)
    }
}

/// Owns the segments of one recording and joins them when it ends
struct SegmentWriter {
    ffmpeg: String,
    request: RecordingRequest,
    next_index: usize,
}

impl SegmentWriter {
    fn new(ffmpeg: String, request: RecordingRequest) -> Self {
        Self {
            ffmpeg,
            request,
            next_index: 0,
        }
    }

    async fn spawn_segment(&self) -> Result<Segment, CaptureError> {
        let path = segment_path(&self.request.output_path, self.next_index);
        let mut request = self.request.clone();
        request.output_path = path.clone();

        let args = build_capture_args(&request);
        tracing::info!("Starting FFmpeg capture: {:?}", args);

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::Sink(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = child.stdin.take();
        let stderr = child.stderr.take();
        let stderr = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        Ok(Segment {
            child,
            stdin,
            stderr,
            path,
        })
    }

    async fn run(
        mut self,
        first: Segment,
        mut inbox: mpsc::UnboundedReceiver<SegmentControl>,
    ) -> Result<PathBuf, CaptureError> {
        let mut current = first;
        let mut done = Vec::new();

        loop {
            let control = tokio::select! {
                status = current.child.wait() => {
                    // ffmpeg ended on its own: device lost or write failure
                    if let Err(e) = status {
                        return Err(CaptureError::Io(e));
                    }
                    None
                }
                control = inbox.recv() => Some(control.unwrap_or(SegmentControl::Stop)),
            };

            match control {
                None => {
                    done.push(current.finish().await?);
                    break;
                }
                Some(SegmentControl::Stop) => {
                    current.request_stop().await;
                    done.push(current.finish().await?);
                    break;
                }
                Some(SegmentControl::Switch(input)) => {
                    current.request_stop().await;
                    done.push(current.finish().await?);

                    self.request.video = input;
                    self.next_index += 1;
                    current = self.spawn_segment().await?;
                }
            }
        }

        self.join(done).await
    }

    /// Move a lone segment into place or concatenate several
    async fn join(&self, segments: Vec<PathBuf>) -> Result<PathBuf, CaptureError> {
        let output = self.request.output_path.clone();

        if let [only] = segments.as_slice() {
            tokio::fs::rename(only, &output).await?;
            return Ok(output);
        }

        let list_path = output.with_extension("segments.txt");
        tokio::fs::write(&list_path, concat_list(&segments)).await?;

        let args = build_concat_args(&list_path, &output);
        tracing::info!("Joining {} segments: {:?}", segments.len(), args);

        let result = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await;

        let _ = tokio::fs::remove_file(&list_path).await;

        let output_status = result
            .map_err(|e| CaptureError::Sink(format!("Failed to start FFmpeg: {}", e)))?;
        if !output_status.status.success() {
            // Segments stay on disk for recovery
            return Err(CaptureError::Sink(format!(
                "Joining segments failed with {}: {}",
                output_status.status,
                String::from_utf8_lossy(&output_status.stderr).trim()
            )));
        }

        for segment in &segments {
            if let Err(e) = tokio::fs::remove_file(segment).await {
                tracing::warn!("Failed to remove segment {:?}: {}", segment, e);
            }
        }
        Ok(output)
    }
}

/// `CLIP.mov` -> `CLIP.part0.mov`
fn segment_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    output.with_file_name(format!("{}.part{}.{}", stem, index, MOVIE_EXTENSION))
}

/// Input list for ffmpeg's concat demuxer
fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

/// Command line that joins segments without re-encoding
pub fn build_concat_args(list: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list.to_string_lossy().to_string(),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "mov".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

/// Command line for one camera recording
pub fn build_capture_args(request: &RecordingRequest) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        request.video.format.clone(),
        "-framerate".to_string(),
        request.frame_rate.to_string(),
        "-video_size".to_string(),
        format!("{}x{}", request.resolution.width, request.resolution.height),
        "-i".to_string(),
        request.video.id.clone(),
    ];

    if let Some(audio) = &request.audio {
        args.extend([
            "-f".to_string(),
            audio.format.clone(),
            "-i".to_string(),
            audio.id.clone(),
        ]);
    }

    if request.stabilization {
        args.extend(["-vf".to_string(), "deshake".to_string()]);
    }

    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "18".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ]);

    if request.audio.is_some() {
        args.extend([
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
        ]);
    }

    args.extend([
        "-metadata:s:v:0".to_string(),
        format!("rotate={}", request.orientation.rotation_degrees()),
        "-f".to_string(),
        "mov".to_string(),
        request.output_path.to_string_lossy().to_string(),
    ]);

    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::traits::{Resolution, VideoOrientation};
    use crate::testing::{audio_input, video_input};
    use std::path::PathBuf;

    fn request(audio: bool, stabilization: bool) -> RecordingRequest {
        RecordingRequest {
            output_path: PathBuf::from("/tmp/CLIP.mov"),
            orientation: VideoOrientation::Portrait,
            video: video_input(CameraPosition::Front),
            audio: audio.then(audio_input),
            resolution: Resolution {
                width: 640,
                height: 480,
            },
            frame_rate: 30,
            stabilization,
        }
    }

    fn devices(front: &str) -> DeviceConfig {
        DeviceConfig {
            video_format: "v4l2".to_string(),
            audio_format: "pulse".to_string(),
            front: front.to_string(),
            back: String::new(),
            audio: "default".to_string(),
        }
    }

    #[test]
    fn test_capture_args_with_audio() {
        let args = build_capture_args(&request(true, true));
        let inputs: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(inputs, vec!["fake-front", "fake-mic"]);
        assert!(args.contains(&"deshake".to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"rotate=90".to_string()));
        assert!(args.contains(&"640x480".to_string()));
        assert_eq!(args.last().map(|s| s.as_str()), Some("/tmp/CLIP.mov"));
    }

    #[test]
    fn test_capture_args_video_only() {
        let args = build_capture_args(&request(false, false));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(!args.contains(&"deshake".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
    }

    #[tokio::test]
    async fn test_provider_resolves_existing_device_node() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let provider = FfmpegDeviceProvider::new(devices(&node.path().to_string_lossy()));

        let input = provider
            .acquire_input(MediaKind::Video, Some(CameraPosition::Front))
            .await
            .unwrap();
        assert_eq!(input.position, Some(CameraPosition::Front));
        assert_eq!(input.format, "v4l2");
    }

    #[tokio::test]
    async fn test_provider_missing_camera_is_not_found() {
        let provider = FfmpegDeviceProvider::new(devices("/dev/squarecam-missing"));

        let err = provider
            .acquire_input(MediaKind::Video, Some(CameraPosition::Front))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DeviceError::NotFound {
                kind: MediaKind::Video,
                position: Some(CameraPosition::Front)
            }
        );

        // Unconfigured back camera
        assert!(provider
            .acquire_input(MediaKind::Video, Some(CameraPosition::Back))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_provider_microphone() {
        let provider = FfmpegDeviceProvider::new(devices("/dev/video0"));
        let input = provider.acquire_input(MediaKind::Audio, None).await.unwrap();
        assert_eq!(input.id, "default");
        assert_eq!(input.position, None);
    }

    #[tokio::test]
    async fn test_idle_sink_stop_is_noop() {
        let mut sink = FfmpegRecordingSink::default();
        assert!(!sink.is_recording());
        sink.stop_recording().await.unwrap();
        sink.video_input_changed(&video_input(CameraPosition::Back))
            .await
            .unwrap();
    }

    #[test]
    fn test_segment_paths() {
        let output = Path::new("/tmp/rec/CLIP.mov");
        assert_eq!(
            segment_path(output, 0),
            PathBuf::from("/tmp/rec/CLIP.part0.mov")
        );
        assert_eq!(
            segment_path(output, 3),
            PathBuf::from("/tmp/rec/CLIP.part3.mov")
        );
    }

    #[test]
    fn test_concat_list_quotes_paths() {
        let list = concat_list(&[
            PathBuf::from("/tmp/a.part0.mov"),
            PathBuf::from("/tmp/it's.part1.mov"),
        ]);
        assert_eq!(
            list,
            "file '/tmp/a.part0.mov'\nfile '/tmp/it'\\''s.part1.mov'\n"
        );
    }

    #[test]
    fn test_concat_args_copy_streams() {
        let args = build_concat_args(Path::new("/tmp/list.txt"), Path::new("/tmp/CLIP.mov"));
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-safe") + 1], "0");
        assert_eq!(args[pos("-i") + 1], "/tmp/list.txt");
        assert_eq!(args[pos("-c") + 1], "copy");
        assert_eq!(args.last().map(|s| s.as_str()), Some("/tmp/CLIP.mov"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;
        use tokio::sync::oneshot;

        /// Stand-in for ffmpeg: logs its arguments, waits for `q` on stdin
        /// and writes its last argument.
        fn fake_ffmpeg(dir: &Path) -> (PathBuf, PathBuf) {
            let log = dir.join("calls.log");
            let script = dir.join("ffmpeg");
            std::fs::write(
                &script,
                format!(
                    "#!/bin/sh\nout=\"\"\nfor arg in \"$@\"; do out=\"$arg\"; done\n\
                     echo \"$*\" >> '{}'\nread -r _\nprintf frames > \"$out\"\n",
                    log.display()
                ),
            )
            .unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            (script, log)
        }

        fn request_to(output: PathBuf) -> RecordingRequest {
            RecordingRequest {
                output_path: output,
                ..request(true, false)
            }
        }

        async fn record(
            sink: &mut FfmpegRecordingSink,
            output: PathBuf,
        ) -> oneshot::Receiver<Result<PathBuf, String>> {
            let (tx, rx) = oneshot::channel();
            sink.start_recording(
                request_to(output),
                Box::new(move |result| {
                    let _ = tx.send(result.map_err(|e| e.to_string()));
                }),
            )
            .await
            .unwrap();
            rx
        }

        async fn outcome(rx: oneshot::Receiver<Result<PathBuf, String>>) -> Result<PathBuf, String> {
            tokio::time::timeout(Duration::from_secs(10), rx)
                .await
                .unwrap()
                .unwrap()
        }

        #[tokio::test]
        async fn test_single_segment_lands_at_output() {
            let dir = tempfile::tempdir().unwrap();
            let (ffmpeg, log) = fake_ffmpeg(dir.path());
            let mut sink = FfmpegRecordingSink::new(ffmpeg.to_string_lossy());
            let output = dir.path().join("CLIP.mov");

            let rx = record(&mut sink, output.clone()).await;
            assert!(sink.is_recording());
            sink.stop_recording().await.unwrap();

            assert_eq!(outcome(rx).await, Ok(output.clone()));
            assert!(output.exists());
            assert!(!dir.path().join("CLIP.part0.mov").exists());
            assert!(!sink.is_recording());
            assert_eq!(std::fs::read_to_string(log).unwrap().lines().count(), 1);
        }

        #[tokio::test]
        async fn test_camera_switch_records_new_device_and_joins_segments() {
            let dir = tempfile::tempdir().unwrap();
            let (ffmpeg, log) = fake_ffmpeg(dir.path());
            let mut sink = FfmpegRecordingSink::new(ffmpeg.to_string_lossy());
            let output = dir.path().join("CLIP.mov");

            let rx = record(&mut sink, output.clone()).await;
            sink.video_input_changed(&video_input(CameraPosition::Back))
                .await
                .unwrap();
            sink.stop_recording().await.unwrap();

            assert_eq!(outcome(rx).await, Ok(output.clone()));
            assert!(output.exists());

            let calls = std::fs::read_to_string(log).unwrap();
            let calls: Vec<_> = calls.lines().collect();
            assert_eq!(calls.len(), 3);
            assert!(calls[0].contains("-i fake-front"));
            assert!(calls[0].ends_with("CLIP.part0.mov"));
            assert!(calls[1].contains("-i fake-back"));
            assert!(calls[1].ends_with("CLIP.part1.mov"));
            assert!(calls[2].contains("-f concat"));
            assert!(calls[2].ends_with("CLIP.mov"));

            assert!(!dir.path().join("CLIP.part0.mov").exists());
            assert!(!dir.path().join("CLIP.part1.mov").exists());
            assert!(!dir.path().join("CLIP.segments.txt").exists());
        }

        #[tokio::test]
        async fn test_ffmpeg_exiting_on_its_own_reports_failure() {
            let dir = tempfile::tempdir().unwrap();
            let mut sink = FfmpegRecordingSink::new("false");

            let rx = record(&mut sink, dir.path().join("CLIP.mov")).await;
            let err = outcome(rx).await.unwrap_err();
            assert!(err.contains("FFmpeg exited with"));
            assert!(!sink.is_recording());
        }
    }
}

//! Camera capture
//!
//! The capture graph, the session that owns it, and the ffmpeg backend that
//! provides devices and file recording.

pub mod error;
pub mod ffmpeg;
pub mod graph;
pub mod session;
pub mod storage;
pub mod traits;

pub use error::{CaptureError, DeviceError};
pub use ffmpeg::{FfmpegDeviceProvider, FfmpegRecordingSink};
pub use graph::{CaptureGraph, GraphTransaction};
pub use session::CaptureSession;
pub use storage::FsStorageProbe;
pub use traits::{
    CameraPosition, CaptureDeviceProvider, DeviceInput, MediaKind, PreviewLayer, PreviewSurface,
    RecordingCallback, RecordingRequest, RecordingSink, Resolution, StorageProbe, VideoGravity,
    VideoOrientation,
};

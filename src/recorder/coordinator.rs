//! Recording coordinator
//!
//! Binds the countdown timer, the capture session and the transform pipeline
//! into one state machine:
//!
//! ```text
//! Idle -> Recording -> Finishing -> Transforming -> Complete -> Idle
//!              \____________\______________\______> Failed -> Idle
//! ```
//!
//! The machine lives on a single task. User commands, timer events, capture
//! completions and pipeline results all arrive there as messages, so a timer
//! finish racing a user stop is resolved by arrival order. Messages carry the
//! session id they belong to; anything addressed to an older session is
//! dropped.

use super::state::{RecordingSession, RecordingState};
use crate::capture::{CameraPosition, CaptureError, CaptureSession};
use crate::config::CaptureConfig;
use crate::export::{ExportProgress, PipelineError, PipelineOutput, TransformPipeline};
use crate::timer::{CountdownTimer, TimerObserver};
use crate::utils::format_duration;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Events emitted during recording
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// The state machine moved
    StateChanged(RecordingState),
    /// Timer tick with the formatted elapsed time
    Tick { elapsed: u32, label: String },
    /// The active camera changed
    CameraSwitched(CameraPosition),
    /// The camera started writing this file
    CaptureStarted(PathBuf),
    /// Transform pipeline progress
    Transform(ExportProgress),
    /// The final clip is ready
    Completed(PipelineOutput),
    /// Error occurred
    Error(String),
}

/// Recording coordinator errors
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("A recording session is already active ({0:?})")]
    AlreadyActive(RecordingState),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Recording coordinator has shut down")]
    Closed,
}

/// What a stop request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The recording is being finalized
    Stopping,
    /// Nothing was recording
    NoOp,
}

enum Command {
    Start {
        reply: oneshot::Sender<Result<PathBuf, RecordingError>>,
    },
    Stop {
        reply: oneshot::Sender<StopOutcome>,
    },
    SwitchCamera {
        reply: oneshot::Sender<Result<CameraPosition, RecordingError>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    TimerTick {
        session: Uuid,
        elapsed: u32,
    },
    TimerFinished {
        session: Uuid,
    },
    CaptureFinished {
        session: Uuid,
        result: Result<PathBuf, CaptureError>,
    },
    TransformProgress {
        session: Uuid,
        progress: ExportProgress,
    },
    TransformFinished {
        session: Uuid,
        result: Result<PipelineOutput, PipelineError>,
    },
}

/// Forwards timer callbacks to the coordinator task, tagged with the
/// session that was current when the timer started.
struct TimerBridge {
    commands: mpsc::WeakUnboundedSender<Command>,
    session: Mutex<Option<Uuid>>,
}

impl TimerBridge {
    fn send(&self, make: impl FnOnce(Uuid) -> Command) {
        let Some(session) = *self.session.lock() else {
            return;
        };
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(make(session));
        }
    }
}

impl TimerObserver for TimerBridge {
    fn on_tick(&self, elapsed: u32) {
        self.send(|session| Command::TimerTick { session, elapsed });
    }

    fn did_finish(&self) {
        self.send(|session| Command::TimerFinished { session });
    }
}

/// Handle to the recording state machine. Cheap to clone.
#[derive(Clone)]
pub struct RecordingCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<RecordingState>>,
    last_session: Arc<RwLock<Option<RecordingSession>>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl RecordingCoordinator {
    /// Take ownership of the capture session and start the coordinator task.
    pub fn spawn(
        config: &CaptureConfig,
        capture: CaptureSession,
        pipeline: Arc<TransformPipeline>,
    ) -> Self {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);
        let state = Arc::new(RwLock::new(RecordingState::Idle));
        let last_session = Arc::new(RwLock::new(None));

        let bridge = Arc::new(TimerBridge {
            commands: commands.downgrade(),
            session: Mutex::new(None),
        });

        let machine = StateMachine {
            capture,
            pipeline,
            timer: CountdownTimer::new(config.max_duration_secs, bridge.clone()),
            bridge,
            commands: commands.downgrade(),
            max_duration_secs: config.max_duration_secs,
            current: None,
            state: Arc::clone(&state),
            last_session: Arc::clone(&last_session),
            event_tx: event_tx.clone(),
        };
        tokio::spawn(machine.run(inbox));

        Self {
            commands,
            state,
            last_session,
            event_tx,
        }
    }

    /// Start a recording and return the raw file path.
    ///
    /// Rejected with [`RecordingError::AlreadyActive`] while a session is
    /// recording, finishing or transforming.
    pub async fn start(&self) -> Result<PathBuf, RecordingError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { reply })?;
        rx.await.map_err(|_| RecordingError::Closed)?
    }

    /// Stop the current recording. Stopping when not recording is a no-op.
    pub async fn stop(&self) -> Result<StopOutcome, RecordingError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.map_err(|_| RecordingError::Closed)
    }

    /// Toggle between front and back camera
    pub async fn switch_camera(&self) -> Result<CameraPosition, RecordingError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SwitchCamera { reply })?;
        rx.await.map_err(|_| RecordingError::Closed)?
    }

    /// Get the current recording state
    pub fn state(&self) -> RecordingState {
        *self.state.read()
    }

    /// Snapshot of the current or most recent session
    pub fn last_session(&self) -> Option<RecordingSession> {
        self.last_session.read().clone()
    }

    /// Subscribe to recording events
    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// Stop the timer and the capture session and end the coordinator task.
    /// A transform already running is left to finish on its own.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    fn send(&self, command: Command) -> Result<(), RecordingError> {
        self.commands.send(command).map_err(|_| RecordingError::Closed)
    }
}

struct StateMachine {
    capture: CaptureSession,
    pipeline: Arc<TransformPipeline>,
    timer: CountdownTimer,
    bridge: Arc<TimerBridge>,
    commands: mpsc::WeakUnboundedSender<Command>,
    max_duration_secs: u32,
    current: Option<RecordingSession>,
    state: Arc<RwLock<RecordingState>>,
    last_session: Arc<RwLock<Option<RecordingSession>>>,
    event_tx: broadcast::Sender<RecordingEvent>,
}

impl StateMachine {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Recording coordinator started");

        while let Some(command) = inbox.recv().await {
            match command {
                Command::Start { reply } => {
                    let _ = reply.send(self.start().await);
                }
                Command::Stop { reply } => {
                    let _ = reply.send(self.stop().await);
                }
                Command::SwitchCamera { reply } => {
                    let _ = reply.send(self.switch_camera().await);
                }
                Command::Shutdown { reply } => {
                    self.timer.stop();
                    self.capture.shutdown().await;
                    let _ = reply.send(());
                    break;
                }
                Command::TimerTick { session, elapsed } => self.on_tick(session, elapsed),
                Command::TimerFinished { session } => self.on_timer_finished(session).await,
                Command::CaptureFinished { session, result } => {
                    self.on_capture_finished(session, result).await
                }
                Command::TransformProgress { session, progress } => {
                    if self.is_current(session) {
                        self.emit(RecordingEvent::Transform(progress));
                    }
                }
                Command::TransformFinished { session, result } => {
                    self.on_transform_finished(session, result)
                }
            }
        }

        tracing::debug!("Recording coordinator stopped");
    }

    fn current_state(&self) -> RecordingState {
        self.current
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(RecordingState::Idle)
    }

    fn is_current(&self, id: Uuid) -> bool {
        self.current.as_ref().map(|s| s.id == id).unwrap_or(false)
    }

    async fn start(&mut self) -> Result<PathBuf, RecordingError> {
        let state = self.current_state();
        if state.is_active() {
            tracing::warn!("Start rejected: session already {:?}", state);
            return Err(RecordingError::AlreadyActive(state));
        }

        let mut session = RecordingSession::new(self.max_duration_secs);
        let id = session.id;
        tracing::info!("Starting recording session {}", id);

        let commands = self.commands.clone();
        let on_finish = Box::new(move |result: Result<PathBuf, CaptureError>| {
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(Command::CaptureFinished {
                    session: id,
                    result,
                });
            }
        });

        match self.capture.start_recording(on_finish).await {
            Ok(path) => {
                session.raw_file_path = Some(path.clone());
                self.current = Some(session);

                *self.bridge.session.lock() = Some(id);
                self.timer.start();

                self.emit(RecordingEvent::CaptureStarted(path.clone()));
                self.set_state(RecordingState::Recording);
                Ok(path)
            }
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.current = Some(session);
                self.fail(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn stop(&mut self) -> StopOutcome {
        if self.current_state() != RecordingState::Recording {
            tracing::debug!("Stop ignored in state {:?}", self.current_state());
            return StopOutcome::NoOp;
        }

        tracing::info!("Recording stopped by user");
        self.timer.stop();
        self.finish_capture().await;
        StopOutcome::Stopping
    }

    async fn switch_camera(&mut self) -> Result<CameraPosition, RecordingError> {
        let position = self.capture.switch_camera().await?;
        self.emit(RecordingEvent::CameraSwitched(position));
        Ok(position)
    }

    fn on_tick(&mut self, id: Uuid, elapsed: u32) {
        if !self.is_current(id) || self.current_state() != RecordingState::Recording {
            return;
        }
        if let Some(session) = self.current.as_mut() {
            session.elapsed_seconds = elapsed;
        }
        self.publish_session();
        self.emit(RecordingEvent::Tick {
            elapsed,
            label: format_duration(elapsed),
        });
    }

    async fn on_timer_finished(&mut self, id: Uuid) {
        if !self.is_current(id) || self.current_state() != RecordingState::Recording {
            return;
        }

        tracing::info!("Maximum duration reached ({}s)", self.max_duration_secs);
        if let Some(session) = self.current.as_mut() {
            session.elapsed_seconds = self.max_duration_secs;
        }
        self.finish_capture().await;
    }

    /// Recording -> Finishing. The capture completion callback takes it from
    /// here.
    async fn finish_capture(&mut self) {
        self.set_state(RecordingState::Finishing);

        if let Err(e) = self.capture.stop_recording().await {
            tracing::error!("Failed to stop recording: {}", e);
            self.fail(e.to_string());
        }
    }

    async fn on_capture_finished(&mut self, id: Uuid, result: Result<PathBuf, CaptureError>) {
        let state = self.current_state();
        if !self.is_current(id)
            || !matches!(state, RecordingState::Recording | RecordingState::Finishing)
        {
            tracing::debug!("Ignoring stale capture completion for {}", id);
            return;
        }

        // The sink may end the recording on its own (write failure, device lost)
        if state == RecordingState::Recording {
            tracing::info!("Recording ended by the capture sink");
            self.timer.stop();
            self.set_state(RecordingState::Finishing);
        }

        match result {
            Ok(path) => {
                tracing::info!("Capture finished: {:?}", path);
                if let Some(session) = self.current.as_mut() {
                    session.raw_file_path = Some(path.clone());
                }
                self.set_state(RecordingState::Transforming);
                self.spawn_transform(id, path);
            }
            Err(e) => {
                tracing::error!("Recording failed: {}", e);
                self.fail(e.to_string());
            }
        }
    }

    fn spawn_transform(&self, id: Uuid, raw: PathBuf) {
        let Some(commands) = self.commands.upgrade() else {
            return;
        };
        let pipeline = Arc::clone(&self.pipeline);

        tokio::spawn(async move {
            let progress_commands = commands.clone();
            let result = pipeline
                .run(&raw, move |progress| {
                    let _ = progress_commands.send(Command::TransformProgress {
                        session: id,
                        progress,
                    });
                })
                .await;
            let _ = commands.send(Command::TransformFinished {
                session: id,
                result,
            });
        });
    }

    fn on_transform_finished(&mut self, id: Uuid, result: Result<PipelineOutput, PipelineError>) {
        if !self.is_current(id) || self.current_state() != RecordingState::Transforming {
            return;
        }

        match result {
            Ok(output) => {
                if let Some(session) = self.current.as_mut() {
                    session.cropped_file_path = Some(output.cropped.clone());
                    session.final_file_path = Some(output.final_path.clone());
                    session.saved_file_path = output.saved.clone();
                    session.end(RecordingState::Complete);
                }
                tracing::info!("Recording complete: {:?}", output.final_path);
                self.emit(RecordingEvent::Completed(output));
                self.set_state(RecordingState::Complete);
                self.reset();
            }
            Err(e) => {
                // Raw and intermediate files stay on disk
                tracing::error!("Transform failed: {}", e);
                self.fail(e.to_string());
            }
        }
    }

    /// Any -> Failed -> Idle
    fn fail(&mut self, message: String) {
        if let Some(session) = self.current.as_mut() {
            session.error = Some(message.clone());
            session.end(RecordingState::Failed);
        }
        self.emit(RecordingEvent::Error(message));
        self.set_state(RecordingState::Failed);
        self.reset();
    }

    /// Complete/Failed -> Idle, ready for the next recording
    fn reset(&mut self) {
        *self.bridge.session.lock() = None;
        self.current = None;
        *self.state.write() = RecordingState::Idle;
        self.emit(RecordingEvent::StateChanged(RecordingState::Idle));
    }

    fn set_state(&mut self, state: RecordingState) {
        if let Some(session) = self.current.as_mut() {
            session.state = state;
        }
        *self.state.write() = state;
        self.publish_session();

        tracing::debug!("Recording state -> {:?}", state);
        self.emit(RecordingEvent::StateChanged(state));
    }

    fn publish_session(&self) {
        if let Some(session) = &self.current {
            *self.last_session.write() = Some(session.clone());
        }
    }

    fn emit(&self, event: RecordingEvent) {
        let _ = self.event_tx.send(event);
    }
}

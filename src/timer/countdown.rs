//! Wall-clock countdown driver
//!
//! Drives a [`TimerState`] from a one-second tokio interval and reports every
//! lifecycle step to a [`TimerObserver`]. Ticks are delivered from the ticker
//! task, so observers must be cheap and thread-safe; the recorder forwards
//! them onto its own task.

use super::state::{TickOutcome, TimerState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Receives countdown events. Every method defaults to a no-op.
pub trait TimerObserver: Send + Sync {
    fn will_start(&self) {}
    fn did_start(&self) {}

    /// Per-second tick carrying the new elapsed count
    fn on_tick(&self, _elapsed: u32) {}

    fn will_pause(&self, _elapsed: u32) {}
    fn did_pause(&self, _elapsed: u32) {}

    fn will_resume(&self, _elapsed: u32) {}
    fn did_resume(&self, _elapsed: u32) {}

    fn will_stop(&self, _elapsed: u32) {}
    fn did_stop(&self, _elapsed: u32) {}

    /// The bound was reached; fired before the ticker halts
    fn will_finish(&self) {}
    /// Fired after the ticker halted and the count was reset
    fn did_finish(&self) {}
}

/// Countdown with start/pause/resume/stop and automatic finish
pub struct CountdownTimer {
    state: Arc<Mutex<TimerState>>,
    observer: Arc<dyn TimerObserver>,
    period: Duration,
    ticker: Option<JoinHandle<()>>,
}

impl CountdownTimer {
    /// Create a timer bounded to `seconds`. Requires a tokio runtime once started.
    pub fn new(seconds: u32, observer: Arc<dyn TimerObserver>) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState::new(seconds))),
            observer,
            period: Duration::from_secs(1),
            ticker: None,
        }
    }

    pub fn seconds_configured(&self) -> u32 {
        self.state.lock().seconds_configured()
    }

    pub fn elapsed(&self) -> u32 {
        self.state.lock().seconds_elapsed()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running()
    }

    /// Running or paused
    pub fn is_active(&self) -> bool {
        self.state.lock().is_active()
    }

    /// Start counting from zero. Returns false if the timer is already active.
    pub fn start(&mut self) -> bool {
        let generation = {
            let mut state = self.state.lock();
            if !state.start() {
                tracing::warn!("Timer start ignored: already active");
                return false;
            }
            state.generation()
        };

        self.observer.will_start();
        self.spawn_ticker(generation);
        self.observer.did_start();

        tracing::debug!("Timer started ({}s)", self.seconds_configured());
        true
    }

    /// Suspend ticking without resetting the count.
    ///
    /// The phase changes under the lock before any event fires, so a
    /// `will_*` event is always followed by its `did_*` event.
    pub fn pause(&mut self) -> bool {
        let elapsed = {
            let mut state = self.state.lock();
            if !state.pause() {
                return false;
            }
            state.seconds_elapsed()
        };

        self.observer.will_pause(elapsed);
        self.halt_ticker();
        self.observer.did_pause(elapsed);

        tracing::debug!("Timer paused at {}s", elapsed);
        true
    }

    /// Continue ticking from the paused count.
    pub fn resume(&mut self) -> bool {
        let (elapsed, generation) = {
            let mut state = self.state.lock();
            if !state.resume() {
                return false;
            }
            (state.seconds_elapsed(), state.generation())
        };

        self.observer.will_resume(elapsed);
        self.spawn_ticker(generation);
        self.observer.did_resume(elapsed);

        tracing::debug!("Timer resumed at {}s", elapsed);
        true
    }

    /// Halt ticking and reset the count. No-op when idle.
    pub fn stop(&mut self) -> bool {
        let Some(elapsed) = self.state.lock().stop() else {
            return false;
        };

        self.observer.will_stop(elapsed);
        self.halt_ticker();
        self.observer.did_stop(elapsed);

        tracing::debug!("Timer stopped at {}s", elapsed);
        true
    }

    /// Spawn the ticker for `generation`. Ticks from any earlier ticker that
    /// is still mid-poll are rejected by the state.
    fn spawn_ticker(&mut self, generation: u64) {
        self.halt_ticker();

        let state = Arc::clone(&self.state);
        let observer = Arc::clone(&self.observer);
        let period = self.period;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let outcome = state.lock().tick(generation);
                match outcome {
                    TickOutcome::Counted(elapsed) => {
                        tracing::trace!("Timer tick {}s", elapsed);
                        observer.on_tick(elapsed);
                    }
                    TickOutcome::Expired => {
                        observer.will_finish();
                        if state.lock().finish(generation) {
                            tracing::debug!("Timer finished");
                            observer.did_finish();
                        }
                        break;
                    }
                    TickOutcome::Ignored => break,
                }
            }
        }));
    }

    fn halt_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.halt_ticker();
    }
}

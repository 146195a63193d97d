//! Delayed fade-in scheduling
//!
//! The scheduler owns at most one pending unmute. Scheduling a new one
//! cancels the previous task and waits for it to stop before the new wait
//! begins, so two ramps never touch the same sessions concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::config::ConfigStore;
use crate::domain::session::{target_sessions, AudioSession, AudioSessionProvider};

/// Ramp shape used when restoring volume
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSettings {
    /// Total time from the first step to full volume
    pub duration: Duration,
    /// Number of equal volume increments
    pub steps: u32,
}

impl FadeSettings {
    pub const DEFAULT_DURATION: Duration = Duration::from_secs(1);
    pub const DEFAULT_STEPS: u32 = 20;

    pub fn new(duration: Duration, steps: u32) -> Self {
        Self {
            duration,
            steps: steps.max(1),
        }
    }

    /// Time between two consecutive steps
    pub fn step_interval(&self) -> Duration {
        self.duration / self.steps.max(1)
    }

    /// Volume reached after each step; non-decreasing and ending at 1.0
    pub fn levels(&self) -> impl Iterator<Item = f32> {
        let steps = self.steps.max(1);
        (1..=steps).map(move |step| step as f32 / steps as f32)
    }
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DURATION, Self::DEFAULT_STEPS)
    }
}

/// Lifecycle of the pending unmute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadePhase {
    Idle,
    Scheduled,
    Fading,
    Completed,
    Cancelled,
}

/// How a scheduled unmute ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    /// Ramp finished; `sessions` were brought back to full volume
    Completed { sessions: usize, steps: u32 },
    /// Cancelled during the initial wait, nothing was touched
    CancelledWhileWaiting,
    /// Cancelled mid-ramp after `steps` steps
    CancelledWhileFading { steps: u32 },
}

#[derive(Default)]
struct PendingUnmute {
    generation: u64,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<FadeOutcome>>,
}

/// Owner of the single in-flight delayed unmute
pub struct FadeScheduler {
    provider: Arc<dyn AudioSessionProvider>,
    config: Arc<ConfigStore>,
    settings: FadeSettings,
    shutdown: CancellationToken,
    pending: Mutex<PendingUnmute>,
    phase_tx: watch::Sender<FadePhase>,
}

impl FadeScheduler {
    /// Create a scheduler whose tasks also stop when `shutdown` fires
    pub fn new(
        provider: Arc<dyn AudioSessionProvider>,
        config: Arc<ConfigStore>,
        settings: FadeSettings,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let (phase_tx, _) = watch::channel(FadePhase::Idle);
        Arc::new(Self {
            provider,
            config,
            settings,
            shutdown,
            pending: Mutex::new(PendingUnmute::default()),
            phase_tx,
        })
    }

    pub fn settings(&self) -> FadeSettings {
        self.settings
    }

    pub fn phase(&self) -> FadePhase {
        *self.phase_tx.borrow()
    }

    /// Watch phase transitions
    pub fn subscribe_phase(&self) -> watch::Receiver<FadePhase> {
        self.phase_tx.subscribe()
    }

    /// Replace any pending unmute with a new one that fires after `delay`
    ///
    /// Returns once the previous task has stopped and the new one is
    /// spawned. The returned generation identifies the new task.
    #[instrument(skip(self))]
    pub async fn schedule_unmute(self: &Arc<Self>, delay: Duration) -> u64 {
        let mut pending = self.pending.lock().await;
        Self::stop(&mut pending).await;

        pending.generation = pending.generation.wrapping_add(1);
        let generation = pending.generation;
        let token = self.shutdown.child_token();

        // Publish before spawning so callers never observe a stale Idle
        self.phase_tx.send_replace(FadePhase::Scheduled);
        let this = Arc::clone(self);
        let task_token = token.clone();
        pending.token = Some(token);
        pending.handle = Some(tokio::spawn(async move {
            this.run(generation, delay, task_token).await
        }));

        info!(generation, delay_ms = delay.as_millis() as u64, "Unmute scheduled");
        generation
    }

    /// Cancel the pending unmute, if any, and wait for it to stop
    pub async fn cancel(&self) -> Option<FadeOutcome> {
        let mut pending = self.pending.lock().await;
        Self::stop(&mut pending).await
    }

    async fn stop(pending: &mut PendingUnmute) -> Option<FadeOutcome> {
        let token = pending.token.take();
        let handle = pending.handle.take()?;
        if let Some(token) = token {
            token.cancel();
        }
        match handle.await {
            Ok(outcome) => {
                debug!(generation = pending.generation, ?outcome, "Previous unmute stopped");
                Some(outcome)
            }
            Err(e) => {
                warn!(generation = pending.generation, error = %e, "Unmute task failed");
                None
            }
        }
    }

    async fn run(self: Arc<Self>, generation: u64, delay: Duration, token: CancellationToken) -> FadeOutcome {
        let started_at = Instant::now();

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(generation, waited_ms = started_at.elapsed().as_millis() as u64, "Unmute cancelled while waiting");
                self.finish(FadePhase::Cancelled);
                return FadeOutcome::CancelledWhileWaiting;
            }
            _ = sleep(delay) => {}
        }

        // Targets are read at fire time; the delay was fixed at schedule time
        let targets = self.config.read().await.target_processes;
        let mut sessions = self.silent_targets(&targets);
        if sessions.is_empty() {
            debug!(generation, "No muted target sessions to restore");
            self.finish(FadePhase::Completed);
            return FadeOutcome::Completed { sessions: 0, steps: 0 };
        }

        self.phase_tx.send_replace(FadePhase::Fading);
        info!(generation, sessions = sessions.len(), "Fading in");

        let interval = self.settings.step_interval();
        let mut steps_done = 0;
        for level in self.settings.levels() {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = sleep(interval) => {}
            }
            if token.is_cancelled() {
                info!(generation, steps = steps_done, "Fade cancelled");
                self.finish(FadePhase::Cancelled);
                return FadeOutcome::CancelledWhileFading { steps: steps_done };
            }

            sessions.retain(|session| match self.provider.set_volume(session, level) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        process = %session.process_name,
                        pid = session.process_id,
                        error = %e,
                        "Failed to restore volume, skipping session"
                    );
                    false
                }
            });
            steps_done += 1;

            if sessions.is_empty() {
                break;
            }
        }

        let restored = sessions.len();
        info!(generation, sessions = restored, "Fade completed");
        self.finish(FadePhase::Completed);
        FadeOutcome::Completed {
            sessions: restored,
            steps: steps_done,
        }
    }

    /// Muted sessions belonging to `targets`, with a live volume check
    fn silent_targets(&self, targets: &[String]) -> Vec<AudioSession> {
        target_sessions(self.provider.as_ref(), targets)
            .into_iter()
            .filter(|session| match self.provider.get_volume(session) {
                Ok(volume) => volume <= 0.0,
                Err(e) => {
                    warn!(
                        process = %session.process_name,
                        pid = session.process_id,
                        error = %e,
                        "Failed to read volume, skipping session"
                    );
                    false
                }
            })
            .collect()
    }

    fn finish(&self, terminal: FadePhase) {
        self.phase_tx.send_replace(terminal);
        self.phase_tx.send_replace(FadePhase::Idle);
    }
}

//! Mute/unmute orchestration
//!
//! The controller applies mute and unmute intents to every session whose
//! process is a configured target. Muting is immediate; unmuting is handed
//! to the [`FadeScheduler`] as a delayed fade-in.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::domain::apps::{audio_apps, AudioApp};
use crate::domain::config::ConfigStore;
use crate::domain::fade::{FadeScheduler, FadeSettings};
use crate::domain::session::{target_sessions, AudioSession, AudioSessionProvider, Result};

/// Outcome of a mute request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteReport {
    /// Sessions whose volume was actually changed
    pub affected_sessions: usize,
    pub muting_enabled: bool,
}

/// Outcome of an unmute request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnmuteReport {
    /// Wait before the fade starts; `None` when nothing was scheduled
    pub delay: Option<Duration>,
    pub muting_enabled: bool,
}

/// Applications currently producing audio, with the configured targets
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAppsReport {
    pub apps: Vec<AudioApp>,
    pub current_targets: Vec<String>,
}

pub struct MuteController {
    provider: Arc<dyn AudioSessionProvider>,
    config: Arc<ConfigStore>,
    scheduler: Arc<FadeScheduler>,
}

impl MuteController {
    pub fn new(
        provider: Arc<dyn AudioSessionProvider>,
        config: Arc<ConfigStore>,
        fade: FadeSettings,
        shutdown: CancellationToken,
    ) -> Self {
        let scheduler = FadeScheduler::new(provider.clone(), config.clone(), fade, shutdown);
        Self {
            provider,
            config,
            scheduler,
        }
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<FadeScheduler> {
        &self.scheduler
    }

    /// Silence every audible target session right away
    ///
    /// Any pending fade is cancelled first. Sessions already at zero are
    /// left alone, so repeated calls are idempotent.
    #[instrument(skip(self))]
    pub async fn mute_now(&self) -> MuteReport {
        self.scheduler.cancel().await;

        let config = self.config.read().await;
        if !config.muting_enabled {
            debug!("Muting disabled, ignoring mute");
            return MuteReport {
                affected_sessions: 0,
                muting_enabled: false,
            };
        }

        let mut affected = 0;
        for session in target_sessions(self.provider.as_ref(), &config.target_processes) {
            let volume = match self.provider.get_volume(&session) {
                Ok(volume) => volume,
                Err(e) => {
                    warn!(
                        process = %session.process_name,
                        pid = session.process_id,
                        error = %e,
                        "Failed to read volume"
                    );
                    continue;
                }
            };
            if volume <= 0.0 {
                debug!(process = %session.process_name, "Already muted");
                continue;
            }
            match self.provider.set_volume(&session, 0.0) {
                Ok(()) => {
                    info!(process = %session.process_name, pid = session.process_id, "Muted");
                    affected += 1;
                }
                Err(e) => warn!(
                    process = %session.process_name,
                    pid = session.process_id,
                    error = %e,
                    "Failed to mute"
                ),
            }
        }

        MuteReport {
            affected_sessions: affected,
            muting_enabled: true,
        }
    }

    /// Replace any pending fade with a new delayed fade-in
    ///
    /// The delay is read now; editing it while the wait runs does not move
    /// the scheduled fade.
    #[instrument(skip(self))]
    pub async fn request_unmute(&self) -> UnmuteReport {
        let config = self.config.read().await;
        if !config.muting_enabled {
            self.scheduler.cancel().await;
            debug!("Muting disabled, ignoring unmute");
            return UnmuteReport {
                delay: None,
                muting_enabled: false,
            };
        }

        let delay = config.unmute_delay();
        self.scheduler.schedule_unmute(delay).await;
        UnmuteReport {
            delay: Some(delay),
            muting_enabled: true,
        }
    }

    /// Enumerate every active session
    pub fn list_sessions(&self) -> Result<Vec<AudioSession>> {
        self.provider.list_sessions()
    }

    /// Applications producing audio, deduplicated by process name
    pub async fn list_audio_apps(&self) -> Result<AudioAppsReport> {
        let sessions = self.provider.list_sessions()?;
        let current_targets = self.config.read().await.target_processes;
        Ok(AudioAppsReport {
            apps: audio_apps(&sessions),
            current_targets,
        })
    }

    /// Stop any pending fade; called once on the way out
    pub async fn shutdown(&self) {
        if let Some(outcome) = self.scheduler.cancel().await {
            info!(?outcome, "Pending unmute stopped for shutdown");
        }
    }
}

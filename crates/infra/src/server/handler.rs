//! Command handlers for WebSocket messages
//!
//! Dispatches parsed commands to the mute controller and the config store.

use std::sync::Arc;

use audiostop_core::domain::controller::MuteController;
use audiostop_core::domain::protocol::{Command, ServerMessage};
use audiostop_core::domain::ConfigUpdate;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handles incoming commands from the controller connection
pub struct CommandHandler {
    controller: Arc<MuteController>,
    shutdown: CancellationToken,
}

impl CommandHandler {
    pub fn new(controller: Arc<MuteController>, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            shutdown,
        }
    }

    pub fn controller(&self) -> &Arc<MuteController> {
        &self.controller
    }

    /// Handle one command, returning the reply to send back, if any
    pub async fn handle(&self, command: Command) -> Option<ServerMessage> {
        match command {
            Command::Mute => {
                let report = self.controller.mute_now().await;
                Some(ServerMessage::Muted {
                    affected_sessions: report.affected_sessions,
                    muting_enabled: report.muting_enabled,
                })
            }
            Command::Unmute => {
                let report = self.controller.request_unmute().await;
                Some(ServerMessage::UnmuteScheduled {
                    delay_seconds: report.delay.map(|d| d.as_secs_f64()),
                    muting_enabled: report.muting_enabled,
                })
            }
            Command::Shutdown => {
                info!("Shutdown requested by controller");
                self.shutdown.cancel();
                None
            }
            Command::Ping => Some(ServerMessage::Pong),
            Command::UpdateConfig(update) => Some(self.update_config(update).await),
            Command::GetAudioApps => Some(self.audio_apps().await),
            Command::GetConfig => Some(ServerMessage::ConfigData(
                self.controller.config().read().await,
            )),
        }
    }

    async fn update_config(&self, update: ConfigUpdate) -> ServerMessage {
        match self.controller.config().update(update).await {
            Ok(_) => ServerMessage::ConfigUpdated {
                success: true,
                error: None,
            },
            Err(e) => ServerMessage::ConfigUpdated {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }

    async fn audio_apps(&self) -> ServerMessage {
        match self.controller.list_audio_apps().await {
            Ok(report) => ServerMessage::AudioAppsList {
                success: true,
                apps: report.apps,
                current_targets: report.current_targets,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Failed to list audio apps");
                ServerMessage::AudioAppsList {
                    success: false,
                    apps: Vec::new(),
                    current_targets: self.controller.config().read().await.target_processes,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

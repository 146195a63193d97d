//! Wire protocol definitions
//!
//! Inbound frames are either plain words (`mute`, `unmute`, `shutdown`,
//! `ping`) or JSON objects tagged by `type`. Both forms parse into one
//! [`Command`]; replies are [`ServerMessage`]s serialized as JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::apps::AudioApp;
use crate::domain::config::{Config, ConfigUpdate};

/// Errors produced while parsing an inbound frame
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed JSON command: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unrecognized command: {0}")]
    Unrecognized(String),
}

/// Messages sent from the controller to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Silence target sessions now
    Mute,
    /// Schedule a delayed fade-in of target sessions
    Unmute,
    /// Stop the whole process
    Shutdown,
    /// Keepalive
    Ping,
    /// Merge the given fields into the configuration
    UpdateConfig(ConfigUpdate),
    /// List applications currently producing audio
    GetAudioApps,
    /// Report the current configuration
    GetConfig,
}

impl Command {
    /// Parse one text frame.
    ///
    /// JSON is tried first; anything that is not a recognized JSON command
    /// falls back to a plain word comparison.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let text = text.trim();

        let json_error = match serde_json::from_str::<Command>(text) {
            Ok(command) => return Ok(command),
            Err(e) => e,
        };

        match text {
            "mute" => Ok(Command::Mute),
            "unmute" => Ok(Command::Unmute),
            "shutdown" => Ok(Command::Shutdown),
            "ping" => Ok(Command::Ping),
            _ if text.starts_with('{') && !json_error.is_syntax() && !json_error.is_eof() => {
                // Well-formed JSON whose shape or type tag we do not know
                if serde_json::from_str::<serde_json::Value>(text)
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_owned))
                    .is_some_and(|tag| KNOWN_TAGS.contains(&tag.as_str()))
                {
                    Err(ProtocolError::Malformed(json_error))
                } else {
                    Err(ProtocolError::Unrecognized(text.to_string()))
                }
            }
            _ => Err(ProtocolError::Unrecognized(text.to_string())),
        }
    }
}

const KNOWN_TAGS: &[&str] = &[
    "mute",
    "unmute",
    "shutdown",
    "ping",
    "update_config",
    "get_audio_apps",
    "get_config",
];

/// Messages sent from the server to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Acknowledges a mute
    Muted {
        affected_sessions: usize,
        muting_enabled: bool,
    },
    /// Acknowledges an unmute; `delay_seconds` is absent when nothing was scheduled
    UnmuteScheduled {
        #[serde(skip_serializing_if = "Option::is_none")]
        delay_seconds: Option<f64>,
        muting_enabled: bool,
    },
    /// Result of a configuration update
    ConfigUpdated {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Active applications and the configured targets
    AudioAppsList {
        success: bool,
        apps: Vec<AudioApp>,
        current_targets: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Current configuration
    ConfigData(Config),
    /// Keepalive reply
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        // Every variant is plain data with string keys
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"type":"error"}"#))
    }
}

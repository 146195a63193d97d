//! Audio session abstractions and domain models
//!
//! This module defines the platform-agnostic view of per-process audio
//! sessions. The WASAPI implementation lives in the `infra` crate; an
//! in-memory provider is available in [`memory`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod memory;

pub use memory::MemorySessionProvider;

/// Errors that can occur while talking to an audio session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session disappeared between enumeration and use
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The OS refused access to the session or its process
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Any other error reported by the audio subsystem
    #[error("Audio subsystem error: {0}")]
    Platform(String),

    /// No audio backend exists for this platform
    #[error("Audio sessions are not supported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// A single OS audio session owned by one process
///
/// Sessions are snapshots: they are re-enumerated for every operation and
/// never cached, since the OS may create or destroy them at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSession {
    /// Executable name of the owning process (e.g. `chrome.exe`)
    pub process_name: String,
    pub process_id: u32,
    /// Full image path of the owning process; empty when unknown
    #[serde(default)]
    pub full_path: String,
    /// Master volume at enumeration time, in `[0, 1]`
    pub volume: f32,
    /// Provider-specific identity used to find the session again
    pub instance_id: String,
}

impl AudioSession {
    pub fn is_silent(&self) -> bool {
        self.volume <= 0.0
    }
}

/// Trait for enumerating and adjusting per-process audio sessions
///
/// Implementations are free to block briefly; every call is self-contained
/// and acquires and releases whatever OS state it needs.
pub trait AudioSessionProvider: Send + Sync {
    /// List the currently active sessions
    fn list_sessions(&self) -> Result<Vec<AudioSession>>;

    /// Read the live master volume of a session
    fn get_volume(&self, session: &AudioSession) -> Result<f32>;

    /// Set the master volume of a session, clamped to `[0, 1]`
    fn set_volume(&self, session: &AudioSession, volume: f32) -> Result<()>;
}

/// Clamp a requested volume into the range every provider accepts
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Enumerate the sessions whose process name is in `targets`.
///
/// Enumeration failures are logged and yield an empty list.
pub fn target_sessions(provider: &dyn AudioSessionProvider, targets: &[String]) -> Vec<AudioSession> {
    match provider.list_sessions() {
        Ok(sessions) => {
            let matching: Vec<_> = sessions
                .into_iter()
                .filter(|s| targets.iter().any(|t| t == &s.process_name))
                .collect();
            debug!(count = matching.len(), "Enumerated target sessions");
            matching
        }
        Err(e) => {
            warn!(error = %e, "Failed to enumerate audio sessions");
            Vec::new()
        }
    }
}

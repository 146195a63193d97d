//! In-memory session provider
//!
//! Keeps a list of simulated sessions and records every volume change. Used
//! by tests and as the fallback backend on platforms without native session
//! support.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{clamp_volume, AudioSession, AudioSessionProvider, Result, SessionError};

#[derive(Debug)]
struct SimulatedSession {
    session: AudioSession,
    volume: f32,
    history: Vec<f32>,
    failing: bool,
}

#[derive(Debug, Default)]
struct State {
    sessions: Vec<SimulatedSession>,
    next_instance: u64,
}

/// Audio session provider backed by plain memory
#[derive(Debug, Default)]
pub struct MemorySessionProvider {
    state: Mutex<State>,
}

impl MemorySessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a simulated session and return its snapshot
    pub fn add_session(&self, process_name: &str, process_id: u32, volume: f32) -> AudioSession {
        let mut state = self.state();
        state.next_instance += 1;
        let session = AudioSession {
            process_name: process_name.to_string(),
            process_id,
            full_path: String::new(),
            volume: clamp_volume(volume),
            instance_id: format!("{}:{}", process_id, state.next_instance),
        };
        state.sessions.push(SimulatedSession {
            session: session.clone(),
            volume: session.volume,
            history: Vec::new(),
            failing: false,
        });
        session
    }

    /// Remove a session, as if its process had exited
    pub fn remove_session(&self, session: &AudioSession) {
        self.state()
            .sessions
            .retain(|s| s.session.instance_id != session.instance_id);
    }

    /// Make every call touching `session` fail with access denied
    pub fn set_failing(&self, session: &AudioSession, failing: bool) {
        if let Some(s) = self
            .state()
            .sessions
            .iter_mut()
            .find(|s| s.session.instance_id == session.instance_id)
        {
            s.failing = failing;
        }
    }

    /// Current volume of a session, if it still exists
    pub fn volume(&self, session: &AudioSession) -> Option<f32> {
        self.state()
            .sessions
            .iter()
            .find(|s| s.session.instance_id == session.instance_id)
            .map(|s| s.volume)
    }

    /// Every volume written to `session`, oldest first
    pub fn history(&self, session: &AudioSession) -> Vec<f32> {
        self.state()
            .sessions
            .iter()
            .find(|s| s.session.instance_id == session.instance_id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Total number of successful `set_volume` calls across all sessions
    pub fn write_count(&self) -> usize {
        self.state().sessions.iter().map(|s| s.history.len()).sum()
    }
}

impl AudioSessionProvider for MemorySessionProvider {
    fn list_sessions(&self) -> Result<Vec<AudioSession>> {
        Ok(self
            .state()
            .sessions
            .iter()
            .map(|s| AudioSession {
                volume: s.volume,
                ..s.session.clone()
            })
            .collect())
    }

    fn get_volume(&self, session: &AudioSession) -> Result<f32> {
        let state = self.state();
        let sim = state
            .sessions
            .iter()
            .find(|s| s.session.instance_id == session.instance_id)
            .ok_or_else(|| SessionError::NotFound(session.process_name.clone()))?;
        if sim.failing {
            return Err(SessionError::AccessDenied(session.process_name.clone()));
        }
        Ok(sim.volume)
    }

    fn set_volume(&self, session: &AudioSession, volume: f32) -> Result<()> {
        let mut state = self.state();
        let sim = state
            .sessions
            .iter_mut()
            .find(|s| s.session.instance_id == session.instance_id)
            .ok_or_else(|| SessionError::NotFound(session.process_name.clone()))?;
        if sim.failing {
            return Err(SessionError::AccessDenied(session.process_name.clone()));
        }
        sim.volume = clamp_volume(volume);
        sim.history.push(sim.volume);
        Ok(())
    }
}

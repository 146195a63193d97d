//! Audio application listing
//!
//! Turns raw sessions into the list a controller shows when picking target
//! processes.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::session::AudioSession;

/// Processes never offered as targets: audio infrastructure, system hosts
/// and the editing tools that drive the controller
pub const IGNORED_PROCESSES: &[&str] = &[
    "audiodg.exe",
    "System",
    "svchost.exe",
    "Adobe Premiere Pro.exe",
    "AfterFX.exe",
    "Photoshop.exe",
];

/// Media players and browsers listed before everything else
pub const PRIORITY_APPS: &[&str] = &[
    "Spotify.exe",
    "chrome.exe",
    "firefox.exe",
    "msedge.exe",
    "brave.exe",
    "opera.exe",
    "Discord.exe",
    "Deezer.exe",
    "iTunes.exe",
    "vlc.exe",
    "AIMP.exe",
    "foobar2000.exe",
];

/// One application currently producing audio
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioApp {
    pub name: String,
    pub exe: String,
    pub pid: u32,
    #[serde(rename = "fullPath")]
    pub full_path: String,
    pub priority: bool,
}

/// Deduplicate sessions by process name and drop ignored processes.
///
/// Priority apps come first, then the rest sorted case-insensitively. The
/// first session seen for a process supplies the pid.
pub fn audio_apps(sessions: &[AudioSession]) -> Vec<AudioApp> {
    let mut seen = HashSet::new();
    let mut apps: Vec<AudioApp> = sessions
        .iter()
        .filter(|s| !s.process_name.is_empty())
        .filter(|s| !IGNORED_PROCESSES.contains(&s.process_name.as_str()))
        .filter(|s| seen.insert(s.process_name.clone()))
        .map(|s| AudioApp {
            name: s.process_name.clone(),
            exe: s.process_name.clone(),
            pid: s.process_id,
            full_path: s.full_path.clone(),
            priority: PRIORITY_APPS.contains(&s.process_name.as_str()),
        })
        .collect();

    apps.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    apps
}

//! Domain entities and business rules

pub mod apps;
pub mod config;
pub mod controller;
pub mod fade;
pub mod protocol;
pub mod session;

// Re-export specific items to avoid ambiguous glob imports
pub use apps::{audio_apps, AudioApp};
pub use config::{Config, ConfigError, ConfigStore, ConfigUpdate, ConfigWatcher};
pub use controller::{AudioAppsReport, MuteController, MuteReport, UnmuteReport};
pub use fade::{FadeOutcome, FadePhase, FadeScheduler, FadeSettings};
pub use protocol::{Command, ProtocolError, ServerMessage};
pub use session::{AudioSession, AudioSessionProvider, MemorySessionProvider, SessionError};

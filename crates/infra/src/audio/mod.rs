//! Platform-specific audio session backends
//!
//! - Windows: WASAPI session manager
//! - Elsewhere: simulated sessions from the in-memory provider

#[cfg(windows)]
pub mod wasapi;

use std::sync::Arc;

use audiostop_core::domain::session::AudioSessionProvider;

#[cfg(windows)]
pub use wasapi::{ComScope, WasapiSessionProvider};

/// The native provider for this platform
pub fn platform_provider() -> Arc<dyn AudioSessionProvider> {
    #[cfg(windows)]
    {
        tracing::info!("Using WASAPI session backend");
        Arc::new(WasapiSessionProvider::new())
    }

    #[cfg(not(windows))]
    {
        tracing::warn!("No native audio session backend on this platform, sessions are simulated");
        Arc::new(audiostop_core::domain::session::MemorySessionProvider::new())
    }
}

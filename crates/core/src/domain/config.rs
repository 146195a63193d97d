//! Configuration management for AudioStop
//!
//! This module provides:
//! - The persisted [`Config`] document and partial [`ConfigUpdate`]s
//! - [`ConfigStore`], the single owner of the live configuration
//! - Hot-reload support via file system watcher

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Directory name under the per-user config location
pub const APP_DIR_NAME: &str = "AudioStop";

/// File name of the persisted configuration
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Persisted application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executable names whose sessions are muted, compared case-sensitively
    pub target_processes: Vec<String>,

    /// Wait before the fade-in starts after an unmute request
    pub unmute_delay_seconds: f64,

    /// When false, mute and unmute are acknowledged but do nothing
    pub muting_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_processes: [
                "chrome.exe",
                "firefox.exe",
                "msedge.exe",
                "brave.exe",
                "opera.exe",
                "Spotify.exe",
                "Discord.exe",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            unmute_delay_seconds: 3.0,
            muting_enabled: true,
        }
    }
}

impl Config {
    pub fn is_target(&self, process_name: &str) -> bool {
        self.target_processes.iter().any(|t| t == process_name)
    }

    pub fn unmute_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.unmute_delay_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Apply a partial update, returning the merged configuration
    pub fn merged(&self, update: &ConfigUpdate) -> Result<Self> {
        update.validate()?;

        let mut merged = self.clone();
        if let Some(enabled) = update.muting_enabled {
            merged.muting_enabled = enabled;
        }
        if let Some(delay) = update.unmute_delay_seconds {
            merged.unmute_delay_seconds = delay;
        }
        if let Some(targets) = &update.target_processes {
            merged.target_processes = normalize_targets(targets);
        }
        Ok(merged)
    }

    fn sanitized(mut self) -> Self {
        self.target_processes = normalize_targets(&self.target_processes);
        if !self.unmute_delay_seconds.is_finite() || self.unmute_delay_seconds < 0.0 {
            warn!(
                delay = self.unmute_delay_seconds,
                "Invalid unmute delay in config, using default"
            );
            self.unmute_delay_seconds = Config::default().unmute_delay_seconds;
        }
        self
    }

    /// Load configuration from a JSON file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config.sanitized())
    }

    /// Save configuration to a JSON file
    ///
    /// The document is written to a sibling temp file, flushed to disk and
    /// renamed over the target, so readers never see a partial file.
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp_path, path).await?;

        Ok(())
    }
}

/// Trim names, drop blanks and keep the first occurrence of each name
fn normalize_targets(targets: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(targets.len());
    for name in targets.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !normalized.iter().any(|n| n == name) {
            normalized.push(name.to_string());
        }
    }
    normalized
}

/// Partial configuration change; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muting_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmute_delay_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_processes: Option<Vec<String>>,
}

impl ConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.muting_enabled.is_none()
            && self.unmute_delay_seconds.is_none()
            && self.target_processes.is_none()
    }

    fn validate(&self) -> Result<()> {
        if let Some(delay) = self.unmute_delay_seconds {
            if !delay.is_finite() || delay < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "unmute_delay_seconds must be a non-negative number, got {}",
                    delay
                )));
            }
        }
        Ok(())
    }
}

/// Owner of the live configuration
///
/// All reads and writes go through one lock: an update is merged, written
/// to disk and published before the next reader can observe anything.
pub struct ConfigStore {
    path: PathBuf,
    config: Mutex<Config>,
    changes_tx: broadcast::Sender<Config>,
}

impl ConfigStore {
    /// Get the default config directory path
    ///
    /// Returns `%APPDATA%\AudioStop` on Windows
    /// Returns `~/.config/AudioStop` on Linux
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR_NAME))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    /// Open the store at `path`
    ///
    /// A missing file is created with defaults. A corrupt file is backed up
    /// next to the original and replaced by defaults.
    #[instrument]
    pub async fn open(path: PathBuf) -> Self {
        let config = if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, creating default"
            );

            let config = Config::default();
            if let Err(e) = config.save_to_file(&path).await {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to save default config"
                );
            }
            config
        } else {
            match Config::load_from_file(&path).await {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        targets = ?config.target_processes,
                        "Configuration loaded successfully"
                    );
                    config
                }
                Err(e) => {
                    error!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using default"
                    );

                    let backup_path = path.with_extension("json.corrupt");
                    if let Err(copy_err) = fs::copy(&path, &backup_path).await {
                        error!(
                            path = %backup_path.display(),
                            error = %copy_err,
                            "Failed to backup corrupt config"
                        );
                    }

                    let config = Config::default();
                    if let Err(e) = config.save_to_file(&path).await {
                        error!(error = %e, "Failed to replace corrupt config");
                    }
                    config
                }
            }
        };

        let (changes_tx, _) = broadcast::channel(16);
        Self {
            path,
            config: Mutex::new(config),
            changes_tx,
        }
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consistent snapshot of the current configuration
    pub async fn read(&self) -> Config {
        self.config.lock().await.clone()
    }

    /// Merge `update` into the configuration and persist it
    ///
    /// Invalid updates are rejected without change. If the write fails the
    /// new values still take effect in memory and the error is returned.
    #[instrument(skip(self))]
    pub async fn update(&self, update: ConfigUpdate) -> Result<Config> {
        let mut current = self.config.lock().await;
        let merged = current.merged(&update)?;

        let saved = merged.save_to_file(&self.path).await;
        *current = merged.clone();
        let _ = self.changes_tx.send(merged.clone());

        match saved {
            Ok(()) => {
                info!(
                    muting_enabled = merged.muting_enabled,
                    delay = merged.unmute_delay_seconds,
                    targets = ?merged.target_processes,
                    "Configuration updated"
                );
                Ok(merged)
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to persist configuration, keeping it in memory"
                );
                Err(e)
            }
        }
    }

    /// Re-read the document from disk after an external edit
    ///
    /// Returns whether the in-memory configuration changed. Unreadable
    /// documents are ignored; the current value stays in place.
    #[instrument(skip(self))]
    pub async fn reload(&self) -> bool {
        let mut current = self.config.lock().await;
        match Config::load_from_file(&self.path).await {
            Ok(config) if config != *current => {
                info!(path = %self.path.display(), "Configuration reloaded from disk");
                *current = config.clone();
                let _ = self.changes_tx.send(config);
                true
            }
            Ok(_) => {
                debug!("Configuration on disk unchanged");
                false
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable configuration change"
                );
                false
            }
        }
    }

    /// Subscribe to configuration changes
    pub fn subscribe(&self) -> broadcast::Receiver<Config> {
        self.changes_tx.subscribe()
    }
}

/// File system watcher for hot-reload of the config document
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch the directory containing `config_path` for edits to that file
    pub async fn new(config_path: &Path) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        let dir = config_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigError::Invalid("Config path has no parent directory".to_string()))?;
        let file_name = config_path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| ConfigError::Invalid("Config path has no file name".to_string()))?;

        fs::create_dir_all(&dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.file_name() == Some(file_name.as_os_str()) {
                            // No subscriber yet is fine
                            let _ = tx_clone.send(path);
                        }
                    }
                }
            }
        })?;

        watcher.watch(&dir, notify::RecursiveMode::NonRecursive)?;

        info!(
            path = %dir.display(),
            "Config watcher started"
        );

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }

    /// Reload `store` on every change event until `shutdown` fires
    pub fn spawn_reloader(self, store: Arc<ConfigStore>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            let _watcher = self;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            store.reload().await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("Config reloader stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_serialization() {
        let config = Config::default();

        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config, parsed);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"target_processes": ["vlc.exe"]}"#).unwrap();

        assert_eq!(parsed.target_processes, vec!["vlc.exe"]);
        assert_eq!(parsed.unmute_delay_seconds, 3.0);
        assert!(parsed.muting_enabled);
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let config = Config::default();
        let update = ConfigUpdate {
            muting_enabled: Some(false),
            ..Default::default()
        };

        let merged = config.merged(&update).unwrap();
        assert!(!merged.muting_enabled);
        assert_eq!(merged.target_processes, config.target_processes);
        assert_eq!(merged.unmute_delay_seconds, config.unmute_delay_seconds);
    }

    #[test]
    fn test_merge_rejects_negative_delay() {
        let update = ConfigUpdate {
            unmute_delay_seconds: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            Config::default().merged(&update),
            Err(ConfigError::Invalid(_))
        ));

        let update = ConfigUpdate {
            unmute_delay_seconds: Some(f64::NAN),
            ..Default::default()
        };
        assert!(Config::default().merged(&update).is_err());
    }

    #[test]
    fn test_targets_are_normalized() {
        let update = ConfigUpdate {
            target_processes: Some(vec![
                " chrome.exe ".to_string(),
                "".to_string(),
                "chrome.exe".to_string(),
                "Chrome.exe".to_string(),
            ]),
            ..Default::default()
        };

        let merged = Config::default().merged(&update).unwrap();
        assert_eq!(merged.target_processes, vec!["chrome.exe", "Chrome.exe"]);
    }

    #[tokio::test]
    async fn test_open_creates_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("AudioStop").join(CONFIG_FILE_NAME);

        let store = ConfigStore::open(path.clone()).await;

        assert!(path.exists());
        assert_eq!(store.read().await, Config::default());
    }

    #[tokio::test]
    async fn test_update_round_trip_across_restart() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);

        let store = ConfigStore::open(path.clone()).await;
        store
            .update(ConfigUpdate {
                target_processes: Some(vec!["a.exe".to_string()]),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.read().await.target_processes, vec!["a.exe"]);

        let reopened = ConfigStore::open(path).await;
        assert_eq!(reopened.read().await.target_processes, vec!["a.exe"]);
    }

    #[tokio::test]
    async fn test_corrupt_config_is_backed_up() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConfigStore::open(path.clone()).await;

        assert_eq!(store.read().await, Config::default());
        assert!(path.with_extension("json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_write_failure_still_updates_memory() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "a file, not a directory").unwrap();
        let path = blocker.join(CONFIG_FILE_NAME);

        let store = ConfigStore::open(path).await;
        let result = store
            .update(ConfigUpdate {
                unmute_delay_seconds: Some(7.5),
                ..Default::default()
            })
            .await;

        assert!(matches!(result, Err(ConfigError::Io(_))));
        assert_eq!(store.read().await.unmute_delay_seconds, 7.5);
    }

    #[tokio::test]
    async fn test_invalid_update_changes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::open(temp_dir.path().join(CONFIG_FILE_NAME)).await;
        let mut changes = store.subscribe();

        let result = store
            .update(ConfigUpdate {
                unmute_delay_seconds: Some(-3.0),
                muting_enabled: Some(false),
                ..Default::default()
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.read().await, Config::default());
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_notifies_subscribers() {
        let temp_dir = TempDir::new().unwrap();
        let store = ConfigStore::open(temp_dir.path().join(CONFIG_FILE_NAME)).await;
        let mut changes = store.subscribe();

        store
            .update(ConfigUpdate {
                muting_enabled: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();

        let changed = changes.recv().await.unwrap();
        assert!(!changed.muting_enabled);
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_edit() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        let store = ConfigStore::open(path.clone()).await;

        let edited = Config {
            target_processes: vec!["vlc.exe".to_string()],
            ..Config::default()
        };
        std::fs::write(&path, serde_json::to_string(&edited).unwrap()).unwrap();

        assert!(store.reload().await);
        assert_eq!(store.read().await, edited);
        assert!(!store.reload().await);
    }

    #[tokio::test]
    async fn test_reload_ignores_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        let store = ConfigStore::open(path.clone()).await;

        std::fs::write(&path, "garbage").unwrap();

        assert!(!store.reload().await);
        assert_eq!(store.read().await, Config::default());
    }

    proptest! {
        #[test]
        fn prop_merge_only_touches_given_fields(
            enabled in proptest::option::of(any::<bool>()),
            delay in proptest::option::of(0.0f64..600.0),
        ) {
            let base = Config::default();
            let update = ConfigUpdate {
                muting_enabled: enabled,
                unmute_delay_seconds: delay,
                target_processes: None,
            };

            let merged = base.merged(&update).unwrap();
            prop_assert_eq!(merged.muting_enabled, enabled.unwrap_or(base.muting_enabled));
            prop_assert_eq!(merged.unmute_delay_seconds, delay.unwrap_or(base.unmute_delay_seconds));
            prop_assert_eq!(merged.target_processes, base.target_processes);
        }
    }
}

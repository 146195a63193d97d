//! AudioStop CLI Application

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use audiostop_core::domain::config::{ConfigStore, ConfigWatcher, CONFIG_FILE_NAME};
use audiostop_core::domain::controller::MuteController;
use audiostop_core::domain::fade::FadeSettings;
use audiostop_infra::audio::platform_provider;
use audiostop_infra::server::{CommandHandler, CommandServer, ServerOptions};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audiostop")]
#[command(about = "Mutes target applications on request and fades them back in", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 3350)]
    port: u16,

    /// Directory holding config.json
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Fade-in length in seconds
    #[arg(long, default_value_t = 1.0)]
    fade_duration: f64,

    /// Number of volume increments during a fade-in
    #[arg(long, default_value_t = FadeSettings::DEFAULT_STEPS)]
    fade_steps: u32,

    /// Keep running when the controller disconnects
    #[arg(long)]
    stay_alive_on_disconnect: bool,

    /// Do not reload config.json when it changes on disk
    #[arg(long)]
    no_watch: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every active audio session and exit
    Sessions,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn config_path(dir: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir,
        None => ConfigStore::default_config_dir()?,
    };
    Ok(dir.join(CONFIG_FILE_NAME))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let fade_duration = Duration::try_from_secs_f64(cli.fade_duration)
        .with_context(|| format!("Invalid fade duration: {}", cli.fade_duration))?;
    let fade = FadeSettings::new(fade_duration, cli.fade_steps);

    let path = config_path(cli.config_dir)?;
    let config = Arc::new(ConfigStore::open(path.clone()).await);
    let provider = platform_provider();
    let shutdown = CancellationToken::new();
    let controller = Arc::new(MuteController::new(
        provider,
        config.clone(),
        fade,
        shutdown.clone(),
    ));

    if let Some(Commands::Sessions) = cli.command {
        return print_sessions(&controller).await;
    }

    tracing::info!("AudioStop starting...");

    let reloader = if cli.no_watch {
        None
    } else {
        match ConfigWatcher::new(&path).await {
            Ok(watcher) => Some(watcher.spawn_reloader(config, shutdown.clone())),
            Err(e) => {
                tracing::warn!(error = %e, "Config hot-reload unavailable");
                None
            }
        }
    };

    let addr = format!("{}:{}", cli.host, cli.port);
    let options = ServerOptions {
        shutdown_on_disconnect: !cli.stay_alive_on_disconnect,
    };
    let handler = CommandHandler::new(controller.clone(), shutdown.clone());
    let server = CommandServer::bind(&addr, handler, shutdown.clone(), options)
        .await
        .with_context(|| format!("Could not start command server on {}", addr))?;

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted");
            ctrl_c.cancel();
        }
    });

    let result = server.run().await;

    shutdown.cancel();
    controller.shutdown().await;
    if let Some(reloader) = reloader {
        let _ = reloader.await;
    }

    tracing::info!("AudioStop stopped");
    Ok(result?)
}

async fn print_sessions(controller: &MuteController) -> anyhow::Result<()> {
    let sessions = controller
        .list_sessions()
        .context("Failed to enumerate audio sessions")?;
    let config = controller.config().read().await;

    if sessions.is_empty() {
        println!("No active audio sessions");
        return Ok(());
    }

    println!("{:<8} {:<32} {:>7}  TARGET", "PID", "PROCESS", "VOLUME");
    for session in sessions {
        println!(
            "{:<8} {:<32} {:>6.0}%  {}",
            session.process_id,
            session.process_name,
            session.volume * 100.0,
            if config.is_target(&session.process_name) { "yes" } else { "" }
        );
    }
    Ok(())
}

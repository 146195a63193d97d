//! Integration tests for the command server
//!
//! These drive a real server over a loopback socket with the in-memory
//! session provider, covering the full command round trip.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use audiostop_core::domain::config::{ConfigStore, ConfigUpdate, CONFIG_FILE_NAME};
use audiostop_core::domain::controller::MuteController;
use audiostop_core::domain::fade::FadeSettings;
use audiostop_core::domain::session::MemorySessionProvider;
use audiostop_infra::server::{CommandHandler, CommandServer, ServerOptions};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    dir: TempDir,
    provider: Arc<MemorySessionProvider>,
    shutdown: CancellationToken,
    addr: SocketAddr,
    server: JoinHandle<()>,
}

impl Harness {
    async fn start(options: ServerOptions) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join(CONFIG_FILE_NAME)).await);
        config
            .update(ConfigUpdate {
                target_processes: Some(vec!["chrome.exe".to_string()]),
                unmute_delay_seconds: Some(0.25),
                ..Default::default()
            })
            .await
            .unwrap();

        let provider = Arc::new(MemorySessionProvider::new());
        let shutdown = CancellationToken::new();
        let controller = Arc::new(MuteController::new(
            provider.clone(),
            config,
            FadeSettings::new(Duration::from_millis(100), 5),
            shutdown.clone(),
        ));
        let handler = CommandHandler::new(controller, shutdown.clone());
        let server = CommandServer::bind("127.0.0.1:0", handler, shutdown.clone(), options)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let server = tokio::spawn(async move {
            server.run().await.unwrap();
        });

        Self {
            dir,
            provider,
            shutdown,
            addr,
            server,
        }
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}", self.addr)).await.unwrap();
        client
    }

    async fn stopped(self) {
        timeout(Duration::from_secs(5), self.server)
            .await
            .expect("server did not stop")
            .unwrap();
    }
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.to_string())).await.unwrap();
}

/// Next text frame as JSON
async fn recv(client: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no reply in time")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_mute_then_unmute_fades_back_in() {
    let harness = Harness::start(ServerOptions::default()).await;
    let chrome = harness.provider.add_session("chrome.exe", 100, 0.8);
    let notepad = harness.provider.add_session("notepad.exe", 200, 0.5);
    let mut client = harness.connect().await;

    send(&mut client, "mute").await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "muted", "affected_sessions": 1, "muting_enabled": true})
    );
    assert_eq!(harness.provider.volume(&chrome), Some(0.0));
    assert_eq!(harness.provider.volume(&notepad), Some(0.5));

    send(&mut client, r#"{"type":"unmute"}"#).await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["type"], "unmute_scheduled");
    assert_eq!(reply["delay_seconds"], 0.25);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.provider.volume(&chrome), Some(0.0));

    sleep(Duration::from_millis(650)).await;
    assert_eq!(harness.provider.volume(&chrome), Some(1.0));
    assert_eq!(harness.provider.volume(&notepad), Some(0.5));
}

#[tokio::test]
async fn test_mute_replaces_pending_unmute() {
    let harness = Harness::start(ServerOptions::default()).await;
    let chrome = harness.provider.add_session("chrome.exe", 100, 0.8);
    let mut client = harness.connect().await;

    send(&mut client, "mute").await;
    recv(&mut client).await;
    send(&mut client, "unmute").await;
    recv(&mut client).await;
    send(&mut client, "mute").await;
    let reply = recv(&mut client).await;
    assert_eq!(reply["affected_sessions"], 0);

    sleep(Duration::from_millis(700)).await;
    assert_eq!(harness.provider.volume(&chrome), Some(0.0));
    assert_eq!(harness.provider.history(&chrome), vec![0.0]);
}

#[tokio::test]
async fn test_unrecognized_messages_keep_connection_open() {
    let harness = Harness::start(ServerOptions::default()).await;
    let mut client = harness.connect().await;

    send(&mut client, "hello").await;
    send(&mut client, r#"{"type":"dance"}"#).await;
    send(&mut client, r#"{"type":"update_config","muting_enabled":"yes"}"#).await;
    send(&mut client, "ping").await;

    assert_eq!(recv(&mut client).await, json!({"type": "pong"}));
    assert!(!harness.shutdown.is_cancelled());
}

#[tokio::test]
async fn test_get_audio_apps_deduplicates_processes() {
    let harness = Harness::start(ServerOptions::default()).await;
    harness.provider.add_session("chrome.exe", 100, 1.0);
    harness.provider.add_session("chrome.exe", 101, 1.0);
    harness.provider.add_session("audiodg.exe", 4, 1.0);
    let mut client = harness.connect().await;

    send(&mut client, r#"{"type":"get_audio_apps"}"#).await;
    let reply = recv(&mut client).await;

    assert_eq!(reply["type"], "audio_apps_list");
    assert_eq!(reply["success"], true);
    assert_eq!(reply["apps"].as_array().map(Vec::len), Some(1));
    assert_eq!(reply["apps"][0]["name"], "chrome.exe");
    assert_eq!(reply["apps"][0]["fullPath"], "");
    assert_eq!(reply["current_targets"], json!(["chrome.exe"]));
}

#[tokio::test]
async fn test_update_config_persists_and_applies() {
    let harness = Harness::start(ServerOptions::default()).await;
    let chrome = harness.provider.add_session("chrome.exe", 100, 0.8);
    let mut client = harness.connect().await;

    send(
        &mut client,
        r#"{"type":"update_config","target_processes":["vlc.exe"],"muting_enabled":false}"#,
    )
    .await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "config_updated", "success": true})
    );

    send(&mut client, r#"{"type":"get_config"}"#).await;
    let config = recv(&mut client).await;
    assert_eq!(config["type"], "config_data");
    assert_eq!(config["target_processes"], json!(["vlc.exe"]));
    assert_eq!(config["muting_enabled"], false);
    assert_eq!(config["unmute_delay_seconds"], 0.25);

    let on_disk: Value = serde_json::from_str(
        &std::fs::read_to_string(harness.dir.path().join(CONFIG_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk["target_processes"], json!(["vlc.exe"]));
    assert_eq!(on_disk["muting_enabled"], false);

    send(&mut client, "mute").await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "muted", "affected_sessions": 0, "muting_enabled": false})
    );
    assert_eq!(harness.provider.volume(&chrome), Some(0.8));

    send(&mut client, "unmute").await;
    assert_eq!(
        recv(&mut client).await,
        json!({"type": "unmute_scheduled", "muting_enabled": false})
    );
}

#[tokio::test]
async fn test_invalid_config_update_reports_error() {
    let harness = Harness::start(ServerOptions::default()).await;
    let mut client = harness.connect().await;

    send(&mut client, r#"{"type":"update_config","unmute_delay_seconds":-2}"#).await;
    let reply = recv(&mut client).await;

    assert_eq!(reply["type"], "config_updated");
    assert_eq!(reply["success"], false);
    assert!(reply["error"].is_string());
}

#[tokio::test]
async fn test_shutdown_command_closes_connection() {
    let harness = Harness::start(ServerOptions::default()).await;
    let mut client = harness.connect().await;

    send(&mut client, "shutdown").await;

    let closed = timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(harness.shutdown.is_cancelled());
    harness.stopped().await;
}

#[tokio::test]
async fn test_disconnect_shuts_down_by_default() {
    let harness = Harness::start(ServerOptions::default()).await;
    let mut client = harness.connect().await;

    client.close(None).await.unwrap();
    drop(client);

    let shutdown = harness.shutdown.clone();
    harness.stopped().await;
    assert!(shutdown.is_cancelled());
}

#[tokio::test]
async fn test_stay_alive_accepts_next_controller() {
    let harness = Harness::start(ServerOptions {
        shutdown_on_disconnect: false,
    })
    .await;

    let mut first = harness.connect().await;
    first.close(None).await.unwrap();
    drop(first);

    let mut second = harness.connect().await;
    send(&mut second, "ping").await;
    assert_eq!(recv(&mut second).await, json!({"type": "pong"}));
    assert!(!harness.shutdown.is_cancelled());

    harness.shutdown.cancel();
    harness.stopped().await;
}

#[tokio::test]
async fn test_shutdown_during_stalled_handshake() {
    let harness = Harness::start(ServerOptions::default()).await;

    // Connects at the TCP level but never sends the upgrade request
    let _silent = TcpStream::connect(harness.addr).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    harness.shutdown.cancel();
    timeout(Duration::from_secs(3), harness.server)
        .await
        .expect("server still waiting on the handshake after shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_ping_frame_gets_single_pong() {
    let harness = Harness::start(ServerOptions::default()).await;
    let mut client = harness.connect().await;

    client.send(Message::Ping(b"beat".to_vec())).await.unwrap();
    send(&mut client, "ping").await;

    let mut pongs = 0;
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no reply in time")
            .expect("connection closed")
            .unwrap();
        match frame {
            Message::Pong(data) => {
                assert_eq!(data, b"beat".to_vec());
                pongs += 1;
            }
            Message::Text(text) => {
                assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), json!({"type": "pong"}));
                break;
            }
            _ => {}
        }
    }
    assert_eq!(pongs, 1);
}

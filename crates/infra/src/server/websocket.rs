//! WebSocket server for remote mute control
//!
//! Serves one controller connection at a time. Each text frame is parsed
//! into a [`Command`] and handled in arrival order.

use std::net::SocketAddr;
use std::time::Duration;

use audiostop_core::domain::protocol::Command;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handler::CommandHandler;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Longest time a client may take to complete the upgrade request
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by the command server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Behaviour switches for the server
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Treat the controller disconnecting as a shutdown request
    pub shutdown_on_disconnect: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            shutdown_on_disconnect: true,
        }
    }
}

/// How a controller connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Disconnected,
    Shutdown,
}

/// WebSocket server driving a [`CommandHandler`]
pub struct CommandServer {
    listener: TcpListener,
    handler: CommandHandler,
    shutdown: CancellationToken,
    options: ServerOptions,
}

impl CommandServer {
    pub const DEFAULT_ADDR: &'static str = "127.0.0.1:3350";

    /// Bind the listening socket; failure here is fatal for the process
    pub async fn bind(
        addr: &str,
        handler: CommandHandler,
        shutdown: CancellationToken,
        options: ServerOptions,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            handler,
            shutdown,
            options,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve controllers until shutdown
    pub async fn run(self) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Command server listening on ws://{}", addr);

        loop {
            let (stream, peer) = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            let handshake = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream));
            let ws_stream = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = handshake => match accepted {
                    Ok(Ok(ws_stream)) => ws_stream,
                    Ok(Err(e)) => {
                        warn!(%peer, error = %e, "WebSocket handshake failed");
                        continue;
                    }
                    Err(_) => {
                        warn!(%peer, "WebSocket handshake timed out");
                        continue;
                    }
                },
            };

            info!(%peer, "Controller connected");
            match self.serve(ws_stream, peer).await {
                ConnectionEnd::Shutdown => break,
                ConnectionEnd::Disconnected => {
                    info!(%peer, "Controller disconnected");
                    if self.options.shutdown_on_disconnect {
                        info!("Controller gone, shutting down");
                        self.shutdown.cancel();
                        break;
                    }
                }
            }
        }

        info!("Command server stopped");
        Ok(())
    }

    /// Handle a single controller connection
    async fn serve(&self, ws_stream: WebSocketStream<TcpStream>, peer: SocketAddr) -> ConnectionEnd {
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        debug!(%peer, message = %text, "Received message");
                        let command = match Command::parse(&text) {
                            Ok(command) => command,
                            Err(e) => {
                                warn!(%peer, error = %e, "Ignoring message");
                                continue;
                            }
                        };

                        if let Some(reply) = self.handler.handle(command).await {
                            if let Err(e) = write.send(Message::Text(reply.to_json())).await {
                                warn!(%peer, error = %e, "Failed to send reply");
                                return ConnectionEnd::Disconnected;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return ConnectionEnd::Disconnected,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "WebSocket error");
                        return ConnectionEnd::Disconnected;
                    }
                },
            }
        }
    }
}

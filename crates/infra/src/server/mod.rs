//! Command server for the remote controller
//!
//! Provides the WebSocket endpoint and the dispatch of parsed commands.

pub mod handler;
pub mod websocket;

pub use handler::CommandHandler;
pub use websocket::{CommandServer, ServerError, ServerOptions};

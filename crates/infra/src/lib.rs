//! AudioStop infrastructure: native session backends and the command server

pub mod audio;
pub mod server;

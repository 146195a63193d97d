//! End-to-end tests for AudioStop

#[cfg(test)]
mod server_integration;

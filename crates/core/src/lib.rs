//! AudioStop core: configuration, session orchestration and the wire protocol
//!
//! Platform backends and the network server live in `audiostop-infra`.

pub mod domain;

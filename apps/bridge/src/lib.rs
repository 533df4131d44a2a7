//! [apps/bridge/src/lib.rs]
//! Library root for the bridge binary; re-exports the composition types so
//! the startup sequence in `main.rs` and integration tests share one place
//! to build a fully-wired engine from a `BridgeConfig`.

pub mod config;
pub mod supervisor;

pub use config::BridgeConfig;
pub use supervisor::Supervisor;

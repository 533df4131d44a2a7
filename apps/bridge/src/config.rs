//! [apps/bridge/src/config.rs]
//! Command-line and environment configuration (spec §6). Every field has a
//! `#[arg(long, env = "...")]` fallback so the bridge can run purely off
//! environment variables in a container, or purely off flags in a shell.

use std::time::Duration;

use clap::Parser;
use spoolbridge_sync_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "Syncs an NFC filament-spool Device into a downstream Inventory service.")]
pub struct BridgeConfig {
    /// Device REST scheme (http or https).
    #[arg(long, env = "DEVICE_SCHEME", default_value = "http")]
    pub device_scheme: String,

    /// Device hostname or IP address.
    #[arg(long, env = "DEVICE_HOST")]
    pub device_host: String,

    /// Device REST port.
    #[arg(long, env = "DEVICE_PORT", default_value_t = 80)]
    pub device_port: u16,

    /// Shared security key used to derive the Device's AES-GCM key.
    #[arg(long, env = "DEVICE_SECURITY_KEY")]
    pub device_security_key: String,

    /// Inventory REST scheme (http or https).
    #[arg(long, env = "INVENTORY_SCHEME", default_value = "http")]
    pub inventory_scheme: String,

    /// Inventory hostname or IP address.
    #[arg(long, env = "INVENTORY_HOST")]
    pub inventory_host: String,

    /// Inventory REST port.
    #[arg(long, env = "INVENTORY_PORT", default_value_t = 8080)]
    pub inventory_port: u16,

    /// Path relative to the Inventory base URL for the event WebSocket.
    #[arg(long, env = "INVENTORY_EVENTS_PATH", default_value = "/api/v1/events")]
    pub inventory_events_path: String,

    /// Interval between full polling sweeps, in seconds.
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Minimum consumption delta, in grams, worth pushing to Inventory.
    #[arg(long, env = "DELTA_THRESHOLD_G", default_value_t = 0.1)]
    pub delta_threshold_g: f64,

    /// Delay after startup recovery before the first full sync runs, in seconds.
    #[arg(long, env = "INITIAL_SYNC_DELAY_SECS", default_value_t = 5)]
    pub initial_sync_delay_secs: u64,

    /// Maximum number of spools reconciled concurrently within one sync pass.
    #[arg(long, env = "SYNC_FAN_OUT", default_value_t = 8)]
    pub sync_fan_out: usize,

    /// Path to the persisted tag_id-to-spool mapping file.
    #[arg(long, env = "MAPPING_FILE", default_value = "./spool_mapping.json")]
    pub mapping_file: String,

    /// Log level used when `RUST_LOG`/`SPOOLBRIDGE_LOG` are unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl BridgeConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            delta_threshold_g: self.delta_threshold_g,
            initial_sync_delay: Duration::from_secs(self.initial_sync_delay_secs),
            fan_out: self.sync_fan_out,
        }
    }
}

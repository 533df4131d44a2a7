//! [libs/domain/sync-engine/src/config.rs]

use std::time::Duration;

/// Tunable engine parameters (spec §6). Everything here has a sensible
/// default per spec §6 except where the Supervisor is required to supply
/// a value explicitly (Device host/key, which live outside this crate).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub delta_threshold_g: f64,
    pub initial_sync_delay: Duration,
    /// Bounded fan-out width for per-spool Inventory calls within one sync
    /// pass (spec §5: "bounded fan-out, e.g. 8").
    pub fan_out: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            delta_threshold_g: 0.1,
            initial_sync_delay: Duration::from_secs(5),
            fan_out: 8,
        }
    }
}

//! [libs/domain/sync-engine/src/errors.rs]

use thiserror::Error;

/// Fatal startup failures (spec §4.6.1, §6): the process should exit
/// non-zero rather than enter steady state.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("device security key is wrong: {0}")]
    DeviceAuth(#[source] spoolbridge_device_client::DeviceClientError),

    #[error("inventory schema setup failed: {0}")]
    SchemaSetup(#[source] spoolbridge_inventory_client::InventoryClientError),
}

/// Per-spool reconciliation outcome, used for logging and for the
/// per-spool-isolation tests (spec §7, §8.9): one failing spool never
/// blocks progress on another in the same full-sync pass.
#[derive(Debug)]
pub enum ReconcileError {
    Device(spoolbridge_device_client::DeviceClientError),
    Inventory(spoolbridge_inventory_client::InventoryClientError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Device(e) => write!(f, "device error: {e}"),
            ReconcileError::Inventory(e) => write!(f, "inventory error: {e}"),
        }
    }
}

impl From<spoolbridge_inventory_client::InventoryClientError> for ReconcileError {
    fn from(e: spoolbridge_inventory_client::InventoryClientError) -> Self {
        ReconcileError::Inventory(e)
    }
}

//! [apps/bridge/src/supervisor.rs]
//! Composition root (spec §4.6, §5 Cancellation): builds the Device and
//! Inventory clients and the Mapping store from a `BridgeConfig`, runs
//! startup recovery, then owns the lifetime of the poll loop, the event
//! loop, and the debounced mapping saver until a shutdown signal arrives.
//! Parses config, builds dependencies, runs one fallible startup phase,
//! then hands off to long-lived loops behind a shared cancellation signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use spoolbridge_device_client::DeviceClient;
use spoolbridge_inventory_client::InventoryClient;
use spoolbridge_mapping_store::{spawn_debounced_saver, MappingStore};
use spoolbridge_sync_engine::{ShutdownSignal, SyncEngine};
use tracing::{info, warn};

use crate::config::BridgeConfig;

/// Grace period given to in-flight work after a shutdown signal before the
/// process forces a final mapping save and exits (spec §5 Cancellation).
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

pub struct Supervisor {
    engine: Arc<SyncEngine>,
    mapping: Arc<MappingStore>,
    shutdown: Arc<ShutdownSignal>,
    events_path: String,
}

impl Supervisor {
    pub async fn from_config(config: &BridgeConfig) -> anyhow::Result<Self> {
        let device = Arc::new(DeviceClient::new(
            &config.device_scheme,
            &config.device_host,
            config.device_port,
            config.device_security_key.clone(),
        ));
        let inventory = Arc::new(InventoryClient::new(
            &config.inventory_scheme,
            &config.inventory_host,
            config.inventory_port,
        ));
        let mapping = Arc::new(MappingStore::new(config.mapping_file.clone()));

        let engine = Arc::new(SyncEngine::new(
            device,
            inventory,
            Arc::clone(&mapping),
            config.engine_config(),
        ));

        Ok(Self {
            engine,
            mapping,
            shutdown: Arc::new(ShutdownSignal::new()),
            events_path: config.inventory_events_path.clone(),
        })
    }

    /// Runs startup recovery, then the poll loop, event loop, and debounced
    /// saver concurrently until shutdown is signalled. Returns once all
    /// loops have exited and the final mapping save has been attempted.
    pub async fn run(self) -> anyhow::Result<()> {
        self.engine
            .run_startup()
            .await
            .context("startup recovery failed")?;

        let saver = spawn_debounced_saver(Arc::clone(&self.mapping));

        let poll_handle = {
            let engine = Arc::clone(&self.engine);
            let shutdown = Arc::clone(&self.shutdown);
            tokio::spawn(async move { engine.run_poll_loop(shutdown).await })
        };

        let event_handle = {
            let engine = Arc::clone(&self.engine);
            let shutdown = Arc::clone(&self.shutdown);
            let events_path = self.events_path.clone();
            tokio::spawn(async move { engine.run_event_loop(&events_path, shutdown).await })
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("failed to install ctrl_c handler: {e}");
                }
                info!("shutdown requested, stopping loops");
            }
            _ = self.shutdown.cancelled() => {
                info!("shutdown signalled internally, stopping loops");
            }
        }

        self.shutdown.trigger();
        saver.abort();

        if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, async {
            let _ = poll_handle.await;
            let _ = event_handle.await;
        })
        .await
        .is_err()
        {
            warn!("loops did not stop within the shutdown grace period, forcing exit");
        }

        if let Err(e) = self.mapping.save_now().await {
            warn!("final mapping save failed: {e}");
        }

        Ok(())
    }
}

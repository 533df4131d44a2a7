//! [libs/domain/sync-engine/src/engine.rs]
//! The Sync Engine (spec §4.6): composes the startup sequence, full sync,
//! the incremental polling loop, and the event loop. A struct holding
//! `Arc`-shared clients plus a shutdown signal; each long-lived loop logs
//! and sleeps on a transient failure rather than aborting the process, and
//! the polling loop additionally backs off its tick interval under
//! sustained failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::Utc;
use spoolbridge_device_client::{DeviceClient, DeviceClientError};
use spoolbridge_inventory_client::InventoryClient;
use spoolbridge_mapping_store::MappingStore;
use spoolbridge_models::{DeviceRecord, InventoryEvent, MappingEntry};
use tokio::sync::Semaphore;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::errors::StartupError;
use crate::reconcile::{reconcile_one, ReconcileOutcome};
use crate::shutdown::ShutdownSignal;

/// Tally of what a full-sync pass did, returned for logging and for tests.
#[derive(Debug, Default, PartialEq)]
pub struct SyncSummary {
    pub created: usize,
    pub usage_pushed: usize,
    pub refilled: usize,
    pub metadata_updated: usize,
    pub sub_threshold: usize,
    pub unchanged: usize,
    pub errors: usize,
    pub vanished: usize,
}

pub struct SyncEngine {
    device: Arc<DeviceClient>,
    inventory: Arc<InventoryClient>,
    mapping: Arc<MappingStore>,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(
        device: Arc<DeviceClient>,
        inventory: Arc<InventoryClient>,
        mapping: Arc<MappingStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            device,
            inventory,
            mapping,
            config,
        }
    }

    /// Startup sequence (spec §4.6.1): validate the Device key (fatal on
    /// `AuthError`, retried with backoff on `Unreachable` since the Device
    /// may still be booting), declare the Inventory extra-field schema,
    /// recover the Mapping, wait the configured delay, then run one full
    /// sync before entering steady state.
    #[instrument(skip(self))]
    pub async fn run_startup(&self) -> Result<(), StartupError> {
        self.validate_device_key_with_retry().await?;

        self.inventory
            .ensure_extra_field_schema()
            .await
            .map_err(StartupError::SchemaSetup)?;

        self.recover_mapping().await;

        tokio::time::sleep(self.config.initial_sync_delay).await;
        let summary = self.full_sync().await;
        info!(?summary, "initial full sync complete");
        Ok(())
    }

    async fn validate_device_key_with_retry(&self) -> Result<(), StartupError> {
        let mut backoff = unreachable_backoff();
        loop {
            match self.device.validate_key().await {
                Ok(()) => return Ok(()),
                Err(DeviceClientError::Auth) => {
                    return Err(StartupError::DeviceAuth(DeviceClientError::Auth));
                }
                Err(e @ DeviceClientError::Unreachable(_)) => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(60));
                    warn!("device unreachable at startup ({e}), retrying in {wait:?}");
                    tokio::time::sleep(wait).await;
                }
                Err(e @ DeviceClientError::Protocol(_)) => {
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(60));
                    warn!("device protocol error at startup ({e}), retrying in {wait:?}");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Mapping recovery (spec §4.6.1 step 3): load the persisted file; if
    /// absent or unparseable, rebuild from the Inventory catalog by reading
    /// the `tag_id` extra field off every spool.
    #[instrument(skip(self))]
    async fn recover_mapping(&self) {
        match self.mapping.load().await {
            Ok(true) => {
                info!(count = self.mapping.len().await, "mapping recovered from disk");
                return;
            }
            Ok(false) => info!("no mapping file on disk, rebuilding from inventory"),
            Err(e) => warn!("mapping file unreadable ({e}), rebuilding from inventory"),
        }

        let spools = match self.inventory.list_spools().await {
            Ok(spools) => spools,
            Err(e) => {
                error!("could not list inventory spools during mapping recovery: {e}");
                return;
            }
        };

        let now = Utc::now();
        let mut rebuilt = HashMap::new();
        for spool in &spools {
            if let Some(tag_id) = spool.tag_id() {
                rebuilt.insert(
                    tag_id.to_string(),
                    MappingEntry::new(spool.id.clone(), spool.remaining_weight_g(), now),
                );
            }
        }

        info!(count = rebuilt.len(), "mapping rebuilt from inventory catalog");
        self.mapping.replace_all(rebuilt).await;
        if let Err(e) = self.mapping.save_now().await {
            warn!("could not persist recovered mapping: {e}");
        }
    }

    /// One full reconciliation pass (spec §4.6.2). Fetches the Device
    /// catalog, diffs it against the current Mapping, and reconciles each
    /// spool independently with bounded fan-out. A spool's failure is
    /// logged and counted; it never prevents progress on another spool in
    /// the same pass (spec §7, §8.9).
    #[instrument(skip(self))]
    pub async fn full_sync(&self) -> SyncSummary {
        let records = match self.device.list_spools().await {
            Ok(records) => records,
            Err(e) => {
                warn!("full sync skipped, device unreachable or protocol error: {e}");
                return SyncSummary::default();
            }
        };

        let mapping_snapshot = self.mapping.snapshot().await;
        let device_tag_ids: std::collections::HashSet<String> =
            records.iter().map(|r| r.tag_id.clone()).collect();

        let semaphore = Arc::new(Semaphore::new(self.config.fan_out.max(1)));
        let mut tasks = Vec::with_capacity(records.len());

        for record in records {
            let existing = mapping_snapshot.get(&record.tag_id).cloned();
            let inventory = Arc::clone(&self.inventory);
            let mapping = Arc::clone(&self.mapping);
            let threshold = self.config.delta_threshold_g;
            let permit = Arc::clone(&semaphore);

            tasks.push(tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore is never closed");
                let outcome = reconcile_one(&inventory, &mapping, &record, existing, threshold).await;
                (record, outcome)
            }));
        }

        let mut summary = SyncSummary::default();
        for task in tasks {
            match task.await {
                Ok((record, Ok(outcome))) => {
                    debug!(tag_id = %record.tag_id, ?outcome, "reconciled spool");
                    tally(&mut summary, outcome);
                }
                Ok((record, Err(e))) => {
                    warn!(tag_id = %record.tag_id, "reconcile failed for spool, will retry next cycle: {e}");
                    summary.errors += 1;
                }
                Err(join_err) => {
                    error!("reconcile task panicked: {join_err}");
                    summary.errors += 1;
                }
            }
        }

        for tag_id in mapping_snapshot.keys() {
            if !device_tag_ids.contains(tag_id.as_str()) {
                warn!(%tag_id, "device no longer reports this tag; leaving inventory spool intact");
                summary.vanished += 1;
            }
        }

        summary
    }

    /// Incremental polling loop (spec §4.6.3). Runs full-sync on a fixed
    /// interval; a poll that fails end-to-end (Device unreachable) is
    /// already absorbed inside `full_sync`, so this loop only needs to
    /// pace itself and respond to shutdown.
    #[instrument(skip(self, shutdown))]
    pub async fn run_poll_loop(&self, shutdown: Arc<ShutdownSignal>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.full_sync().await;
                    debug!(?summary, "poll cycle complete");
                }
                _ = shutdown.cancelled() => {
                    info!("poll loop cancelled");
                    return;
                }
            }
        }
    }

    /// Event loop (spec §4.6.4). Subscribes to the Inventory push feed and
    /// dispatches `SpoolDeleted` / `SpoolUpdated` / `SpoolCreated`; on
    /// reconnect (`StreamResynced`) schedules an immediate full sync to
    /// recover whatever was missed while disconnected (spec §4.4, §8
    /// scenario S6).
    #[instrument(skip(self, shutdown))]
    pub async fn run_event_loop(&self, events_path: &str, shutdown: Arc<ShutdownSignal>) {
        let mut rx = self.inventory.subscribe_events(events_path);

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(InventoryEvent::StreamResynced) => {
                            info!("event stream resynced, running recovery full sync");
                            let summary = self.full_sync().await;
                            debug!(?summary, "recovery full sync complete");
                        }
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("event stream closed permanently");
                            return;
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("event loop cancelled");
                    return;
                }
            }
        }
    }

    async fn handle_event(&self, event: InventoryEvent) {
        match event {
            InventoryEvent::SpoolDeleted { payload } => {
                if let Some(tag_id) = self.mapping.reverse_lookup(&payload.id).await {
                    self.mapping.remove(&tag_id).await;
                    info!(%tag_id, inventory_spool_id = %payload.id, "mapping removed after inventory deletion");
                }
            }
            InventoryEvent::SpoolUpdated { payload } => {
                if let Some(mapped_tag) = self.mapping.reverse_lookup(&payload.id).await {
                    match payload.tag_id() {
                        Some(current_tag) if current_tag == mapped_tag => {
                            // Still carries the mapped tag_id: no action.
                        }
                        _ => {
                            self.mapping.remove(&mapped_tag).await;
                            info!(tag_id = %mapped_tag, "tag_id cleared or changed on inventory spool, mapping dropped");
                        }
                    }
                }
            }
            InventoryEvent::SpoolCreated { payload } => {
                if let Some(tag_id) = payload.tag_id() {
                    if self.mapping.get(tag_id).await.is_none() {
                        self.mapping
                            .upsert(
                                tag_id.to_string(),
                                MappingEntry::new(payload.id.clone(), payload.remaining_weight_g(), Utc::now()),
                            )
                            .await;
                        info!(%tag_id, inventory_spool_id = %payload.id, "mapping inserted from inventory-side creation");
                    }
                }
            }
            InventoryEvent::StreamResynced => unreachable!("handled by the caller before dispatch"),
        }
    }

    pub fn mapping(&self) -> &Arc<MappingStore> {
        &self.mapping
    }
}

fn unreachable_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(60),
        multiplier: 2.0,
        randomization_factor: 0.5,
        max_elapsed_time: None,
        ..Default::default()
    }
}

fn tally(summary: &mut SyncSummary, outcome: ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Created { .. } => summary.created += 1,
        ReconcileOutcome::UsagePushed { .. } => summary.usage_pushed += 1,
        ReconcileOutcome::Refilled { .. } => summary.refilled += 1,
        ReconcileOutcome::MetadataUpdated => summary.metadata_updated += 1,
        ReconcileOutcome::SubThreshold => summary.sub_threshold += 1,
        ReconcileOutcome::Unchanged => summary.unchanged += 1,
    }
}

/// Record classification helper exposed for tests (spec §8.4/§8.5/§8.6):
/// the `new` vs `existing` split full-sync performs before reconciling.
pub fn classify<'a>(
    records: &'a [DeviceRecord],
    mapping: &HashMap<String, MappingEntry>,
) -> (Vec<&'a DeviceRecord>, Vec<&'a DeviceRecord>) {
    records.iter().partition(|r| !mapping.contains_key(&r.tag_id))
}

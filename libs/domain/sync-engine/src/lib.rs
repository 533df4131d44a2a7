//! [libs/domain/sync-engine/src/lib.rs]
//! The Sync Engine (spec §4.6, component C6): owns startup recovery, the
//! per-spool reconciliation algorithm, the fixed-interval poller, and the
//! Inventory event listener. Everything else in the workspace exists to
//! serve this crate's loops.

pub mod config;
pub mod engine;
pub mod errors;
pub mod reconcile;
pub mod retry;
pub mod shutdown;

pub use config::EngineConfig;
pub use engine::{SyncEngine, SyncSummary};
pub use errors::{ReconcileError, StartupError};
pub use reconcile::{reconcile_one, ReconcileOutcome};
pub use retry::with_retry;
pub use shutdown::ShutdownSignal;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use chrono::Utc;
    use spoolbridge_models::{DeviceRecord, MappingEntry};

    fn record(tag_id: &str, remaining_g: f64) -> DeviceRecord {
        DeviceRecord {
            tag_id: tag_id.to_string(),
            material: "PLA".to_string(),
            brand: "Acme".to_string(),
            color_name: "Black".to_string(),
            color_hex: Some("#000000".to_string()),
            nominal_weight_g: 1000.0,
            empty_weight_g: 250.0,
            remaining_g,
            device_spool_id: 1,
        }
    }

    /// Classification (spec §8.4) is a pure partition: a tag_id absent from
    /// the Mapping snapshot is always "new", regardless of how many other
    /// tags are present.
    #[test]
    fn classify_splits_new_from_existing() {
        let mut mapping = HashMap::new();
        mapping.insert(
            "TAG-1".to_string(),
            MappingEntry::new("spool-1", 900.0, Utc::now()),
        );

        let records = vec![record("TAG-1", 850.0), record("TAG-2", 1000.0)];
        let (new, existing) = engine::classify(&records, &mapping);

        assert_eq!(new.len(), 1);
        assert_eq!(new[0].tag_id, "TAG-2");
        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].tag_id, "TAG-1");
    }

    #[test]
    fn classify_with_empty_mapping_treats_everything_as_new() {
        let mapping = HashMap::new();
        let records = vec![record("TAG-1", 900.0), record("TAG-2", 500.0)];
        let (new, existing) = engine::classify(&records, &mapping);

        assert_eq!(new.len(), 2);
        assert!(existing.is_empty());
    }

    #[tokio::test]
    async fn shutdown_signal_cancels_immediately_once_triggered() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        signal.trigger();
        assert!(signal.is_triggered());

        // Already triggered: `cancelled()` must resolve without blocking.
        tokio::time::timeout(std::time::Duration::from_millis(50), signal.cancelled())
            .await
            .expect("cancelled() resolved immediately once triggered");
    }

    #[tokio::test]
    async fn shutdown_signal_wakes_a_pending_waiter() {
        use std::sync::Arc;

        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move {
                signal.cancelled().await;
            })
        };

        // Give the waiter a chance to register with the Notify before
        // triggering, so this actually exercises the wake path rather than
        // the already-triggered fast path.
        tokio::task::yield_now().await;
        signal.trigger();

        tokio::time::timeout(std::time::Duration::from_millis(200), waiter)
            .await
            .expect("waiter woke up after trigger")
            .expect("waiter task did not panic");
    }
}

//! [libs/domain/sync-engine/src/retry.rs]
//! Bounded backoff retry for Inventory calls (spec §7: `InventoryError`
//! policy — "5xx → retry with backoff up to a bound, then skip"). A 4xx or
//! decode failure is never retried: no amount of waiting fixes a bad
//! payload or a schema drift, so those propagate to the caller immediately
//! and are counted against the current spool only (spec §7, §8.9
//! per-spool isolation).

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use spoolbridge_inventory_client::InventoryClientError;
use tracing::warn;

fn inventory_retry_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        max_interval: Duration::from_secs(5),
        multiplier: 2.0,
        randomization_factor: 0.5,
        max_elapsed_time: Some(Duration::from_secs(15)),
        ..Default::default()
    }
}

/// Calls `attempt` until it succeeds, returns a non-retryable error, or the
/// retry budget (spec: "up to a bound") is exhausted — whichever comes
/// first. Transport failures and 5xx responses are retried; everything else
/// is returned on the first try.
pub async fn with_retry<T, F, Fut>(mut attempt: F) -> Result<T, InventoryClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InventoryClientError>>,
{
    let mut backoff = inventory_retry_backoff();
    let mut tries: u32 = 0;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                tries += 1;
                match backoff.next_backoff() {
                    Some(wait) => {
                        warn!(tries, ?wait, "inventory call failed, retrying: {e}");
                        tokio::time::sleep(wait).await;
                    }
                    None => {
                        warn!(tries, "inventory call exhausted its retry budget, skipping: {e}");
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
}

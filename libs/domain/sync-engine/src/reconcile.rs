//! [libs/domain/sync-engine/src/reconcile.rs]
//! Per-spool reconciliation (spec §4.6.2). One call here handles exactly
//! one Device record against the current Mapping state; the caller
//! (`engine::full_sync`) is responsible for per-spool error isolation and
//! for bounding how many of these run concurrently.

use std::collections::HashMap;

use chrono::Utc;
use spoolbridge_inventory_client::InventoryClient;
use spoolbridge_mapping_store::MappingStore;
use spoolbridge_models::{inventory::TAG_ID_EXTRA_FIELD, DeviceRecord, FilamentMetadata, MappingEntry, SpoolPatch};

use crate::errors::ReconcileError;
use crate::retry::with_retry;

/// What happened to one spool during a reconciliation pass. Carries enough
/// detail for the caller to log and for tests to assert on (spec §8).
#[derive(Debug, PartialEq)]
pub enum ReconcileOutcome {
    /// `tag_id ∈ D ∧ tag_id ∉ M`: a new Inventory spool was created.
    Created { inventory_spool_id: String },
    /// Consumption pushed as `add_usage`; baseline advanced.
    UsagePushed { delta_g: f64 },
    /// Device reports more filament than the baseline (refill/swap);
    /// pushed as an absolute `update_spool`, baseline advanced.
    Refilled { new_remaining_g: f64 },
    /// Delta below `delta_threshold_g`; no Inventory call, baseline held.
    SubThreshold,
    /// Metadata (brand/material/color) diverged and was patched; no usage
    /// change this pass.
    MetadataUpdated,
    /// Nothing diverged.
    Unchanged,
}

/// Reconciles one Device record. `existing` is the Mapping entry for this
/// `tag_id`, if any, taken as a snapshot before any network I/O — per spec
/// §5, the lock is held only to read the snapshot and later to apply the
/// result, never across the network call itself.
pub async fn reconcile_one(
    inventory: &InventoryClient,
    mapping: &MappingStore,
    record: &DeviceRecord,
    existing: Option<MappingEntry>,
    delta_threshold_g: f64,
) -> Result<ReconcileOutcome, ReconcileError> {
    match existing {
        None => create_new_spool(inventory, mapping, record).await,
        Some(entry) => reconcile_existing(inventory, mapping, record, entry, delta_threshold_g).await,
    }
}

async fn create_new_spool(
    inventory: &InventoryClient,
    mapping: &MappingStore,
    record: &DeviceRecord,
) -> Result<ReconcileOutcome, ReconcileError> {
    // `find_or_create_vendor` only ensures the catalog row exists; the
    // filament's own `vendor` field is the brand name, not the vendor id
    // (spec §8 scenario S1 expects the tuple `(Bambu, PLA, Red)`), so the
    // name is what gets passed to `find_or_create_filament` and what's
    // cached for the next divergence check.
    with_retry(|| inventory.find_or_create_vendor(&record.brand)).await?;
    let filament = with_retry(|| {
        inventory.find_or_create_filament(
            &record.brand,
            &record.material,
            &record.color_name,
            record.color_hex.as_deref(),
            None,
            None,
        )
    })
    .await?;

    let mut extra_fields = HashMap::new();
    extra_fields.insert(TAG_ID_EXTRA_FIELD.to_string(), record.tag_id.clone());

    let spool = with_retry(|| {
        inventory.create_spool(
            &filament.id,
            record.nominal_weight_g,
            record.used_weight_g(),
            &extra_fields,
        )
    })
    .await?;

    mapping
        .upsert(
            record.tag_id.clone(),
            MappingEntry::with_metadata(spool.id.clone(), record.remaining_g, Utc::now(), record.current_metadata()),
        )
        .await;

    Ok(ReconcileOutcome::Created {
        inventory_spool_id: spool.id,
    })
}

async fn reconcile_existing(
    inventory: &InventoryClient,
    mapping: &MappingStore,
    record: &DeviceRecord,
    entry: MappingEntry,
    delta_threshold_g: f64,
) -> Result<ReconcileOutcome, ReconcileError> {
    let delta_g = entry.last_remaining_g - record.remaining_g;

    if delta_g < 0.0 {
        // Device reports more filament than the baseline: a refill or a
        // swapped spool. Push the absolute remaining weight, never a
        // negative usage delta (spec §4.6.2).
        let spool = with_retry(|| inventory.get_spool(&entry.inventory_spool_id)).await?;
        let new_used_weight_g = (spool.initial_weight_g - record.remaining_g).max(0.0);
        let patch = SpoolPatch {
            used_weight_g: Some(new_used_weight_g),
            ..Default::default()
        };
        with_retry(|| inventory.update_spool(&entry.inventory_spool_id, &patch)).await?;

        mapping
            .upsert(
                record.tag_id.clone(),
                MappingEntry {
                    inventory_spool_id: entry.inventory_spool_id.clone(),
                    last_remaining_g: record.remaining_g,
                    last_synced_at: Utc::now(),
                    last_known_metadata: entry.last_known_metadata.clone(),
                },
            )
            .await;

        return Ok(ReconcileOutcome::Refilled {
            new_remaining_g: record.remaining_g,
        });
    }

    if delta_g >= delta_threshold_g {
        with_retry(|| inventory.add_usage(&entry.inventory_spool_id, delta_g)).await?;

        // Baseline only advances after Inventory confirms the write
        // (spec §9 Design Notes): advancing optimistically would silently
        // drop deltas on Inventory failure.
        mapping
            .upsert(
                record.tag_id.clone(),
                MappingEntry {
                    inventory_spool_id: entry.inventory_spool_id.clone(),
                    last_remaining_g: record.remaining_g,
                    last_synced_at: Utc::now(),
                    last_known_metadata: entry.last_known_metadata.clone(),
                },
            )
            .await;

        return Ok(ReconcileOutcome::UsagePushed { delta_g });
    }

    // Sub-threshold: compare against the metadata last confirmed against
    // Inventory. When it matches there is nothing left to check and no
    // Inventory call is made at all (spec §8.6, scenario S3). Only a
    // missing or stale cache (recovered mapping, inventory-side push event,
    // or a real drift) falls through to a network check.
    let current_metadata = record.current_metadata();
    if entry.last_known_metadata.as_ref() == Some(&current_metadata) {
        return Ok(sub_threshold_or_unchanged(delta_g));
    }

    let spool = with_retry(|| inventory.get_spool(&entry.inventory_spool_id)).await?;
    let filament = with_retry(|| inventory.get_filament_for_spool(&spool)).await?;

    if record.metadata_diverges_from(
        &filament.vendor,
        &filament.material,
        &filament.color_name,
        filament.color_hex.as_deref(),
    ) {
        with_retry(|| inventory.find_or_create_vendor(&record.brand)).await?;
        let updated_filament = with_retry(|| {
            inventory.find_or_create_filament(
                &record.brand,
                &record.material,
                &record.color_name,
                record.color_hex.as_deref(),
                filament.density,
                filament.diameter,
            )
        })
        .await?;
        let patch = SpoolPatch {
            filament_id: Some(updated_filament.id),
            ..Default::default()
        };
        with_retry(|| inventory.update_spool(&entry.inventory_spool_id, &patch)).await?;

        mapping
            .upsert(
                record.tag_id.clone(),
                MappingEntry::with_metadata(entry.inventory_spool_id.clone(), entry.last_remaining_g, entry.last_synced_at, current_metadata),
            )
            .await;

        return Ok(ReconcileOutcome::MetadataUpdated);
    }

    // Inventory still agrees with the Device even though our cache was
    // missing or stale; cache it now so the next poll skips this check.
    mapping
        .upsert(
            record.tag_id.clone(),
            MappingEntry::with_metadata(entry.inventory_spool_id.clone(), entry.last_remaining_g, entry.last_synced_at, current_metadata),
        )
        .await;

    Ok(sub_threshold_or_unchanged(delta_g))
}

fn sub_threshold_or_unchanged(delta_g: f64) -> ReconcileOutcome {
    if delta_g > 0.0 {
        // Below threshold: no Inventory call, baseline NOT advanced (spec §8.6).
        ReconcileOutcome::SubThreshold
    } else {
        ReconcileOutcome::Unchanged
    }
}

/// End-to-end exercises of `reconcile_one` against a real HTTP server (spec
/// §8 scenarios S1/S2/S3/S5), so the per-spool algorithm is verified against
/// the actual wire shapes `spoolbridge-inventory-client` sends and parses,
/// not just against its Rust-level return types.
#[cfg(test)]
mod tests {
    use super::*;
    use spoolbridge_mapping_store::MappingStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(remaining_g: f64) -> DeviceRecord {
        DeviceRecord {
            tag_id: "A1".to_string(),
            material: "PLA".to_string(),
            brand: "Bambu".to_string(),
            color_name: "Red".to_string(),
            color_hex: Some("FF0000".to_string()),
            nominal_weight_g: 1000.0,
            empty_weight_g: 250.0,
            remaining_g,
            device_spool_id: 1,
        }
    }

    fn mapping_store() -> (tempfile::TempDir, MappingStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MappingStore::new(dir.path().join("mapping.json"));
        (dir, store)
    }

    /// S1 — new spool: vendor and filament don't exist yet, a new Inventory
    /// spool is created, and the Mapping gets a fresh entry at the
    /// Device-reported baseline.
    #[tokio::test]
    async fn new_spool_creates_vendor_filament_and_spool() {
        let server = MockServer::start().await;
        Mock::given(method("GET")).and(path("/api/v1/vendors")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v1/vendors"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "vendor-1", "name": "Bambu"})))
            .mount(&server)
            .await;
        Mock::given(method("GET")).and(path("/api/v1/filaments")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        Mock::given(method("POST"))
            .and(path("/api/v1/filaments"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "fil-1", "vendor": "Bambu", "material": "PLA",
                "color_name": "Red", "color_hex": "FF0000", "density": null, "diameter": null,
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/spools"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "spool-1", "filament_id": "fil-1",
                "initial_weight_g": 1000.0, "used_weight_g": 0.0,
                "extra_fields": {"tag_id": "A1"},
            })))
            .mount(&server)
            .await;

        let inventory = spoolbridge_inventory_client::InventoryClient::from_base_url(server.uri());
        let (_dir, mapping) = mapping_store();

        let outcome = reconcile_one(&inventory, &mapping, &record(1000.0), None, 0.1).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created { inventory_spool_id: "spool-1".to_string() });

        let entry = mapping.get("A1").await.unwrap();
        assert_eq!(entry.inventory_spool_id, "spool-1");
        assert_eq!(entry.last_remaining_g, 1000.0);
    }

    /// S2 — consumption: a Δ at or above the threshold pushes exactly one
    /// `add_usage` call and advances the baseline to the new remaining_g.
    #[tokio::test]
    async fn consumption_above_threshold_pushes_usage_and_advances_baseline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/spools/spool-1/usage"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let inventory = spoolbridge_inventory_client::InventoryClient::from_base_url(server.uri());
        let (_dir, mapping) = mapping_store();
        let existing = MappingEntry::new("spool-1", 1000.0, Utc::now());

        let outcome = reconcile_one(&inventory, &mapping, &record(975.0), Some(existing), 0.1).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::UsagePushed { delta_g: 25.0 });
        assert_eq!(mapping.get("A1").await.unwrap().last_remaining_g, 975.0);
    }

    /// S3 — sub-threshold: when the cached metadata already matches the
    /// Device record, no Inventory call is made at all, and the baseline
    /// holds at its prior value (spec §8.6: "Δ below threshold produces
    /// zero Inventory calls"). No mocks are registered, so any call this
    /// makes would 404 and fail the test.
    #[tokio::test]
    async fn sub_threshold_delta_makes_no_inventory_call_and_holds_baseline() {
        let server = MockServer::start().await;

        let inventory = spoolbridge_inventory_client::InventoryClient::from_base_url(server.uri());
        let (_dir, mapping) = mapping_store();
        let existing = MappingEntry::with_metadata("spool-1", 975.0, Utc::now(), record(0.0).current_metadata());

        let outcome = reconcile_one(&inventory, &mapping, &record(974.95), Some(existing), 0.1).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::SubThreshold);
        assert_eq!(mapping.get("A1").await, None, "sub-threshold reconciliation must not touch the mapping");
    }

    /// A mapping entry with no cached metadata yet (e.g. rebuilt from the
    /// Inventory catalog at startup) still makes exactly one check against
    /// Inventory, then caches the result so the following poll goes through
    /// the zero-call path above.
    #[tokio::test]
    async fn sub_threshold_with_no_cached_metadata_checks_once_then_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/spools/spool-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "spool-1", "filament_id": "fil-1",
                "initial_weight_g": 1000.0, "used_weight_g": 25.0,
                "extra_fields": {"tag_id": "A1"},
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/filaments/fil-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "fil-1", "vendor": "Bambu", "material": "PLA",
                "color_name": "Red", "color_hex": "FF0000", "density": null, "diameter": null,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let inventory = spoolbridge_inventory_client::InventoryClient::from_base_url(server.uri());
        let (_dir, mapping) = mapping_store();
        let existing = MappingEntry::new("spool-1", 975.0, Utc::now());

        let outcome = reconcile_one(&inventory, &mapping, &record(974.95), Some(existing), 0.1).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::SubThreshold);
        let cached = mapping.get("A1").await.unwrap();
        assert_eq!(cached.last_remaining_g, 975.0, "baseline is not advanced by a sub-threshold pass");
        assert_eq!(cached.last_known_metadata, Some(record(0.0).current_metadata()));
    }

    /// S5 — refill: a Device-reported increase pushes an absolute
    /// `update_spool`, never a negative usage delta, and still advances the
    /// baseline.
    #[tokio::test]
    async fn refill_pushes_absolute_update_and_advances_baseline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/spools/spool-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "spool-1", "filament_id": "fil-1",
                "initial_weight_g": 1000.0, "used_weight_g": 25.0,
                "extra_fields": {"tag_id": "A1"},
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/spools/spool-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let inventory = spoolbridge_inventory_client::InventoryClient::from_base_url(server.uri());
        let (_dir, mapping) = mapping_store();
        let existing = MappingEntry::new("spool-1", 975.0, Utc::now());

        let outcome = reconcile_one(&inventory, &mapping, &record(1000.0), Some(existing), 0.1).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Refilled { new_remaining_g: 1000.0 });
        assert_eq!(mapping.get("A1").await.unwrap().last_remaining_g, 1000.0);
    }

    /// Metadata divergence is caught and patched even when the consumption
    /// delta itself is sub-threshold, and still reports no usage change.
    #[tokio::test]
    async fn metadata_divergence_below_threshold_still_triggers_a_patch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/spools/spool-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "spool-1", "filament_id": "fil-1",
                "initial_weight_g": 1000.0, "used_weight_g": 25.0,
                "extra_fields": {"tag_id": "A1"},
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/filaments/fil-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "fil-1", "vendor": "OldBrand", "material": "PLA",
                "color_name": "Red", "color_hex": "FF0000", "density": null, "diameter": null,
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/vendors"))
            .and(query_param("name", "Bambu"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![serde_json::json!({"id": "vendor-1", "name": "Bambu"})]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/filaments"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![serde_json::json!({
                "id": "fil-2", "vendor": "Bambu", "material": "PLA",
                "color_name": "Red", "color_hex": "FF0000", "density": null, "diameter": null,
            })]))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/spools/spool-1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let inventory = spoolbridge_inventory_client::InventoryClient::from_base_url(server.uri());
        let (_dir, mapping) = mapping_store();
        let existing = MappingEntry::new("spool-1", 975.0, Utc::now());

        let outcome = reconcile_one(&inventory, &mapping, &record(974.95), Some(existing), 0.1).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::MetadataUpdated);
        let cached = mapping.get("A1").await.unwrap();
        assert_eq!(cached.last_remaining_g, 975.0, "metadata patch alone does not move the baseline");
        assert_eq!(cached.last_known_metadata, Some(record(0.0).current_metadata()));
    }
}

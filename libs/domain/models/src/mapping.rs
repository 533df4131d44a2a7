//! [libs/domain/models/src/mapping.rs]
//! The persisted linkage between a Device `tag_id` and an Inventory spool
//! (spec §3, "Mapping").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the Mapping: the Device `tag_id` that keys it is carried
/// externally (as the map key in `spoolbridge-mapping-store`), not inside
/// this struct, so the struct itself stays a plain value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub inventory_spool_id: String,
    /// Device-reported `remaining_g` baseline at the last successful push.
    pub last_remaining_g: f64,
    pub last_synced_at: DateTime<Utc>,
    /// Brand/material/color last confirmed against Inventory, so a steady
    /// state poll can tell metadata hasn't diverged without a round trip.
    /// `None` for entries whose metadata has never been checked (freshly
    /// recovered from the Inventory catalog, or inserted from a push event),
    /// which forces one check to populate it.
    #[serde(default)]
    pub last_known_metadata: Option<FilamentMetadata>,
}

impl MappingEntry {
    pub fn new(inventory_spool_id: impl Into<String>, last_remaining_g: f64, now: DateTime<Utc>) -> Self {
        Self {
            inventory_spool_id: inventory_spool_id.into(),
            last_remaining_g,
            last_synced_at: now,
            last_known_metadata: None,
        }
    }

    pub fn with_metadata(
        inventory_spool_id: impl Into<String>,
        last_remaining_g: f64,
        now: DateTime<Utc>,
        metadata: FilamentMetadata,
    ) -> Self {
        Self {
            inventory_spool_id: inventory_spool_id.into(),
            last_remaining_g,
            last_synced_at: now,
            last_known_metadata: Some(metadata),
        }
    }
}

/// The filament identity fields the Device reports, cached on a `MappingEntry`
/// so the steady-state case (no drift) never needs an Inventory round trip to
/// confirm it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentMetadata {
    pub vendor: String,
    pub material: String,
    pub color_name: String,
    pub color_hex: Option<String>,
}

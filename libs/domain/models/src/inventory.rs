//! [libs/domain/models/src/inventory.rs]
//! Inventory-side catalog and spool types. These mirror the downstream
//! REST resources closely enough to (de)serialize directly against them;
//! field names match what `spoolbridge-inventory-client` sends and
//! receives on the wire.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A catalog entry shared by every spool of the same vendor/material/color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryFilament {
    pub id: String,
    pub vendor: String,
    pub material: String,
    pub color_name: String,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub density: Option<f64>,
    #[serde(default)]
    pub diameter: Option<f64>,
}

/// The extra-field name the bridge writes on every spool it creates, so the
/// mapping can be rebuilt from Inventory alone (spec §4.6.1 step 3).
pub const TAG_ID_EXTRA_FIELD: &str = "tag_id";

/// One physical spool as known to Inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySpool {
    pub id: String,
    pub filament_id: String,
    pub initial_weight_g: f64,
    pub used_weight_g: f64,
    #[serde(default)]
    pub extra_fields: HashMap<String, String>,
}

impl InventorySpool {
    /// The Device `tag_id` recorded in this spool's extra fields, if any.
    pub fn tag_id(&self) -> Option<&str> {
        self.extra_fields
            .get(TAG_ID_EXTRA_FIELD)
            .map(|s| s.as_str())
    }

    /// Remaining weight implied by `initial_weight_g - used_weight_g`, the
    /// baseline used during mapping recovery (spec §4.6.1 step 3).
    pub fn remaining_weight_g(&self) -> f64 {
        (self.initial_weight_g - self.used_weight_g).max(0.0)
    }
}

/// A partial update to an Inventory spool. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpoolPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_weight_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filament_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_fields: Option<HashMap<String, String>>,
}

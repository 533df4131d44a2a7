//! [libs/domain/models/src/device.rs]
//! The Device's view of a single spool, as decoded from the delimited
//! record format (see `spoolbridge-record-codec`).

use serde::{Deserialize, Serialize};

use crate::mapping::FilamentMetadata;

/// One spool as reported by the Device.
///
/// `tag_id` is the only stable cross-system identity (spec §3); everything
/// else, including `device_spool_id`, may be reassigned by the firmware
/// after a physical tag is removed and re-registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub tag_id: String,
    pub material: String,
    pub brand: String,
    pub color_name: String,
    #[serde(default)]
    pub color_hex: Option<String>,
    pub nominal_weight_g: f64,
    pub empty_weight_g: f64,
    pub remaining_g: f64,
    pub device_spool_id: u64,
}

impl DeviceRecord {
    /// Grams of filament consumed relative to a fully-loaded spool.
    pub fn used_weight_g(&self) -> f64 {
        (self.nominal_weight_g - self.remaining_g).max(0.0)
    }

    /// Whether brand/material/color diverge from the given Inventory-side values.
    pub fn metadata_diverges_from(
        &self,
        brand: &str,
        material: &str,
        color_name: &str,
        color_hex: Option<&str>,
    ) -> bool {
        self.brand != brand
            || self.material != material
            || self.color_name != color_name
            || self.color_hex.as_deref() != color_hex
    }

    /// This record's filament identity, in the shape cached on a
    /// `MappingEntry` so a later poll can compare without a network call.
    pub fn current_metadata(&self) -> FilamentMetadata {
        FilamentMetadata {
            vendor: self.brand.clone(),
            material: self.material.clone(),
            color_name: self.color_name.clone(),
            color_hex: self.color_hex.clone(),
        }
    }
}

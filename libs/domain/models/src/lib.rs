//! [libs/domain/models/src/lib.rs]
//! Shared domain types crossing the Device/Inventory boundary. Every other
//! crate in the bridge depends on this one; it depends on nothing in the
//! workspace.

pub mod device;
pub mod event;
pub mod inventory;
pub mod mapping;

pub use device::DeviceRecord;
pub use event::InventoryEvent;
pub use inventory::{InventoryFilament, InventorySpool, SpoolPatch};
pub use mapping::{FilamentMetadata, MappingEntry};

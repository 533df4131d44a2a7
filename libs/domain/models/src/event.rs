//! [libs/domain/models/src/event.rs]
//! The Inventory push event feed (spec §4.4, §6: WebSocket envelopes
//! `{type, resource, payload}`).

use serde::{Deserialize, Serialize};

use crate::inventory::InventorySpool;

/// A decoded Inventory event, or the synthetic marker the transport layer
/// emits whenever the WebSocket reconnects after a drop (spec §4.4: events
/// lost during a disconnect require a full reconciliation sweep, not a
/// replay attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryEvent {
    SpoolCreated { payload: InventorySpool },
    SpoolUpdated { payload: InventorySpool },
    SpoolDeleted { payload: SpoolDeletedPayload },
    /// Not sent by Inventory; synthesized locally by the transport when it
    /// resumes a connection, so the engine knows it may have missed events.
    #[serde(skip)]
    StreamResynced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpoolDeletedPayload {
    pub id: String,
}

//! [libs/infra/inventory-client/src/protocol.rs]
//! Wire envelope for the Inventory event feed (spec §6): JSON envelopes of
//! the shape `{type, resource, payload}`. Decoded into the domain-level
//! `InventoryEvent` the rest of the bridge consumes.

use serde::Deserialize;
use spoolbridge_models::event::SpoolDeletedPayload;
use spoolbridge_models::InventoryEvent;

use crate::errors::InventoryClientError;

#[derive(Debug, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    resource: String,
    payload: serde_json::Value,
}

/// Decodes one WebSocket text frame into an `InventoryEvent`.
pub fn decode_event(text: &str) -> Result<InventoryEvent, InventoryClientError> {
    let envelope: WireEnvelope = serde_json::from_str(text)?;

    if envelope.resource != "spool" {
        return Err(InventoryClientError::Decode(
            serde::de::Error::custom(format!("unsupported resource: {}", envelope.resource)),
        ));
    }

    match envelope.event_type.as_str() {
        "created" => Ok(InventoryEvent::SpoolCreated {
            payload: serde_json::from_value(envelope.payload)?,
        }),
        "updated" => Ok(InventoryEvent::SpoolUpdated {
            payload: serde_json::from_value(envelope.payload)?,
        }),
        "deleted" => {
            let payload: SpoolDeletedPayload = serde_json::from_value(envelope.payload)?;
            Ok(InventoryEvent::SpoolDeleted { payload })
        }
        other => Err(InventoryClientError::Decode(serde::de::Error::custom(format!(
            "unknown event type: {other}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_spool_deleted() {
        let text = r#"{"type":"deleted","resource":"spool","payload":{"id":"spool-1"}}"#;
        let event = decode_event(text).unwrap();
        assert!(matches!(event, InventoryEvent::SpoolDeleted { payload } if payload.id == "spool-1"));
    }

    #[test]
    fn rejects_unknown_event_type() {
        let text = r#"{"type":"teleported","resource":"spool","payload":{}}"#;
        assert!(decode_event(text).is_err());
    }
}

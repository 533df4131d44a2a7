//! [libs/infra/inventory-client/src/lib.rs]

pub mod errors;
pub mod protocol;
pub mod rest;
pub mod transport;

pub use errors::InventoryClientError;
pub use rest::InventoryClient;

use spoolbridge_models::InventoryEvent;
use tokio::sync::mpsc;

impl InventoryClient {
    /// Subscribes to the Inventory push event feed over WebSocket (spec
    /// §4.4). The `ws_path` is the event endpoint relative to the REST
    /// base URL, e.g. `/api/v1/events`.
    pub fn subscribe_events(&self, ws_path: &str) -> mpsc::Receiver<InventoryEvent> {
        let ws_url = to_ws_url(self.base_url(), ws_path);
        transport::subscribe(ws_url)
    }
}

fn to_ws_url(base_url: &str, path: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_string()
    };
    format!("{ws_base}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_base_maps_to_ws_scheme() {
        assert_eq!(
            to_ws_url("http://inventory.local:8080", "/api/v1/events"),
            "ws://inventory.local:8080/api/v1/events"
        );
    }

    #[test]
    fn https_base_maps_to_wss_scheme() {
        assert_eq!(
            to_ws_url("https://inventory.local", "/api/v1/events"),
            "wss://inventory.local/api/v1/events"
        );
    }
}

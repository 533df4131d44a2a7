//! [libs/infra/inventory-client/src/errors.rs]

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryClientError {
    #[error("inventory unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("inventory rejected request: {status} {body}")]
    Status { status: u16, body: String },

    #[error("inventory response decode failure: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("inventory resource not found")]
    NotFound,
}

impl InventoryClientError {
    /// 5xx is worth a bounded retry with backoff (spec §7); 4xx is a
    /// client-side mistake (bad payload, schema drift) that a retry cannot
    /// fix, so the caller logs and skips the spool instead.
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryClientError::Status { status, .. } if *status >= 500)
            || matches!(self, InventoryClientError::Unreachable(_))
    }
}

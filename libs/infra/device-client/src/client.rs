//! [libs/infra/device-client/src/client.rs]
//! Typed operations against the Device's encrypted REST surface (spec
//! §4.3): one `reqwest::Client` wrapped with a fixed timeout, one method
//! per remote operation, each `#[instrument]`ed and returning a typed
//! error.
//!
//! Every response body is base64(nonce‖ciphertext‖tag) under AES-GCM
//! (`spoolbridge-cipher`); the decrypted plaintext is the delimited record
//! format (`spoolbridge-record-codec`).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use spoolbridge_models::DeviceRecord;
use tracing::{debug, instrument, warn};

use crate::errors::DeviceClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct DeviceClient {
    http: Client,
    base_url: String,
    security_key: String,
}

impl DeviceClient {
    pub fn new(scheme: &str, host: &str, port: u16, security_key: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client with a fixed timeout never fails to build");

        Self {
            http,
            base_url: format!("{scheme}://{host}:{port}"),
            security_key: security_key.into(),
        }
    }

    async fn decrypted_body(&self, path: &str) -> Result<Vec<u8>, DeviceClientError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await?;

        if response.status() != StatusCode::OK {
            return Err(DeviceClientError::Protocol(format!(
                "unexpected status {} from {url}",
                response.status()
            )));
        }

        let wire_body = response.text().await?;
        let plaintext = spoolbridge_cipher::decrypt_wire(wire_body.trim(), &self.security_key)?;
        Ok(plaintext)
    }

    /// Issues a trivial authenticated request and reports whether the
    /// security key is correct (spec §4.3). Called once at startup as a
    /// fail-fast check; `AuthError` there is fatal, `Unreachable` gets a
    /// backoff retry (the Device may still be booting).
    #[instrument(skip(self))]
    pub async fn validate_key(&self) -> Result<(), DeviceClientError> {
        self.decrypted_body("/api/v1/ping").await?;
        Ok(())
    }

    /// Fetches and decrypts the full Device catalog. A malformed record in
    /// the response is logged and dropped without failing the whole
    /// response, per spec §4.2/§4.3.
    #[instrument(skip(self))]
    pub async fn list_spools(&self) -> Result<Vec<DeviceRecord>, DeviceClientError> {
        let plaintext = self.decrypted_body("/api/v1/spools").await?;

        let mut records = Vec::new();
        for result in spoolbridge_record_codec::parse_records(plaintext.as_slice()) {
            match result {
                Ok(record) => records.push(record),
                Err(e) => warn!("dropping malformed device record: {e}"),
            }
        }
        debug!(count = records.len(), "fetched device catalog");
        Ok(records)
    }

    /// Single-record fetch, used only for diagnostics (spec §4.3).
    #[instrument(skip(self))]
    pub async fn get_spool(&self, tag_id: &str) -> Result<Option<DeviceRecord>, DeviceClientError> {
        let path = format!("/api/v1/spools/{}", urlencoding_tag(tag_id));
        let plaintext = self.decrypted_body(&path).await?;

        let mut records = spoolbridge_record_codec::parse_records(plaintext.as_slice());
        match records.next() {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(e)) => Err(DeviceClientError::Protocol(e.to_string())),
            None => Ok(None),
        }
    }
}

/// `tag_id` is printable ASCII (spec §3); a minimal percent-encoding of the
/// characters meaningful in a URL path is enough, no need for a full
/// encoding crate dependency for this narrow case.
fn urlencoding_tag(tag_id: &str) -> String {
    tag_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

//! [libs/infra/inventory-client/src/rest.rs]
//! Typed REST operations against the Inventory service (spec §4.4): one
//! `reqwest::Client` with a fixed timeout, one method per remote operation,
//! status-classified errors.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use spoolbridge_models::{InventoryFilament, InventorySpool, SpoolPatch};
use tracing::instrument;

use crate::errors::InventoryClientError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct InventoryClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct ExtraFieldDeclaration {
    name: &'static str,
    field_type: &'static str,
    scope: &'static str,
}

#[derive(Serialize)]
struct VendorCreate<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct Vendor {
    id: String,
    #[allow(dead_code)]
    name: String,
}

#[derive(Serialize)]
struct FilamentCreate<'a> {
    vendor: &'a str,
    material: &'a str,
    color_name: &'a str,
    color_hex: Option<&'a str>,
    density: Option<f64>,
    diameter: Option<f64>,
}

#[derive(Serialize)]
struct SpoolCreate<'a> {
    filament_id: &'a str,
    initial_weight_g: f64,
    used_weight_g: f64,
    extra_fields: &'a HashMap<String, String>,
}

#[derive(Serialize)]
struct UsageDelta {
    grams: f64,
}

impl InventoryClient {
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client with a fixed timeout never fails to build");

        Self {
            http,
            base_url: format!("{scheme}://{host}:{port}"),
        }
    }

    /// Builds a client against a pre-formed base URL, e.g. a `wiremock`
    /// mock server's `uri()` in tests, without needing to decompose it back
    /// into scheme/host/port first.
    pub fn from_base_url(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("reqwest client with a fixed timeout never fails to build");

        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn classify_error(&self, response: reqwest::Response) -> InventoryClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            InventoryClientError::NotFound
        } else {
            InventoryClientError::Status {
                status: status.as_u16(),
                body,
            }
        }
    }

    /// Idempotently declares the extra fields the bridge writes (at minimum
    /// `tag_id` on spools). Safe to call on every startup (spec §4.4).
    #[instrument(skip(self))]
    pub async fn ensure_extra_field_schema(&self) -> Result<(), InventoryClientError> {
        let declaration = ExtraFieldDeclaration {
            name: spoolbridge_models::inventory::TAG_ID_EXTRA_FIELD,
            field_type: "string",
            scope: "spool",
        };
        let response = self
            .http
            .post(self.url("/api/v1/schema/extra-fields"))
            .json(&declaration)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT => Ok(()),
            _ => Err(self.classify_error(response).await),
        }
    }

    /// "Find" uses name equality; creation is attempted only if not found.
    /// A concurrent-creation race surfaces as 409 from the server, which is
    /// handled by retrying the find once (spec §4.4).
    #[instrument(skip(self))]
    pub async fn find_or_create_vendor(&self, name: &str) -> Result<String, InventoryClientError> {
        if let Some(id) = self.find_vendor(name).await? {
            return Ok(id);
        }

        let response = self
            .http
            .post(self.url("/api/v1/vendors"))
            .json(&VendorCreate { name })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                Ok(response.json::<Vendor>().await?.id)
            }
            StatusCode::CONFLICT => self
                .find_vendor(name)
                .await?
                .ok_or(InventoryClientError::NotFound),
            _ => Err(self.classify_error(response).await),
        }
    }

    async fn find_vendor(&self, name: &str) -> Result<Option<String>, InventoryClientError> {
        let response = self
            .http
            .get(self.url("/api/v1/vendors"))
            .query(&[("name", name)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.classify_error(response).await);
        }

        let vendors: Vec<Vendor> = response.json().await?;
        Ok(vendors.into_iter().next().map(|v| v.id))
    }

    #[instrument(skip(self))]
    #[allow(clippy::too_many_arguments)]
    pub async fn find_or_create_filament(
        &self,
        vendor: &str,
        material: &str,
        color_name: &str,
        color_hex: Option<&str>,
        density: Option<f64>,
        diameter: Option<f64>,
    ) -> Result<InventoryFilament, InventoryClientError> {
        let response = self
            .http
            .get(self.url("/api/v1/filaments"))
            .query(&[
                ("vendor", vendor),
                ("material", material),
                ("color_name", color_name),
            ])
            .send()
            .await?;

        if response.status().is_success() {
            let filaments: Vec<InventoryFilament> = response.json().await?;
            if let Some(existing) = filaments.into_iter().next() {
                return Ok(existing);
            }
        } else if response.status() != StatusCode::NOT_FOUND {
            return Err(self.classify_error(response).await);
        }

        let create_response = self
            .http
            .post(self.url("/api/v1/filaments"))
            .json(&FilamentCreate {
                vendor,
                material,
                color_name,
                color_hex,
                density,
                diameter,
            })
            .send()
            .await?;

        match create_response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(create_response.json().await?),
            StatusCode::CONFLICT => {
                let retry = self
                    .http
                    .get(self.url("/api/v1/filaments"))
                    .query(&[
                        ("vendor", vendor),
                        ("material", material),
                        ("color_name", color_name),
                    ])
                    .send()
                    .await?;
                let filaments: Vec<InventoryFilament> = retry.json().await?;
                filaments.into_iter().next().ok_or(InventoryClientError::NotFound)
            }
            _ => Err(self.classify_error(create_response).await),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_filament(&self, id: &str) -> Result<InventoryFilament, InventoryClientError> {
        let response = self.http.get(self.url(&format!("/api/v1/filaments/{id}"))).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.classify_error(response).await)
        }
    }

    /// Convenience used during sub-threshold reconciliation to check for
    /// metadata divergence (spec §4.6.2) without the caller needing to
    /// track filament ids separately from spools.
    pub async fn get_filament_for_spool(
        &self,
        spool: &InventorySpool,
    ) -> Result<InventoryFilament, InventoryClientError> {
        self.get_filament(&spool.filament_id).await
    }

    #[instrument(skip(self, extra_fields))]
    pub async fn create_spool(
        &self,
        filament_id: &str,
        initial_weight_g: f64,
        used_weight_g: f64,
        extra_fields: &HashMap<String, String>,
    ) -> Result<InventorySpool, InventoryClientError> {
        let response = self
            .http
            .post(self.url("/api/v1/spools"))
            .json(&SpoolCreate {
                filament_id,
                initial_weight_g,
                used_weight_g,
                extra_fields,
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.classify_error(response).await)
        }
    }

    #[instrument(skip(self))]
    pub async fn get_spool(&self, id: &str) -> Result<InventorySpool, InventoryClientError> {
        let response = self.http.get(self.url(&format!("/api/v1/spools/{id}"))).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.classify_error(response).await)
        }
    }

    #[instrument(skip(self))]
    pub async fn list_spools(&self) -> Result<Vec<InventorySpool>, InventoryClientError> {
        let response = self.http.get(self.url("/api/v1/spools")).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.classify_error(response).await)
        }
    }

    /// Expressed as a monotonic increment of used weight, matching
    /// Inventory's native consumption model (spec §4.4). Idempotent-safe
    /// only to the extent the caller does not re-issue the same delta — the
    /// Sync Engine's baseline-advance-after-confirm discipline is what
    /// makes that true in practice.
    #[instrument(skip(self))]
    pub async fn add_usage(&self, id: &str, grams: f64) -> Result<(), InventoryClientError> {
        let response = self
            .http
            .post(self.url(&format!("/api/v1/spools/{id}/usage")))
            .json(&UsageDelta { grams })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.classify_error(response).await)
        }
    }

    #[instrument(skip(self, patch))]
    pub async fn update_spool(&self, id: &str, patch: &SpoolPatch) -> Result<(), InventoryClientError> {
        let response = self
            .http
            .patch(self.url(&format!("/api/v1/spools/{id}")))
            .json(patch)
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.classify_error(response).await)
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_spool(&self, id: &str) -> Result<(), InventoryClientError> {
        let response = self.http.delete(self.url(&format!("/api/v1/spools/{id}"))).send().await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(self.classify_error(response).await)
        }
    }

    /// Base URL of the REST surface, reused to derive the WebSocket URL
    /// for event subscription.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

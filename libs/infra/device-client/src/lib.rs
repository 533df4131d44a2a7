//! [libs/infra/device-client/src/lib.rs]

pub mod client;
pub mod errors;

pub use client::DeviceClient;
pub use errors::DeviceClientError;

//! [libs/infra/device-client/src/errors.rs]

use thiserror::Error;

/// Errors surfaced by the Device client, matching the three kinds spec §4.3
/// names: transport failures, key/auth mismatch, and malformed responses.
#[derive(Error, Debug)]
pub enum DeviceClientError {
    #[error("device unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("device auth failed: wrong security key or tampered response")]
    Auth,

    #[error("device protocol error: {0}")]
    Protocol(String),
}

impl From<spoolbridge_cipher::CipherError> for DeviceClientError {
    fn from(e: spoolbridge_cipher::CipherError) -> Self {
        match e {
            spoolbridge_cipher::CipherError::Auth => DeviceClientError::Auth,
            spoolbridge_cipher::CipherError::Format(reason) => {
                DeviceClientError::Protocol(format!("malformed envelope: {reason}"))
            }
        }
    }
}

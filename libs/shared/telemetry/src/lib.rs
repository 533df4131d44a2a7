//! [libs/shared/telemetry/src/lib.rs]
//! Structured logging setup shared by every binary in the workspace.
//!
//! Debug builds get a compact, human-readable formatter; release builds get
//! flattened JSON suitable for an ingestion pipeline. Either can be
//! overridden with `RUST_LOG`, or with `SPOOLBRIDGE_LOG` when `RUST_LOG`
//! isn't set, using the usual `tracing_subscriber::EnvFilter` directive
//! syntax (e.g. `spoolbridge_sync_engine=debug,reqwest=warn`).

use std::panic;

use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber and panic hook. Call once, as
/// early as possible in `main`.
///
/// # Panics
/// Panics if a global subscriber has already been installed.
pub fn init_tracing(service_name: &str) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("SPOOLBRIDGE_LOG"))
        .unwrap_or_else(|_| {
            let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
            EnvFilter::new(format!("{service_name}={default_level},reqwest=warn,tokio_tungstenite=warn"))
        });

    if cfg!(debug_assertions) {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true))
            .init();
    }

    install_panic_hook(service_name);
    info!(service = service_name, "tracing initialized");
}

/// Routes panics through the same subscriber instead of letting them print
/// straight to stderr, so a panic in a spawned loop still shows up wherever
/// the rest of the service's logs go.
fn install_panic_hook(service_name: &str) {
    let service_name = service_name.to_string();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");

        error!(
            target: "panic",
            service = %service_name,
            location = %location,
            "panic: {payload}"
        );
    }));
}

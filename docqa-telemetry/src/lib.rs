//! # docqa-telemetry
//!
//! Logging setup shared by the docqa binaries.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber filtered by
//! `RUST_LOG` (default `info`) that writes either human-readable or JSON
//! lines. [`init_with_storage`] additionally captures closed spans in a
//! [`SharedTraceStorage`], keyed by their `request.id` field.

pub mod memory;

#[cfg(test)]
mod test_inmemory;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt as fmt_layer};

pub use memory::{InMemoryTraceLayer, SharedTraceStorage, SpanData};
pub use tracing_subscriber::util::TryInitError;

const DEFAULT_FILTER: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected 'pretty' or 'json'")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(service_name: &str, format: LogFormat) -> Result<(), TryInitError> {
    install(service_name, format, None)
}

/// Install the global subscriber and capture closed spans into `storage`.
///
/// # Errors
///
/// Fails if a global subscriber is already set.
pub fn init_with_storage(
    service_name: &str,
    format: LogFormat,
    storage: Arc<SharedTraceStorage>,
) -> Result<(), TryInitError> {
    install(service_name, format, Some(InMemoryTraceLayer::new(storage)))
}

fn install(
    service_name: &str,
    format: LogFormat,
    capture: Option<InMemoryTraceLayer>,
) -> Result<(), TryInitError> {
    let (pretty, json) = match format {
        LogFormat::Pretty => (Some(fmt_layer::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt_layer::layer().json().with_current_span(true))),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(pretty)
        .with(json)
        .with(capture)
        .try_init()?;

    tracing::info!(service.name = service_name, log.format = %format, "telemetry initialized");
    Ok(())
}

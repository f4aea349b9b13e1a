//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the given default filter applies.

use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "mealplan=info";

/// Subscriber installation failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive did not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(#[from] TryInitError),
}

fn filter(default: &str) -> Result<EnvFilter, TelemetryError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(default)?),
    }
}

/// Install a human-readable subscriber with [`DEFAULT_FILTER`].
pub fn init() -> Result<(), TelemetryError> {
    init_with_filter(DEFAULT_FILTER)
}

/// Install a human-readable subscriber with a custom default filter.
pub fn init_with_filter(default: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(filter(default)?)
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

/// Install a JSON-lines subscriber, for log shipping.
pub fn init_json(default: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(filter(default)?)
        .with(fmt::layer().json().with_current_span(false))
        .try_init()?;
    Ok(())
}

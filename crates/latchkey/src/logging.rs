//! Logging initialization.
//!
//! Latchkey logs through `tracing`: transitions at `info`, bindings and
//! store notifications at `debug`, store failures at `warn`. These helpers
//! install a compact `tracing-subscriber` formatter for applications that
//! don't set one up themselves.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` isn't set.
pub const DEFAULT_FILTER: &str = "latchkey=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to [`DEFAULT_FILTER`].
///
/// # Panics
///
/// Panics if another tracing subscriber has already been set.
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Err` if a subscriber has already been set.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

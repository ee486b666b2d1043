//! Log subscriber setup for binaries and tests embedding the server

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "brisk_core=info";

/// Install a global fmt subscriber filtered by `RUST_LOG`
///
/// Fails if a global subscriber is already installed.
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}

/// Like [`try_init`], ignoring an already installed subscriber
pub fn init() {
    let _ = try_init();
}

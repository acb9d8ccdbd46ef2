//! Log sink setup for the binary.
//!
//! Events go to stdout through the `tracing-subscriber` fmt layer, filtered
//! by `RUST_LOG`. Access log lines use the `waypost::access` target, so
//! `RUST_LOG=waypost=info,waypost::access=off` silences them alone.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "waypost=info";

/// Install the global subscriber. Later calls are no-ops.
pub fn init() {
    let _ = try_init();
}

/// Like [`init`], but reports whether a global subscriber was already set.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_target(true))
        .try_init()
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

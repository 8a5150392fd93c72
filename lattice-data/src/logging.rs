//! Logging
//!
//! Every lifecycle transition emits a `tracing` event. Applications that do
//! not install their own subscriber can call [`init_logging`] to get a plain
//! fmt subscriber filtered by `RUST_LOG`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

/// Install a global fmt subscriber.
///
/// `default_filter` applies when `RUST_LOG` is not set, e.g.
/// `"lattice_data=debug"`. Fails if a global subscriber is already set.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_error() {
        let first = init_logging("lattice_data=debug");
        let second = init_logging("lattice_data=debug");
        // Another test binary may have installed one already; only the
        // second call within this test is guaranteed to fail.
        let _ = first;
        assert!(matches!(second, Err(Error::Logging(_))));
    }
}

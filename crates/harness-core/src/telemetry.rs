//! Tracing setup for the harness binary.
//!
//! The harness is the entrypoint of a test container, so its log
//! stream is the primary user-visible surface: everything degraded
//! (provider failures, sync retries, report errors) lands here while
//! the pipeline keeps going.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber.
///
/// `json` switches to newline-delimited JSON lines for log
/// aggregation; `verbose` lowers the default level to DEBUG, which
/// also surfaces per-phase transitions. `RUST_LOG` overrides the
/// default level when set. Calling this more than once is a no-op.
pub fn init_tracing(json: bool, verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/*!
Logging setup for embedding applications.

The engines only emit `tracing` events and work fine with no subscriber
installed. Hosts that want structured output can install the crate's
JSON subscriber once at startup.
*/

use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::error::{BackupError, Result};

/// Install the global JSON logging subscriber.
///
/// # Arguments
/// * `filter` - event filter to apply; `None` reads `RUST_LOG` and
///   defaults this crate's own events to `info`
///
/// # Returns
/// An error when a global subscriber is already installed.
pub fn init_tracing(filter: Option<EnvFilter>) -> Result<()> {
    let filter = filter.unwrap_or_else(|| {
        EnvFilter::from_default_env().add_directive("ledgerpack_core=info".parse().unwrap())
    });

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(false);

    let subscriber = Registry::default().with(filter).with(fmt_layer);

    set_global_default(subscriber).map_err(|e| {
        BackupError::validation(format!("failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("logging initialized");
    Ok(())
}

/// Install the global logging subscriber with default settings.
pub fn init_default_tracing() -> Result<()> {
    init_tracing(None)
}

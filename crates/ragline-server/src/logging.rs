use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "ragline=info,tower_http=info";

/// Install the global subscriber: `RUST_LOG` (or [`DEFAULT_FILTER`]) plus a
/// human-readable or JSON formatter.
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(log_json: bool) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(log_json.then(|| fmt::layer().json().with_current_span(true)))
        .with((!log_json).then(fmt::layer))
        .try_init()?;
    Ok(())
}

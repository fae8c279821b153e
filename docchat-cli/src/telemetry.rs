//! Logging setup.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// Default filter when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info";

/// Resolve the log filter: an explicit level wins over `RUST_LOG`, which wins
/// over [`DEFAULT_FILTER`].
pub fn filter(level: Option<&str>) -> Result<EnvFilter> {
    match level {
        Some(level) => {
            EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"))
        }
        None => {
            Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        }
    }
}

/// Install the global `fmt` subscriber. Logs go to stderr so answers on
/// stdout stay clean.
pub fn init(level: Option<&str>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level)?)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

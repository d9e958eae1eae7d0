//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use vmscale_core::LogConfig;

const DEFAULT_FILTER: &str = "info,vmscaled=debug,vmscale_engine=debug";

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// filter, which wins over the built-in default.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}

//! Application composition
//!
//! [`AppBuilder`] turns an [`AppConfig`](crate::config::AppConfig) into an
//! [`AppHost`]: it opens the backend connection, fills the provider
//! registry and resolves one provider per configured entity.

pub mod builder;
pub mod host;

pub use builder::AppBuilder;
pub use host::AppHost;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `directive` when set. Fails if a subscriber is
/// already installed.
pub fn init_tracing(directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|e| anyhow!("Invalid log directive '{}': {}", directive, e))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

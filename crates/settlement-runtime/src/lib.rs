//! # Settlement Runtime
//!
//! Composition root of the escrow settlement core.
//!
//! ## Modules
//!
//! - `config` - aggregated configuration with `ES_*` environment overrides
//! - `telemetry` - log subscriber setup
//! - `adapters` - port implementations connecting subsystems
//! - `runtime` - wiring, startup sequence, scheduler and shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use settlement_runtime::{run_until_shutdown, RuntimePorts, SettlementConfig};
//!
//! let config = SettlementConfig::from_env()?;
//! run_until_shutdown(config, ports).await?;
//! ```

pub mod adapters;
pub mod config;
pub mod runtime;
pub mod telemetry;

pub use adapters::{QuorumGatewayAdapter, TracingEventSink};
pub use config::{ConfigError, LogConfig, SettlementConfig};
pub use runtime::{RuntimePorts, RuntimeStatus, SettlementRuntime};
pub use telemetry::init_logging;

use anyhow::{Context, Result};
use tracing::info;

/// Initialise logging, start the runtime and run until Ctrl+C.
pub async fn run_until_shutdown(config: SettlementConfig, ports: RuntimePorts) -> Result<()> {
    init_logging(&config.log).context("failed to initialise logging")?;

    let runtime = SettlementRuntime::new(config, ports).context("invalid configuration")?;
    runtime.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    runtime.shutdown().await;
    Ok(())
}

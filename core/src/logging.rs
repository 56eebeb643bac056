//! # Logging configuration
//!
//! Standardized `tracing` setup shared by the binary and by integration
//! tests that want real log output.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hft_core::logging::init_logging;
//!
//! fn main() {
//!     init_logging();
//!     tracing::info!("runtime started");
//! }
//! ```
//!
//! ```bash
//! export RUST_LOG=debug
//! export RUST_LOG=hft_core=info,hft_execution=debug
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initializes standard (human-readable) logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initializes JSON logging, for production deployments behind a log
/// aggregator.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}

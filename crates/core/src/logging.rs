//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG` when set, otherwise `info` globally and
/// `debug` for the vkframe crates.
///
/// # Example
/// ```
/// vkframe_core::init_logging();
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vkframe=debug,vkframe_rhi=debug,vkframe_renderer=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

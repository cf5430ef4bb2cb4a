//! Core utilities shared by every vkframe crate.
//!
//! - Error type and result alias
//! - Logging initialization
//! - Renderer configuration

mod config;
mod error;
mod logging;

pub use config::{
    AssetPaths, DeviceSelection, MAX_FRAMES_IN_FLIGHT_LIMIT, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;

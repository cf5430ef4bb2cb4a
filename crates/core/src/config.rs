//! Renderer configuration.
//!
//! Configuration is resolved once at startup and passed into the renderer's
//! constructor. Nothing in the workspace reads debug or validation state from
//! globals.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound on frames in flight.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 3;

/// Initial window settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "vkframe".to_string(),
        }
    }
}

/// Strategy used to pick a physical device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceSelection {
    /// Take the first device that satisfies every requirement.
    #[default]
    FirstSuitable,
    /// Rate every suitable device and take the best one.
    HighestScore,
}

/// Paths to the assets consumed at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    /// Compiled SPIR-V for the vertex stage.
    pub vertex_shader: PathBuf,
    /// Compiled SPIR-V for the fragment stage.
    pub fragment_shader: PathBuf,
    /// OBJ model; the built-in quads are used when absent.
    pub model: Option<PathBuf>,
    /// Texture image; a checkerboard is used when absent.
    pub texture: Option<PathBuf>,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
            model: None,
            texture: None,
        }
    }
}

/// Top-level renderer configuration.
///
/// # Example
///
/// ```toml
/// enable_validation = true
/// frames_in_flight = 2
/// device_selection = "first-suitable"
///
/// [window]
/// width = 1280
/// height = 720
///
/// [assets]
/// model = "assets/viking_room.obj"
/// texture = "assets/viking_room.png"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub window: WindowConfig,
    /// Enables the Khronos validation layer and the debug messenger.
    pub enable_validation: bool,
    /// Number of frame slots cycling round-robin.
    pub frames_in_flight: usize,
    pub device_selection: DeviceSelection,
    pub assets: AssetPaths,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            enable_validation: cfg!(debug_assertions),
            frames_in_flight: 2,
            device_selection: DeviceSelection::default(),
            assets: AssetPaths::default(),
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from TOML text and validates it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if !(1..=MAX_FRAMES_IN_FLIGHT_LIMIT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT_LIMIT, self.frames_in_flight
            )));
        }

        Ok(())
    }
}

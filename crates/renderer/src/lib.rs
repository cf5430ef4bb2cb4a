//! Frame lifecycle for the vkframe renderer.
//!
//! This crate drives the rendering loop:
//! - Swap-chain management and rebuilds
//! - Per-slot frame resources
//! - Command recording and frame scheduling

pub mod depth_buffer;
pub mod error;
pub mod frame;
pub mod frame_scheduler;
pub mod recorder;
pub mod renderer;
pub mod swapchain_manager;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use frame_scheduler::{DrawableSurface, FrameBackend, FrameOutcome, FrameScheduler};
pub use renderer::{FrameStats, Renderer};

//! Windowing for the renderer: a winit window with pollable resize state,
//! and the Vulkan surface created from it.

mod window;

pub use window::{Surface, Window};

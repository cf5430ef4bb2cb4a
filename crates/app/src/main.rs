//! vkframe - Main Entry Point
//!
//! Opens a window, builds the renderer once the window exists, and drives one
//! frame per iteration of a pumped winit event loop. Pumping (instead of
//! `run_app`) keeps the frame loop in our hands, so the swapchain manager can
//! block on window events while the window is minimized.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::WindowId;

use vkframe_core::{RendererConfig, WindowConfig};
use vkframe_platform::Window;
use vkframe_renderer::{DrawableSurface, FrameStats, Renderer, RendererError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file; defaults apply when it is missing
    #[arg(long, default_value = "vkframe.toml")]
    config: PathBuf,

    /// Enable the Vulkan validation layer
    #[arg(long, conflicts_with = "no_validation")]
    validation: bool,

    /// Disable the Vulkan validation layer
    #[arg(long)]
    no_validation: bool,
}

impl Args {
    fn validation_override(&self) -> Option<bool> {
        match (self.validation, self.no_validation) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Window-side state fed by winit callbacks.
struct App {
    window_config: WindowConfig,
    window: Option<Window>,
    window_error: Option<vkframe_core::Error>,
    exit_requested: bool,
}

impl App {
    fn new(window_config: WindowConfig) -> Self {
        Self {
            window_config,
            window: None,
            window_error: None,
            exit_requested: false,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let WindowConfig {
            width,
            height,
            ref title,
        } = self.window_config;

        match Window::new(event_loop, width, height, title) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                self.window_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.exit_requested = true;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut() {
                    window.handle_resize(size.width, size.height);
                }
            }
            _ => {}
        }
    }
}

/// The window as the frame loop sees it, with the event loop attached so
/// rebuilds can wait for events.
struct PumpedSurface<'a> {
    event_loop: &'a mut EventLoop<()>,
    app: &'a mut App,
}

impl DrawableSurface for PumpedSurface<'_> {
    fn drawable_size(&self) -> (u32, u32) {
        self.app
            .window
            .as_ref()
            .map_or((0, 0), Window::drawable_size)
    }

    fn take_resized(&mut self) -> bool {
        self.app.window.as_mut().is_some_and(Window::take_resized)
    }

    fn wait_events(&mut self) -> bool {
        if self.app.exit_requested {
            return false;
        }

        self.event_loop.set_control_flow(ControlFlow::Wait);
        let status = self.event_loop.pump_app_events(None, self.app);
        self.event_loop.set_control_flow(ControlFlow::Poll);

        if let PumpStatus::Exit(_) = status {
            self.app.exit_requested = true;
        }
        !self.app.exit_requested
    }
}

fn run(args: &Args) -> Result<FrameStats> {
    let mut config = RendererConfig::load(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if let Some(enable) = args.validation_override() {
        config.enable_validation = enable;
    }
    info!(
        "Validation {}, {} frame(s) in flight",
        if config.enable_validation { "on" } else { "off" },
        config.frames_in_flight
    );

    let mut event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config.window.clone());
    // Declared after `app` so it drops first: the surface must go before the window.
    let mut renderer: Option<Renderer> = None;

    loop {
        if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), &mut app)
        {
            info!("Event loop exited with code {}", code);
            break;
        }

        if let Some(e) = app.window_error.take() {
            return Err(e).context("Failed to create window");
        }
        if app.exit_requested {
            break;
        }

        let Some(window) = app.window.as_ref() else {
            continue;
        };

        if renderer.is_none() {
            renderer =
                Some(Renderer::new(window, &config).context("Failed to initialize renderer")?);
            info!("Initialization complete, entering main loop");
        }
        let Some(renderer) = renderer.as_mut() else {
            continue;
        };

        let mut surface = PumpedSurface {
            event_loop: &mut event_loop,
            app: &mut app,
        };
        renderer
            .render_frame(&mut surface)
            .context("Frame rendering failed")?;
    }

    let stats = renderer.as_ref().map(Renderer::stats).unwrap_or_default();
    if let Some(renderer) = renderer.as_ref()
        && let Err(e) = renderer.wait_idle()
    {
        warn!("Failed to drain GPU work before shutdown: {}", e);
    }

    Ok(stats)
}

/// Short category for a fatal error, taken from the innermost typed error.
fn error_category(error: &anyhow::Error) -> &'static str {
    if let Some(e) = error.downcast_ref::<RendererError>() {
        e.category()
    } else if let Some(e) = error.downcast_ref::<vkframe_core::Error>() {
        e.category()
    } else {
        "app"
    }
}

fn main() -> ExitCode {
    vkframe_core::init_logging();
    let args = Args::parse();
    info!("Starting vkframe");

    match run(&args) {
        Ok(stats) => {
            info!(
                "Shut down cleanly: {} frames presented, {} swapchain rebuilds",
                stats.presented_frames, stats.swapchain_rebuilds
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(category = error_category(&e), "Fatal error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["vkframe"]);
        assert_eq!(args.config, PathBuf::from("vkframe.toml"));
        assert_eq!(args.validation_override(), None);
    }

    #[test]
    fn test_validation_flags() {
        let args = Args::parse_from(["vkframe", "--validation"]);
        assert_eq!(args.validation_override(), Some(true));

        let args = Args::parse_from(["vkframe", "--no-validation", "--config", "a.toml"]);
        assert_eq!(args.validation_override(), Some(false));
        assert_eq!(args.config, PathBuf::from("a.toml"));

        assert!(Args::try_parse_from(["vkframe", "--validation", "--no-validation"]).is_err());
    }

    #[test]
    fn test_error_category_sees_through_context() {
        let err = Err::<(), _>(RendererError::from(vkframe_core::Error::Config(
            "bad".to_string(),
        )))
        .context("Failed to initialize renderer")
        .unwrap_err();
        assert_eq!(error_category(&err), "config");

        let err = Err::<(), _>(vkframe_core::Error::Config("bad".to_string()))
            .context("Failed to load config")
            .unwrap_err();
        assert_eq!(error_category(&err), "config");

        assert_eq!(error_category(&anyhow::anyhow!("plain")), "app");
    }
}

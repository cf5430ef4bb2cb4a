//! Main renderer orchestration.
//!
//! This module provides the main [`Renderer`] struct that owns every Vulkan
//! object and drives one frame per [`Renderer::render_frame`] call through the
//! [`FrameScheduler`].

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkframe_core::{DeviceSelection, RendererConfig};
use vkframe_platform::{Surface, Window};
use vkframe_resources::{MeshData, TextureData};
use vkframe_rhi::RhiError;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::CommandPool;
use vkframe_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, frame_bindings, frame_pool_sizes, write_frame_set,
};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::{Instance, InstanceDesc};
use vkframe_rhi::physical_device::{SelectionStrategy, SurfaceTarget, select_physical_device};
use vkframe_rhi::pipeline::{
    CompareOp, CullMode, DepthState, FrontFace, GraphicsPipelineDesc, Pipeline, PipelineLayout,
    RasterState,
};
use vkframe_rhi::render_pass::{RenderPass, RenderPassDesc};
use vkframe_rhi::sampler::{Sampler, SamplerDesc};
use vkframe_rhi::shader::{Shader, ShaderStage};
use vkframe_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use vkframe_rhi::texture::Texture;
use vkframe_rhi::vertex::Vertex;

use crate::depth_buffer::find_depth_format;
use crate::error::RendererResult;
use crate::frame::FrameSlot;
use crate::frame_scheduler::{DrawableSurface, FrameBackend, FrameOutcome, FrameScheduler};
use crate::recorder::{DrawInputs, record_draw};
use crate::swapchain_manager::SwapchainManager;
use crate::ubo::UniformBufferObject;

/// Shader entry point for both stages.
const SHADER_ENTRY_POINT: &str = "main";

/// Checkerboard used when no texture is configured.
const FALLBACK_TEXTURE_SIZE: u32 = 256;
const FALLBACK_TEXTURE_CELL: u32 = 32;

/// Device-local geometry shared by every frame slot.
struct MeshBuffers {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

/// Counters reported when the renderer shuts down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted and handed to the presentation engine.
    pub presented_frames: u64,
    /// Swapchain rebuilds, whatever triggered them.
    pub swapchain_rebuilds: u64,
}

impl FrameStats {
    fn record(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Presented { recreated, .. } => {
                self.presented_frames += 1;
                if recreated {
                    self.swapchain_rebuilds += 1;
                }
            }
            FrameOutcome::Recreated => self.swapchain_rebuilds += 1,
        }
    }
}

fn selection_strategy(selection: DeviceSelection) -> SelectionStrategy {
    match selection {
        DeviceSelection::FirstSuitable => SelectionStrategy::FirstSuitable,
        DeviceSelection::HighestScore => SelectionStrategy::HighestScore,
    }
}

/// Number of frame slots, after the whole config has been validated.
///
/// Every per-slot object and the scheduler are sized from this one value.
fn frame_slot_count(config: &RendererConfig) -> RendererResult<usize> {
    config.validate()?;
    Ok(config.frames_in_flight)
}

/// Main renderer that manages all Vulkan resources.
///
/// # Resource Destruction Order
///
/// Vulkan resources must be destroyed in reverse construction order:
/// 1. Wait for all GPU work to complete
/// 2. Frame slots (semaphores, fences, uniform buffers)
/// 3. Texture, sampler and mesh buffers
/// 4. Pipeline, pipeline layout, descriptor pool and layout, render pass
/// 5. Swapchain manager (framebuffers, depth buffer, swapchain)
/// 6. Command pools
/// 7. Device
/// 8. Surface
/// 9. Instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    instance: ManuallyDrop<Instance>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    /// Per-frame command buffers; reset individually.
    frame_pool: ManuallyDrop<CommandPool>,
    /// One-time uploads and layout transitions.
    setup_pool: ManuallyDrop<CommandPool>,
    swapchain: ManuallyDrop<SwapchainManager>,

    render_pass: ManuallyDrop<RenderPass>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    pipeline: ManuallyDrop<Pipeline>,

    mesh: ManuallyDrop<MeshBuffers>,
    texture: ManuallyDrop<Texture>,
    sampler: ManuallyDrop<Sampler>,

    frames: ManuallyDrop<Vec<FrameSlot>>,
    scheduler: FrameScheduler,
    stats: FrameStats,
}

impl Renderer {
    /// Creates a renderer presenting to `window`.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal: a missing capability, an unreadable asset,
    /// or a failed object creation.
    pub fn new(window: &Window, config: &RendererConfig) -> RendererResult<Self> {
        let frames_in_flight = frame_slot_count(config)?;
        let (width, height) = window.drawable_size();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let instance = Instance::new(&InstanceDesc {
            enable_validation: config.enable_validation,
            surface_extensions: window.required_extensions()?,
        })?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info = select_physical_device(
            instance.handle(),
            Some(SurfaceTarget {
                surface: surface.handle(),
                loader: surface.loader(),
            }),
            selection_strategy(config.device_selection),
        )?;

        let device = Device::new(&instance, &physical_device_info, true)?;

        let frame_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let setup_pool = CommandPool::new_transient(device.clone(), device.graphics_family())?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;
        let depth_format = find_depth_format(&device)?;
        let render_pass = RenderPass::new(
            device.clone(),
            RenderPassDesc::new(swapchain.format(), depth_format),
        )?;
        let swapchain =
            SwapchainManager::new(device.clone(), &setup_pool, swapchain, &render_pass, depth_format)?;

        let frame_count = frames_in_flight as u32;
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &frame_bindings())?;
        let descriptor_pool =
            DescriptorPool::new(device.clone(), frame_count, &frame_pool_sizes(frame_count))?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()], &[])?;
        let pipeline = Self::create_pipeline(&device, config, &render_pass, &pipeline_layout)?;

        let mesh = Self::upload_mesh(&device, &setup_pool, config)?;
        let texture = Self::upload_texture(&device, &setup_pool, config)?;
        let sampler = Sampler::new(device.clone(), &SamplerDesc::default())?;

        let frames = Self::create_frames(
            &device,
            &frame_pool,
            &descriptor_pool,
            &descriptor_set_layout,
            &texture,
            &sampler,
            frame_count,
        )?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight, {} indices",
            swapchain.swapchain().image_count(),
            frame_count,
            mesh.index_count
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            frame_pool: ManuallyDrop::new(frame_pool),
            setup_pool: ManuallyDrop::new(setup_pool),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass: ManuallyDrop::new(render_pass),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            pipeline: ManuallyDrop::new(pipeline),
            mesh: ManuallyDrop::new(mesh),
            texture: ManuallyDrop::new(texture),
            sampler: ManuallyDrop::new(sampler),
            frames: ManuallyDrop::new(frames),
            scheduler: FrameScheduler::new(frames_in_flight),
            stats: FrameStats::default(),
        })
    }

    fn create_pipeline(
        device: &Arc<Device>,
        config: &RendererConfig,
        render_pass: &RenderPass,
        layout: &PipelineLayout,
    ) -> RendererResult<Pipeline> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.vertex_shader,
            ShaderStage::Vertex,
            SHADER_ENTRY_POINT,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.fragment_shader,
            ShaderStage::Fragment,
            SHADER_ENTRY_POINT,
        )?;

        // Shader modules are only needed until the pipeline exists.
        let attributes = Vertex::attribute_descriptions();
        let desc = GraphicsPipelineDesc {
            raster: RasterState {
                cull_mode: CullMode::Back,
                front_face: FrontFace::CounterClockwise,
            },
            depth: DepthState {
                test_enable: true,
                write_enable: true,
                compare_op: CompareOp::Less,
            },
            ..GraphicsPipelineDesc::new(&vertex_shader, &fragment_shader, render_pass.handle())
        }
        .with_vertex_input(Vertex::binding_description(), &attributes);

        let pipeline = Pipeline::graphics(device.clone(), layout, &desc)?;
        Ok(pipeline)
    }

    fn upload_mesh(
        device: &Arc<Device>,
        pool: &CommandPool,
        config: &RendererConfig,
    ) -> RendererResult<MeshBuffers> {
        let mesh = match &config.assets.model {
            Some(path) => MeshData::load_obj(path)?,
            None => {
                info!("No model configured, using built-in quads");
                MeshData::quads()
            }
        };

        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            device.clone(),
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&mesh.indices),
        )?;

        debug!(
            "Uploaded mesh: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );

        Ok(MeshBuffers {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }

    fn upload_texture(
        device: &Arc<Device>,
        pool: &CommandPool,
        config: &RendererConfig,
    ) -> RendererResult<Texture> {
        let data = match &config.assets.texture {
            Some(path) => TextureData::load(path)?,
            None => {
                info!("No texture configured, using checkerboard");
                TextureData::checkerboard(FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_CELL)
            }
        };

        let texture =
            Texture::from_rgba8(device.clone(), pool, data.width(), data.height(), data.pixels())?;
        Ok(texture)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_frames(
        device: &Arc<Device>,
        frame_pool: &CommandPool,
        descriptor_pool: &DescriptorPool,
        descriptor_set_layout: &DescriptorSetLayout,
        texture: &Texture,
        sampler: &Sampler,
        count: u32,
    ) -> RendererResult<Vec<FrameSlot>> {
        let layouts = vec![descriptor_set_layout.handle(); count as usize];
        let descriptor_sets = descriptor_pool.allocate(&layouts)?;
        let command_buffers = frame_pool.allocate_command_buffers(count)?;

        let mut frames = Vec::with_capacity(count as usize);
        for (command_buffer, descriptor_set) in command_buffers.into_iter().zip(descriptor_sets) {
            let slot = FrameSlot::new(device.clone(), command_buffer, descriptor_set)?;
            write_frame_set(
                device,
                descriptor_set,
                slot.uniform_buffer().handle(),
                UniformBufferObject::SIZE as vk::DeviceSize,
                sampler.handle(),
                texture.view(),
            );
            frames.push(slot);
        }

        Ok(frames)
    }

    /// Renders and presents one frame.
    ///
    /// Out-of-date and suboptimal surfaces are handled internally by
    /// rebuilding the swapchain; the frame is then retried on the next call.
    ///
    /// # Errors
    ///
    /// Returns an error for any fatal GPU failure.
    pub fn render_frame<S: DrawableSurface>(&mut self, surface: &mut S) -> RendererResult<FrameOutcome> {
        let mut backend = VulkanFrame {
            device: &self.device,
            setup_pool: &self.setup_pool,
            render_pass: &self.render_pass,
            swapchain: &mut self.swapchain,
            frames: &mut self.frames,
            pipeline: &self.pipeline,
            pipeline_layout: &self.pipeline_layout,
            mesh: &self.mesh,
        };

        let outcome = self.scheduler.run_frame(&mut backend, surface)?;
        self.stats.record(outcome);
        Ok(outcome)
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // SAFETY: the device is idle and each field is dropped exactly once,
        // dependents before what they were created from.
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.sampler);
            ManuallyDrop::drop(&mut self.texture);
            ManuallyDrop::drop(&mut self.mesh);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.setup_pool);
            ManuallyDrop::drop(&mut self.frame_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

/// The renderer's objects borrowed for one scheduler iteration.
struct VulkanFrame<'a> {
    device: &'a Device,
    setup_pool: &'a CommandPool,
    render_pass: &'a RenderPass,
    swapchain: &'a mut SwapchainManager,
    frames: &'a mut [FrameSlot],
    pipeline: &'a Pipeline,
    pipeline_layout: &'a PipelineLayout,
    mesh: &'a MeshBuffers,
}

impl FrameBackend for VulkanFrame<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> RendererResult<()> {
        self.frames[slot].sync().in_flight_fence().wait_forever()?;
        Ok(())
    }

    fn acquire(&mut self, slot: usize) -> RendererResult<AcquireOutcome> {
        let semaphore = self.frames[slot].sync().image_available();
        Ok(self.swapchain.swapchain().acquire_next_image(semaphore)?)
    }

    fn reset_slot(&mut self, slot: usize) -> RendererResult<()> {
        let frame = &self.frames[slot];
        frame.sync().in_flight_fence().reset()?;
        frame.command_buffer().reset()?;
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> RendererResult<()> {
        let extent = self.swapchain.extent();
        let framebuffer = self
            .swapchain
            .framebuffer(image_index)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("No framebuffer for image {}", image_index))
            })?
            .handle();

        let frame = &mut self.frames[slot];
        frame.write_uniforms(&UniformBufferObject::for_extent(extent))?;

        let inputs = DrawInputs {
            render_pass: self.render_pass.handle(),
            framebuffer,
            extent,
            pipeline: self.pipeline.handle(),
            pipeline_layout: self.pipeline_layout.handle(),
            vertex_buffer: self.mesh.vertex_buffer.handle(),
            index_buffer: self.mesh.index_buffer.handle(),
            index_count: self.mesh.index_count,
            descriptor_set: frame.descriptor_set(),
        };

        let cmd = frame.command_buffer_mut();
        cmd.begin()?;
        record_draw(cmd, &inputs);
        cmd.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> RendererResult<()> {
        let frame = &self.frames[slot];

        let wait_semaphores = [frame.sync().image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync().render_finished()];
        let command_buffers = [frame.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was fully recorded in `record`, and the
        // fence was reset in `reset_slot` after its previous signal.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.sync().in_flight_fence().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RendererResult<PresentOutcome> {
        let wait_semaphore = self.frames[slot].sync().render_finished();
        Ok(self.swapchain.swapchain().present(
            self.device.present_queue(),
            image_index,
            wait_semaphore,
        )?)
    }

    fn recreate(&mut self, surface: &mut dyn DrawableSurface) -> RendererResult<()> {
        self.swapchain
            .recreate(self.setup_pool, self.render_pass, surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_count_presents_and_rebuilds() {
        let mut stats = FrameStats::default();

        stats.record(FrameOutcome::Presented {
            image_index: 0,
            recreated: false,
        });
        stats.record(FrameOutcome::Presented {
            image_index: 1,
            recreated: true,
        });
        stats.record(FrameOutcome::Recreated);

        assert_eq!(
            stats,
            FrameStats {
                presented_frames: 2,
                swapchain_rebuilds: 2,
            }
        );
    }

    #[test]
    fn test_device_selection_maps_to_strategy() {
        assert_eq!(
            selection_strategy(DeviceSelection::FirstSuitable),
            SelectionStrategy::FirstSuitable
        );
        assert_eq!(
            selection_strategy(DeviceSelection::HighestScore),
            SelectionStrategy::HighestScore
        );
    }

    #[test]
    fn test_frame_slot_count_rejects_invalid_config() {
        let mut config = RendererConfig::default();
        assert_eq!(frame_slot_count(&config).unwrap(), 2);

        config.frames_in_flight = 0;
        let err = frame_slot_count(&config).unwrap_err();
        assert_eq!(err.category(), "config");

        let mut config = RendererConfig::default();
        config.window.height = 0;
        assert!(frame_slot_count(&config).is_err());
    }
}

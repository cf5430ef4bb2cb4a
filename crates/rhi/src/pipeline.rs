//! Graphics pipeline state.
//!
//! The pipeline is described by a plain [`GraphicsPipelineDesc`] and compiled
//! once. Only the shader pair, vertex layout, culling and depth test vary;
//! everything else is fixed:
//!
//! | state            | value                                  |
//! |------------------|----------------------------------------|
//! | topology         | triangle list, no primitive restart    |
//! | viewport/scissor | dynamic, one of each                   |
//! | polygon mode     | fill                                   |
//! | multisampling    | 1 sample                               |
//! | color            | RGBA written straight, no blending     |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::pipeline::{GraphicsPipelineDesc, Pipeline, PipelineLayout};
//! use vkframe_rhi::render_pass::RenderPass;
//! use vkframe_rhi::shader::Shader;
//! use vkframe_rhi::vertex::Vertex;
//!
//! # fn example(device: Arc<Device>, vs: &Shader, fs: &Shader, render_pass: &RenderPass)
//! #     -> Result<(), vkframe_rhi::RhiError> {
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//! let attributes = Vertex::attribute_descriptions();
//! let desc = GraphicsPipelineDesc::new(vs, fs, render_pass.handle())
//!     .with_vertex_input(Vertex::binding_description(), &attributes);
//! let pipeline = Pipeline::graphics(device, &layout, &desc)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderStage};

/// States set while recording instead of baked into the pipeline, so a
/// resized swapchain needs no pipeline rebuild.
pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Descriptor set layouts and push constant ranges visible to a pipeline.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout ({} set layout(s), {} push constant range(s))",
            set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed pipeline layout");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Winding of front-facing triangles.
///
/// The projection flips Y for Vulkan's clip space, so counter-clockwise
/// model winding stays front facing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Rasterizer settings that may vary per pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RasterState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
}

impl RasterState {
    fn create_info(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(false)
    }
}

/// Depth test settings. Stencil testing is never enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            write_enable: true,
            compare_op: CompareOp::Less,
        }
    }
}

impl DepthState {
    fn create_info(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.test_enable)
            .depth_write_enable(self.write_enable)
            .depth_compare_op(self.compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
    }
}

/// Everything needed to compile a graphics pipeline against one subpass.
#[derive(Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub vertex_binding: Option<vk::VertexInputBindingDescription>,
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub raster: RasterState,
    pub depth: DepthState,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

impl<'a> GraphicsPipelineDesc<'a> {
    /// Describes a pipeline with no vertex input, back-face culling and a
    /// `Less` depth test, compiled against subpass 0 of `render_pass`.
    pub fn new(
        vertex_shader: &'a Shader,
        fragment_shader: &'a Shader,
        render_pass: vk::RenderPass,
    ) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            vertex_binding: None,
            vertex_attributes: &[],
            raster: RasterState::default(),
            depth: DepthState::default(),
            render_pass,
            subpass: 0,
        }
    }

    /// Sets the single vertex buffer binding and its attributes.
    pub fn with_vertex_input(
        mut self,
        binding: vk::VertexInputBindingDescription,
        attributes: &'a [vk::VertexInputAttributeDescription],
    ) -> Self {
        self.vertex_binding = Some(binding);
        self.vertex_attributes = attributes;
        self
    }

    fn validate(&self) -> RhiResult<()> {
        if self.vertex_shader.stage() != ShaderStage::Vertex {
            return Err(RhiError::PipelineError(format!(
                "Expected a vertex shader, got a {} shader",
                self.vertex_shader.stage()
            )));
        }
        if self.fragment_shader.stage() != ShaderStage::Fragment {
            return Err(RhiError::PipelineError(format!(
                "Expected a fragment shader, got a {} shader",
                self.fragment_shader.stage()
            )));
        }
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "A render pass is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Compiled graphics pipeline. Immutable after creation.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Compiles the pipeline described by `desc` against `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a shader has the wrong stage or
    /// no render pass is set, and a Vulkan error if compilation fails.
    pub fn graphics(
        device: Arc<Device>,
        layout: &PipelineLayout,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> RhiResult<Self> {
        desc.validate()?;

        let stages = [
            desc.vertex_shader.stage_create_info(),
            desc.fragment_shader.stage_create_info(),
        ];

        let bindings: &[vk::VertexInputBindingDescription] = match &desc.vertex_binding {
            Some(binding) => std::slice::from_ref(binding),
            None => &[],
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(bindings)
            .vertex_attribute_descriptions(desc.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are recorded per frame.
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = desc.raster.create_info();
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = desc.depth.create_info();

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .render_pass(desc.render_pass)
            .subpass(desc.subpass);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        }
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("Driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline created (cull {:?}, depth {:?})",
            desc.raster.cull_mode, desc.depth.compare_op
        );

        Ok(Self { device, pipeline })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

//! Per-frame command recording.
//!
//! [`CommandRecorder`] is the narrow set of commands a frame needs. The real
//! implementation forwards to [`vkframe_rhi::command::CommandBuffer`]; tests
//! substitute a recorder that only logs calls.

use ash::vk;

use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::render_pass::clear_values;

/// Commands recorded into a frame's command buffer.
pub trait CommandRecorder {
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    );
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn set_viewport(&mut self, viewport: vk::Viewport);
    fn set_scissor(&mut self, scissor: vk::Rect2D);
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType);
    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    fn draw_indexed(&mut self, index_count: u32);
    fn end_render_pass(&mut self);
}

impl CommandRecorder for CommandBuffer {
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) {
        CommandBuffer::begin_render_pass(self, render_pass, framebuffer, render_area, clear_values);
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.bind_graphics_pipeline(pipeline);
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        CommandBuffer::set_viewport(self, viewport);
    }

    fn set_scissor(&mut self, scissor: vk::Rect2D) {
        CommandBuffer::set_scissor(self, scissor);
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        CommandBuffer::bind_vertex_buffer(self, buffer);
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
        CommandBuffer::bind_index_buffer(self, buffer, index_type);
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.bind_graphics_descriptor_set(layout, set);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        CommandBuffer::draw_indexed(self, index_count);
    }

    fn end_render_pass(&mut self) {
        CommandBuffer::end_render_pass(self);
    }
}

/// Handles one frame's draw needs.
#[derive(Clone, Copy, Debug)]
pub struct DrawInputs {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub descriptor_set: vk::DescriptorSet,
}

/// Full-target viewport with depth 0..1.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-target rectangle.
pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Records the frame's single render pass with its one indexed draw.
pub fn record_draw<R: CommandRecorder + ?Sized>(recorder: &mut R, inputs: &DrawInputs) {
    let clear = clear_values();

    recorder.begin_render_pass(
        inputs.render_pass,
        inputs.framebuffer,
        full_rect(inputs.extent),
        &clear,
    );
    recorder.bind_pipeline(inputs.pipeline);
    recorder.set_viewport(full_viewport(inputs.extent));
    recorder.set_scissor(full_rect(inputs.extent));
    recorder.bind_vertex_buffer(inputs.vertex_buffer);
    recorder.bind_index_buffer(inputs.index_buffer, vk::IndexType::UINT32);
    recorder.bind_descriptor_set(inputs.pipeline_layout, inputs.descriptor_set);
    recorder.draw_indexed(inputs.index_count);
    recorder.end_render_pass();
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    /// Viewport fields as bit patterns, since `vk::Viewport` has no `PartialEq`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ViewportBits([u32; 6]);

    impl From<vk::Viewport> for ViewportBits {
        fn from(v: vk::Viewport) -> Self {
            Self([v.x, v.y, v.width, v.height, v.min_depth, v.max_depth].map(f32::to_bits))
        }
    }

    /// One recorded command.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Command {
        BeginRenderPass {
            framebuffer: vk::Framebuffer,
            render_area: vk::Rect2D,
            clear_count: usize,
        },
        BindPipeline(vk::Pipeline),
        SetViewport(ViewportBits),
        SetScissor(vk::Rect2D),
        BindVertexBuffer(vk::Buffer),
        BindIndexBuffer(vk::Buffer, vk::IndexType),
        BindDescriptorSet(vk::DescriptorSet),
        DrawIndexed(u32),
        EndRenderPass,
    }

    #[derive(Default)]
    pub struct RecordingRecorder {
        pub commands: Vec<Command>,
    }

    impl RecordingRecorder {
        pub fn draw_counts(&self) -> Vec<u32> {
            self.commands
                .iter()
                .filter_map(|c| match c {
                    Command::DrawIndexed(n) => Some(*n),
                    _ => None,
                })
                .collect()
        }
    }

    impl CommandRecorder for RecordingRecorder {
        fn begin_render_pass(
            &mut self,
            _render_pass: vk::RenderPass,
            framebuffer: vk::Framebuffer,
            render_area: vk::Rect2D,
            clear_values: &[vk::ClearValue],
        ) {
            self.commands.push(Command::BeginRenderPass {
                framebuffer,
                render_area,
                clear_count: clear_values.len(),
            });
        }

        fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.commands.push(Command::BindPipeline(pipeline));
        }

        fn set_viewport(&mut self, viewport: vk::Viewport) {
            self.commands.push(Command::SetViewport(viewport.into()));
        }

        fn set_scissor(&mut self, scissor: vk::Rect2D) {
            self.commands.push(Command::SetScissor(scissor));
        }

        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Command::BindVertexBuffer(buffer));
        }

        fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
            self.commands.push(Command::BindIndexBuffer(buffer, index_type));
        }

        fn bind_descriptor_set(&mut self, _layout: vk::PipelineLayout, set: vk::DescriptorSet) {
            self.commands.push(Command::BindDescriptorSet(set));
        }

        fn draw_indexed(&mut self, index_count: u32) {
            self.commands.push(Command::DrawIndexed(index_count));
        }

        fn end_render_pass(&mut self) {
            self.commands.push(Command::EndRenderPass);
        }
    }

    /// Draw inputs with distinguishable non-null handles.
    pub fn draw_inputs(extent: vk::Extent2D, index_count: u32) -> DrawInputs {
        use ash::vk::Handle;

        DrawInputs {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent,
            pipeline: vk::Pipeline::from_raw(3),
            pipeline_layout: vk::PipelineLayout::from_raw(4),
            vertex_buffer: vk::Buffer::from_raw(5),
            index_buffer: vk::Buffer::from_raw(6),
            index_count,
            descriptor_set: vk::DescriptorSet::from_raw(7),
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::mock::{Command, RecordingRecorder, ViewportBits, draw_inputs};
    use super::*;

    #[test]
    fn test_record_draw_sequence() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let mut recorder = RecordingRecorder::default();

        record_draw(&mut recorder, &draw_inputs(extent, 12));

        assert_eq!(
            recorder.commands,
            vec![
                Command::BeginRenderPass {
                    framebuffer: vk::Framebuffer::from_raw(2),
                    render_area: full_rect(extent),
                    clear_count: 2,
                },
                Command::BindPipeline(vk::Pipeline::from_raw(3)),
                Command::SetViewport(full_viewport(extent).into()),
                Command::SetScissor(full_rect(extent)),
                Command::BindVertexBuffer(vk::Buffer::from_raw(5)),
                Command::BindIndexBuffer(vk::Buffer::from_raw(6), vk::IndexType::UINT32),
                Command::BindDescriptorSet(vk::DescriptorSet::from_raw(7)),
                Command::DrawIndexed(12),
                Command::EndRenderPass,
            ]
        );
    }

    #[test]
    fn test_viewport_tracks_extent() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!((viewport.width, viewport.height), (1280.0, 720.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_recorded_viewports_compare_by_value() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = full_viewport(extent);

        assert_eq!(ViewportBits::from(viewport), ViewportBits::from(full_viewport(extent)));
        assert_ne!(
            ViewportBits::from(viewport),
            ViewportBits::from(vk::Viewport {
                max_depth: 0.5,
                ..viewport
            })
        );
    }
}

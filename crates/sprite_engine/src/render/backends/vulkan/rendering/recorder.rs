//! [`DrawRecorder`] over a command buffer inside the sprite render pass

use ash::{vk, Device};

use crate::render::batch::{DrawRecorder, SpritePushConstants};

/// Records sprite draws into one frame's command buffer
pub struct VulkanDrawRecorder<'a> {
    device: &'a Device,
    command_buffer: vk::CommandBuffer,
    pipeline_layout: vk::PipelineLayout,
    vertex_buffer: vk::Buffer,
}

impl<'a> VulkanDrawRecorder<'a> {
    /// Wrap a command buffer that is recording with the sprite pipeline bound
    pub fn new(
        device: &'a Device,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
        vertex_buffer: vk::Buffer,
    ) -> Self {
        Self {
            device,
            command_buffer,
            pipeline_layout,
            vertex_buffer,
        }
    }
}

impl DrawRecorder for VulkanDrawRecorder<'_> {
    fn push_constants(&mut self, constants: &SpritePushConstants) {
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::bytes_of(constants),
            );
        }
    }

    fn bind_descriptor_set(&mut self, descriptor_set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
    }

    fn bind_vertex_buffer(&mut self) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[self.vertex_buffer], &[0]);
        }
    }

    fn draw(&mut self, first_vertex: u32, vertex_count: u32) {
        unsafe {
            self.device.cmd_draw(self.command_buffer, vertex_count, 1, first_vertex, 0);
        }
    }
}

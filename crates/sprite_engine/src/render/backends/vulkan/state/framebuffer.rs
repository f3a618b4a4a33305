//! Swapchain framebuffers

use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::context::{VkResultExt, VulkanResult};

fn single_layer_info<'a>(
    render_pass: vk::RenderPass,
    attachments: &'a [vk::ImageView],
    extent: vk::Extent2D,
) -> vk::FramebufferCreateInfoBuilder<'a> {
    vk::FramebufferCreateInfo::builder()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1)
}

/// Framebuffer over one swapchain image view, destroyed on drop
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// One framebuffer per swapchain image view, in the swapchain's order
    pub fn for_views(
        device: &Device,
        render_pass: vk::RenderPass,
        views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<Self>> {
        let mut framebuffers = Vec::with_capacity(views.len());
        for view in views {
            let info = single_layer_info(render_pass, std::slice::from_ref(view), extent);
            let framebuffer =
                unsafe { device.create_framebuffer(&info, None) }.vk_context("vkCreateFramebuffer")?;
            framebuffers.push(Self {
                device: device.clone(),
                framebuffer,
                extent,
            });
        }
        log::trace!("Created {} framebuffers at {}x{}", framebuffers.len(), extent.width, extent.height);
        Ok(framebuffers)
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Size the framebuffer was created at
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.destroy_framebuffer(self.framebuffer, None) };
    }
}

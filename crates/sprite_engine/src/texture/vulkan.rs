//! Vulkan side of a texture

use std::fmt;
use std::rc::Rc;

use ash::vk;

use crate::render::backends::vulkan::VulkanResult;

/// The Vulkan objects that make up one sampled texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageResources {
    /// Device-local image
    pub image: vk::Image,
    /// Memory bound to `image`
    pub memory: vk::DeviceMemory,
    /// 2D view over the whole image
    pub view: vk::ImageView,
    /// Nearest-filter, clamp-to-edge sampler
    pub sampler: vk::Sampler,
    /// Format the pixels were uploaded as
    pub format: vk::Format,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ImageResources {
    /// True when every handle is non-null
    pub fn is_complete(&self) -> bool {
        self.image != vk::Image::null()
            && self.memory != vk::DeviceMemory::null()
            && self.view != vk::ImageView::null()
            && self.sampler != vk::Sampler::null()
    }
}

/// Creates and destroys sampled images on a logical device.
///
/// Uploads are synchronous: `upload` returns once the pixels are resident and
/// the image is in `SHADER_READ_ONLY_OPTIMAL`.
pub trait ImageUploader {
    /// Logical device the images live on
    fn device_handle(&self) -> vk::Device;

    /// False once the device has been shut down
    fn is_alive(&self) -> bool;

    /// Create an image/memory/view/sampler set holding `pixels`
    fn upload(&self, pixels: &[u8], width: u32, height: u32, format: vk::Format) -> VulkanResult<ImageResources>;

    /// Destroy sampler, view, image and memory in that order
    fn destroy(&self, resources: ImageResources);
}

/// Format used for tightly packed 8-bit pixels with `channels` components.
pub fn vulkan_format_for_channels(channels: u8) -> Option<vk::Format> {
    match channels {
        1 => Some(vk::Format::R8_UNORM),
        2 => Some(vk::Format::R8G8_UNORM),
        3 => Some(vk::Format::R8G8B8_UNORM),
        4 => Some(vk::Format::R8G8B8A8_UNORM),
        _ => None,
    }
}

/// View swizzle so that 1 and 2 channel images sample as white with alpha.
pub fn component_mapping_for_format(format: vk::Format) -> vk::ComponentMapping {
    let identity = vk::ComponentSwizzle::IDENTITY;
    match format {
        vk::Format::R8_UNORM => vk::ComponentMapping {
            r: vk::ComponentSwizzle::ONE,
            g: vk::ComponentSwizzle::ONE,
            b: vk::ComponentSwizzle::ONE,
            a: vk::ComponentSwizzle::R,
        },
        vk::Format::R8G8_UNORM => vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::R,
            b: vk::ComponentSwizzle::R,
            a: vk::ComponentSwizzle::G,
        },
        _ => vk::ComponentMapping {
            r: identity,
            g: identity,
            b: identity,
            a: identity,
        },
    }
}

/// Live Vulkan resources owned by one texture, tagged with their device.
pub(super) struct VulkanBinding {
    pub resources: ImageResources,
    pub device: vk::Device,
    pub uploader: Rc<dyn ImageUploader>,
}

impl VulkanBinding {
    pub fn new(resources: ImageResources, uploader: Rc<dyn ImageUploader>) -> Self {
        Self {
            resources,
            device: uploader.device_handle(),
            uploader,
        }
    }

    /// Destroy the resources if their device is still running.
    pub fn release(self) {
        if self.uploader.is_alive() && self.uploader.device_handle() == self.device {
            self.uploader.destroy(self.resources);
        } else {
            log::debug!("Device gone, dropping Vulkan texture handles without destroy calls");
        }
    }
}

impl fmt::Debug for VulkanBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBinding")
            .field("resources", &self.resources)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

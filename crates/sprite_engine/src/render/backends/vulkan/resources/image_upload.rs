//! Synchronous texture upload
//!
//! Pixels go through a host-visible staging buffer, a one-shot command buffer
//! copies them into a device-local image, and the graphics queue is waited on
//! before the staging buffer is freed. Every upload therefore serializes with
//! rendering.
//!
//! The uploader keeps a registry of every image it created. On shutdown
//! [`VulkanImageUploader::release_all`] destroys the survivors and marks the
//! uploader dead, so textures that outlive the renderer drop without touching
//! a destroyed device.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use ash::{vk, Device, Instance};

use super::buffer::{Buffer, HOST_COHERENT};
use super::memory::{create_image_2d, create_image_view, create_nearest_sampler, record_layout_transition};
use crate::render::backends::vulkan::initialization::context::{VulkanError, VulkanResult};
use crate::render::backends::vulkan::rendering::commands::CommandPool;
use crate::texture::{component_mapping_for_format, ImageResources, ImageUploader};

/// [`ImageUploader`] backed by a logical device and the graphics queue.
pub struct VulkanImageUploader {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    rgb8_sampled: bool,
    command_pool: RefCell<Option<CommandPool>>,
    queue: vk::Queue,
    live: RefCell<HashMap<vk::Image, ImageResources>>,
    destroyed: Cell<u64>,
    alive: Cell<bool>,
}

impl VulkanImageUploader {
    /// Create an uploader with its own transient command pool
    pub fn new(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        memory_properties: vk::PhysicalDeviceMemoryProperties,
        device: Device,
        queue_family: u32,
        queue: vk::Queue,
    ) -> VulkanResult<Self> {
        let rgb8 = unsafe { instance.get_physical_device_format_properties(physical_device, vk::Format::R8G8B8_UNORM) };
        let rgb8_sampled = rgb8
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::TRANSFER_DST);
        if !rgb8_sampled {
            log::debug!("R8G8B8_UNORM not sampleable here, 3-channel textures are expanded to RGBA");
        }

        let command_pool = CommandPool::new(device.clone(), queue_family, vk::CommandPoolCreateFlags::TRANSIENT)?;

        Ok(Self {
            device,
            memory_properties,
            rgb8_sampled,
            command_pool: RefCell::new(Some(command_pool)),
            queue,
            live: RefCell::new(HashMap::new()),
            destroyed: Cell::new(0),
            alive: Cell::new(true),
        })
    }

    /// Number of images created and not yet destroyed
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// Count of images destroyed so far; changes whenever a view goes stale
    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.get()
    }

    /// Views of every image still alive
    pub fn live_views(&self) -> HashSet<vk::ImageView> {
        self.live.borrow().values().map(|r| r.view).collect()
    }

    /// Destroy every image still registered, plus the upload command pool,
    /// and refuse further work.
    ///
    /// The device must be idle.
    pub fn release_all(&self) {
        drop(self.command_pool.borrow_mut().take());
        let survivors: Vec<ImageResources> = self.live.borrow_mut().drain().map(|(_, r)| r).collect();
        if !survivors.is_empty() {
            log::debug!("Releasing {} texture images still alive at shutdown", survivors.len());
        }
        for resources in survivors {
            self.destroy_raw(&resources);
        }
        self.alive.set(false);
    }

    fn destroy_raw(&self, resources: &ImageResources) {
        unsafe {
            if resources.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(resources.sampler, None);
            }
            if resources.view != vk::ImageView::null() {
                self.device.destroy_image_view(resources.view, None);
            }
            if resources.image != vk::Image::null() {
                self.device.destroy_image(resources.image, None);
            }
            if resources.memory != vk::DeviceMemory::null() {
                self.device.free_memory(resources.memory, None);
            }
        }
    }

    fn copy_to_image(&self, staging: &Buffer, image: vk::Image, width: u32, height: u32) -> VulkanResult<()> {
        let pool = self.command_pool.borrow();
        let pool = pool.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "upload command pool already released".to_string(),
        })?;
        pool.submit_one_time(self.queue, |command_buffer| {
            record_layout_transition(
                &self.device,
                command_buffer,
                image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 })
                .build();

            unsafe {
                self.device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            record_layout_transition(
                &self.device,
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })
    }
}

/// Expand tightly packed RGB pixels to RGBA with opaque alpha.
pub fn expand_rgb_to_rgba(pixels: &[u8]) -> Vec<u8> {
    pixels.chunks_exact(3).flat_map(|px| [px[0], px[1], px[2], 255]).collect()
}

/// Bytes per pixel of the 8-bit formats textures use.
pub fn bytes_per_pixel(format: vk::Format) -> Option<usize> {
    match format {
        vk::Format::R8_UNORM => Some(1),
        vk::Format::R8G8_UNORM => Some(2),
        vk::Format::R8G8B8_UNORM => Some(3),
        vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM => Some(4),
        _ => None,
    }
}

impl ImageUploader for VulkanImageUploader {
    fn device_handle(&self) -> vk::Device {
        self.device.handle()
    }

    fn is_alive(&self) -> bool {
        self.alive.get()
    }

    fn upload(&self, pixels: &[u8], width: u32, height: u32, format: vk::Format) -> VulkanResult<ImageResources> {
        if !self.is_alive() {
            return Err(VulkanError::InvalidOperation {
                reason: "uploader used after shutdown".to_string(),
            });
        }
        let bpp = bytes_per_pixel(format).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("unsupported texture format {format:?}"),
        })?;
        let expected = width as usize * height as usize * bpp;
        if width == 0 || height == 0 || pixels.len() < expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!("{width}x{height} {format:?} needs {expected} bytes, got {}", pixels.len()),
            });
        }

        let expanded;
        let (data, format) = if format == vk::Format::R8G8B8_UNORM && !self.rgb8_sampled {
            expanded = expand_rgb_to_rgba(&pixels[..expected]);
            (&expanded[..], vk::Format::R8G8B8A8_UNORM)
        } else {
            (&pixels[..expected], format)
        };

        let staging = Buffer::new(
            self.device.clone(),
            &self.memory_properties,
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            HOST_COHERENT,
        )?;
        staging.write_data(data)?;

        let (image, memory) = create_image_2d(&self.device, &self.memory_properties, width, height, format)?;
        let mut resources = ImageResources {
            image,
            memory,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            format,
            width,
            height,
        };

        let finish = |resources: &mut ImageResources| -> VulkanResult<()> {
            self.copy_to_image(&staging, image, width, height)?;
            resources.view = create_image_view(&self.device, image, format, component_mapping_for_format(format))?;
            resources.sampler = create_nearest_sampler(&self.device)?;
            Ok(())
        };

        if let Err(e) = finish(&mut resources) {
            log::error!("Texture upload {width}x{height} {format:?} failed: {e}");
            self.destroy_raw(&resources);
            return Err(e);
        }

        self.live.borrow_mut().insert(image, resources);
        log::trace!("Uploaded {width}x{height} {format:?} texture");
        Ok(resources)
    }

    fn destroy(&self, resources: ImageResources) {
        if !self.is_alive() {
            return;
        }
        if self.live.borrow_mut().remove(&resources.image).is_some() {
            self.destroy_raw(&resources);
            self.destroyed.set(self.destroyed.get() + 1);
        } else {
            log::warn!("Ignoring destroy of unknown image {:?}", resources.image);
        }
    }
}

impl Drop for VulkanImageUploader {
    fn drop(&mut self) {
        if self.is_alive() {
            unsafe {
                let _ = self.device.device_wait_idle();
            }
            self.release_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_expansion_adds_opaque_alpha() {
        assert_eq!(expand_rgb_to_rgba(&[1, 2, 3, 4, 5, 6]), vec![1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn test_bytes_per_pixel() {
        assert_eq!(bytes_per_pixel(vk::Format::R8_UNORM), Some(1));
        assert_eq!(bytes_per_pixel(vk::Format::R8G8B8_UNORM), Some(3));
        assert_eq!(bytes_per_pixel(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(bytes_per_pixel(vk::Format::D32_SFLOAT), None);
    }
}

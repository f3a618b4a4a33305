//! GPU resource primitives
//!
//! Memory-type lookup and the raw buffer / image / view / sampler creation
//! routines the rest of the backend builds on. Each helper frees what it
//! created if a later step fails.

use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::context::{VkResultExt, VulkanError, VulkanResult};

/// Index of the first memory type allowed by `type_filter` with all `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = (memory_properties.memory_type_count as usize).min(memory_properties.memory_types.len());
    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, memory_type)| type_filter & (1 << i) != 0 && memory_type.property_flags.contains(properties))
        .map(|(i, _)| i as u32)
        .ok_or(VulkanError::NoSuitableMemoryType)
}

/// Allocate memory satisfying `requirements`
pub fn allocate_memory(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(memory_properties, requirements.memory_type_bits, properties)?;
    let allocate_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    unsafe { device.allocate_memory(&allocate_info, None) }.vk_context("vkAllocateMemory")
}

/// Create a buffer with bound memory
pub fn create_buffer(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None) }.vk_context("vkCreateBuffer")?;
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let bound = allocate_memory(device, memory_properties, requirements, properties).and_then(|memory| {
        match unsafe { device.bind_buffer_memory(buffer, memory, 0) }.vk_context("vkBindBufferMemory") {
            Ok(()) => Ok(memory),
            Err(e) => {
                unsafe { device.free_memory(memory, None) };
                Err(e)
            }
        }
    });

    match bound {
        Ok(memory) => Ok((buffer, memory)),
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            Err(e)
        }
    }
}

/// Create a device-local, optimally tiled 2D image usable as a transfer
/// destination and for sampling
pub fn create_image_2d(
    device: &Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    width: u32,
    height: u32,
    format: vk::Format,
) -> VulkanResult<(vk::Image, vk::DeviceMemory)> {
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D { width, height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .samples(vk::SampleCountFlags::TYPE_1);

    let image = unsafe { device.create_image(&image_info, None) }.vk_context("vkCreateImage")?;
    let requirements = unsafe { device.get_image_memory_requirements(image) };

    let bound = allocate_memory(device, memory_properties, requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        .and_then(|memory| match unsafe { device.bind_image_memory(image, memory, 0) }.vk_context("vkBindImageMemory") {
            Ok(()) => Ok(memory),
            Err(e) => {
                unsafe { device.free_memory(memory, None) };
                Err(e)
            }
        });

    match bound {
        Ok(memory) => Ok((image, memory)),
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            Err(e)
        }
    }
}

/// Subresource range covering the single mip level and layer of a colour image
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Create a 2D view over the whole image
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    components: vk::ComponentMapping,
) -> VulkanResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(components)
        .subresource_range(color_subresource_range());

    unsafe { device.create_image_view(&view_info, None) }.vk_context("vkCreateImageView")
}

/// Nearest-filter, clamp-to-edge sampler
pub fn create_nearest_sampler(device: &Device) -> VulkanResult<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(0.0);

    unsafe { device.create_sampler(&sampler_info, None) }.vk_context("vkCreateSampler")
}

/// Stage and access masks for the two transitions a texture upload needs.
pub fn layout_transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<(vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => Ok((
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        )),
        _ => Err(VulkanError::InvalidOperation {
            reason: format!("Unsupported layout transition {old_layout:?} -> {new_layout:?}"),
        }),
    }
}

/// Record an image layout transition barrier
pub fn record_layout_transition(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> VulkanResult<()> {
    let (src_access, dst_access, src_stage, dst_stage) = layout_transition_masks(old_layout, new_layout)?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &property_flags) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = property_flags;
        }
        props
    }

    #[test]
    fn test_find_memory_type_honours_filter_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        assert_eq!(find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
        assert_eq!(find_memory_type(&props, 0b100, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 2);
        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
    }

    #[test]
    fn test_find_memory_type_reports_missing_type() {
        let props = properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap_err();
        assert!(matches!(err, VulkanError::NoSuitableMemoryType));
    }

    #[test]
    fn test_upload_transitions_are_supported() {
        let (_, dst, _, dst_stage) =
            layout_transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (src, dst, _, dst_stage) = layout_transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!((src, dst), (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ));
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        assert!(layout_transition_masks(vk::ImageLayout::GENERAL, vk::ImageLayout::UNDEFINED).is_err());
    }
}

//! Buffer management for vertex, index and staging data

use std::marker::PhantomData;

use ash::{vk, Device};
use bytemuck::Pod;

use super::memory::create_buffer;
use crate::render::backends::vulkan::initialization::context::{VkResultExt, VulkanError, VulkanResult};

/// Host-visible and host-coherent: CPU writes need no explicit flush.
pub const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let (buffer, memory) = create_buffer(&device, memory_properties, size, usage, properties)?;
        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Copy `data` to the start of the buffer through a temporary mapping.
    ///
    /// The buffer must be host visible.
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes into {}-byte buffer", bytes.len(), self.size),
            });
        }

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .vk_context("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// A host-coherent buffer of `T` that stays mapped for its whole life.
pub struct MappedBuffer<T: Pod> {
    buffer: Buffer,
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> MappedBuffer<T> {
    /// Allocate room for `len` elements and map it
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        len: usize,
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let size = (len.max(1) * std::mem::size_of::<T>()) as vk::DeviceSize;
        let buffer = Buffer::new(device, memory_properties, size, usage, HOST_COHERENT)?;

        let ptr = unsafe {
            buffer
                .device
                .map_memory(buffer.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .vk_context("vkMapMemory")?
        };

        Ok(Self {
            buffer,
            ptr: ptr.cast::<T>(),
            len,
            _marker: PhantomData,
        })
    }

    /// The mapped elements.
    ///
    /// The GPU may still be reading a slot's buffer; callers wait on that
    /// slot's fence before writing.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl<T: Pod> Drop for MappedBuffer<T> {
    fn drop(&mut self) {
        unsafe {
            self.buffer.device.unmap_memory(self.buffer.memory);
        }
    }
}

//! Descriptor set management
//!
//! The sprite pipeline uses a single set layout: one combined image sampler at
//! binding 0. Sets are allocated once per distinct image view and cached for
//! the renderer's lifetime.

use std::collections::HashMap;

use ash::{vk, Device};

use super::memory::create_nearest_sampler;
use crate::render::backends::vulkan::initialization::context::{VkResultExt, VulkanError, VulkanResult};

/// Builder for descriptor set layouts
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self { bindings: Vec::new() }
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(mut self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Create the layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .vk_context("vkCreateDescriptorSetLayout")?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout with RAII cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Get the layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Fixed-capacity pool of combined-image-sampler sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
    capacity: u32,
    allocated: u32,
}

impl DescriptorPool {
    /// Create a pool holding up to `max_sets` single-sampler sets
    pub fn new(device: Device, max_sets: u32) -> VulkanResult<Self> {
        let pool_sizes = [vk::DescriptorPoolSize::builder()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(max_sets)
            .build()];

        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.vk_context("vkCreateDescriptorPool")?;

        Ok(Self {
            pool,
            device,
            capacity: max_sets,
            allocated: 0,
        })
    }

    /// Allocate one set with `layout`, failing once the pool is full
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        if self.allocated >= self.capacity {
            return Err(VulkanError::InvalidOperation {
                reason: format!("descriptor pool exhausted ({} sets)", self.capacity),
            });
        }

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let set = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }
            .vk_context("vkAllocateDescriptorSets")?
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "driver returned no descriptor set".to_string(),
            })?;
        self.allocated += 1;
        Ok(set)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Something that can produce a descriptor set sampling an image view.
pub trait DescriptorAllocator {
    /// Allocate and write a set for `view`
    fn allocate(&mut self, view: vk::ImageView) -> VulkanResult<vk::DescriptorSet>;
}

/// Allocates sets from a [`DescriptorPool`] and binds them to a shared
/// nearest/clamp sampler.
pub struct VulkanDescriptorAllocator {
    device: Device,
    pool: DescriptorPool,
    layout: vk::DescriptorSetLayout,
    sampler: vk::Sampler,
}

impl VulkanDescriptorAllocator {
    /// Create the pool and sampler. `layout` must outlive the allocator.
    pub fn new(device: Device, layout: vk::DescriptorSetLayout, capacity: u32) -> VulkanResult<Self> {
        let pool = DescriptorPool::new(device.clone(), capacity)?;
        let sampler = create_nearest_sampler(&device)?;
        Ok(Self {
            device,
            pool,
            layout,
            sampler,
        })
    }
}

impl DescriptorAllocator for VulkanDescriptorAllocator {
    fn allocate(&mut self, view: vk::ImageView) -> VulkanResult<vk::DescriptorSet> {
        let set = self.pool.allocate(self.layout)?;

        let image_info = [vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(view)
            .sampler(self.sampler)
            .build()];

        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();

        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
        Ok(set)
    }
}

impl Drop for VulkanDescriptorAllocator {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Image view to descriptor set map. Append-only until [`DescriptorCache::clear`].
pub struct DescriptorCache<A: DescriptorAllocator> {
    allocator: A,
    // Keyed by raw handle. A destroyed view's handle value can be handed out
    // again by the driver, so entries for destroyed views must be dropped with
    // `retain_live` before the next lookup.
    sets: HashMap<vk::ImageView, vk::DescriptorSet>,
    exhaustion_reported: bool,
}

impl<A: DescriptorAllocator> DescriptorCache<A> {
    /// Create an empty cache
    pub fn new(allocator: A) -> Self {
        Self {
            allocator,
            sets: HashMap::new(),
            exhaustion_reported: false,
        }
    }

    /// Cached set for `view`, allocating one on first use.
    ///
    /// Returns a null handle when allocation fails; the draw should be skipped.
    pub fn get_or_create(&mut self, view: vk::ImageView) -> vk::DescriptorSet {
        if view == vk::ImageView::null() {
            return vk::DescriptorSet::null();
        }
        if let Some(&set) = self.sets.get(&view) {
            return set;
        }

        match self.allocator.allocate(view) {
            Ok(set) => {
                self.sets.insert(view, set);
                set
            }
            Err(e) => {
                if !self.exhaustion_reported {
                    log::error!("Descriptor set allocation failed, skipping draws: {e}");
                    self.exhaustion_reported = true;
                }
                vk::DescriptorSet::null()
            }
        }
    }

    /// Number of cached sets
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop mappings for views that fail `is_live`, returning how many went.
    ///
    /// The sets themselves stay allocated in the pool.
    pub fn retain_live(&mut self, is_live: impl Fn(vk::ImageView) -> bool) -> usize {
        let before = self.sets.len();
        self.sets.retain(|&view, _| is_live(view));
        before - self.sets.len()
    }

    /// Forget every cached set
    pub fn clear(&mut self) {
        self.sets.clear();
        self.exhaustion_reported = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    struct FakeAllocator {
        capacity: u64,
        allocated: u64,
    }

    impl DescriptorAllocator for FakeAllocator {
        fn allocate(&mut self, _view: vk::ImageView) -> VulkanResult<vk::DescriptorSet> {
            if self.allocated == self.capacity {
                return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
            }
            self.allocated += 1;
            Ok(vk::DescriptorSet::from_raw(self.allocated))
        }
    }

    fn cache(capacity: u64) -> DescriptorCache<FakeAllocator> {
        DescriptorCache::new(FakeAllocator { capacity, allocated: 0 })
    }

    #[test]
    fn test_one_set_per_view() {
        let mut cache = cache(10);
        let a = vk::ImageView::from_raw(1);
        let b = vk::ImageView::from_raw(2);

        let first = cache.get_or_create(a);
        assert_eq!(cache.get_or_create(a), first);
        assert_ne!(cache.get_or_create(b), first);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.allocator.allocated, 2);
    }

    #[test]
    fn test_exhaustion_returns_null() {
        let mut cache = cache(1);
        let a = vk::ImageView::from_raw(1);
        let b = vk::ImageView::from_raw(2);

        assert_ne!(cache.get_or_create(a), vk::DescriptorSet::null());
        assert_eq!(cache.get_or_create(b), vk::DescriptorSet::null());
        assert_eq!(cache.get_or_create(b), vk::DescriptorSet::null());
        assert_ne!(cache.get_or_create(a), vk::DescriptorSet::null());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_null_view_is_not_cached() {
        let mut cache = cache(4);
        assert_eq!(cache.get_or_create(vk::ImageView::null()), vk::DescriptorSet::null());
        assert!(cache.is_empty());
        assert_eq!(cache.allocator.allocated, 0);
    }

    #[test]
    fn test_reused_handle_gets_fresh_set_after_retain() {
        let mut cache = cache(4);
        let view = vk::ImageView::from_raw(9);
        let stale = cache.get_or_create(view);

        // view destroyed, then the same handle value comes back for a new image
        assert_eq!(cache.retain_live(|v| v != view), 1);
        let fresh = cache.get_or_create(view);
        assert_ne!(fresh, stale);
        assert_eq!(cache.allocator.allocated, 2);
    }

    #[test]
    fn test_clear_empties_cache() {
        let mut cache = cache(4);
        cache.get_or_create(vk::ImageView::from_raw(7));
        cache.clear();
        assert!(cache.is_empty());
    }
}

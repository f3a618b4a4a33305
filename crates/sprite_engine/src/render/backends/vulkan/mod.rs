//! Vulkan backend implementation
//!
//! Organized into initialization, resources, rendering and state modules,
//! with [`SpriteRenderer`] tying them together.

/// Vulkan initialization types (instance, device, context)
pub mod initialization;

/// Vulkan resource management (buffers, images, descriptors, caches)
pub mod resources;

/// Vulkan rendering operations (shaders, pipeline, render pass, commands)
pub mod rendering;

/// Vulkan state management
pub mod state;

/// Main sprite renderer implementation
pub mod renderer;

// Re-export main renderer
pub use renderer::{SpriteRenderer, MAX_FRAMES_IN_FLIGHT};

// Re-export core initialization types
pub use initialization::context::{PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanResult};

// Re-export resource types
pub use resources::buffer::{Buffer, MappedBuffer};
pub use resources::descriptor_set::{DescriptorCache, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use resources::glyph_cache::GlyphCache;
pub use resources::image_upload::VulkanImageUploader;
pub use resources::texture_cache::{CachedTexture, TextureCache};

// Re-export rendering types
pub use rendering::commands::CommandPool;
pub use rendering::recorder::VulkanDrawRecorder;
pub use rendering::render_pass::RenderPass;
pub use rendering::shader::{ShaderModule, SpritePipeline};

// Re-export state types
pub use state::framebuffer::Framebuffer;
pub use state::swapchain::Swapchain;
pub use state::sync::{Fence, FrameSync, Semaphore};

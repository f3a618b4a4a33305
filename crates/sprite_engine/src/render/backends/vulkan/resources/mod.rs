//! Vulkan resource management
//!
//! Buffers, uploaded images, descriptor sets and the caches that map
//! textures and glyphs onto them.

/// Memory type selection and raw allocation helpers
pub mod memory;

/// Vertex, index and staging buffers
pub mod buffer;

/// Image upload through staging buffers
pub mod image_upload;

/// Descriptor set management
pub mod descriptor_set;

/// Texture identity to image view mapping
pub mod texture_cache;

/// Per-character glyph images
pub mod glyph_cache;

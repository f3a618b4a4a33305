//! Vulkan initialization: instance, surface, physical and logical device

/// Vulkan context and error types
pub mod context;

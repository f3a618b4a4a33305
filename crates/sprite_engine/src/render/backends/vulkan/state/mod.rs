//! Vulkan state management: swapchain, framebuffers and synchronization

pub mod framebuffer;
pub mod swapchain;
pub mod sync;

//! Vulkan rendering operations

/// Command pool management
pub mod commands;

/// Draw command recording for the sprite batcher
pub mod recorder;

/// Render pass creation
pub mod render_pass;

/// Shader modules and the sprite pipeline
pub mod shader;

//! Rendering
//!
//! Backend-neutral pieces (batching, text layout, perspective warp,
//! configuration, the window seam) live here; everything touching the GPU is
//! under [`backends::vulkan`].

pub mod batch;
pub mod config;
pub mod perspective;
pub mod shader_source;
pub mod text;
pub mod window;

/// GLFW window implementing [`window::RenderWindow`]
#[cfg(feature = "glfw-window")]
pub mod glfw_window;

/// Backend implementations
pub mod backends;

pub use backends::vulkan::{SpriteRenderer, VulkanError, VulkanResult};
pub use batch::{SpriteBatcher, UvRect};
pub use config::{BatchMode, RendererConfig, ShaderConfig};
pub use perspective::{PerspectiveMode, PerspectiveWarp};
pub use shader_source::{FileShaderSource, ShaderSource};
pub use text::{FontdueGlyphSource, GlyphSource};
pub use window::{RenderWindow, WindowError};

//! # Sprite Engine
//!
//! The rendering core of a 2D game engine: a Vulkan sprite renderer with a
//! batching layer, text rendering and textures that can live on both OpenGL
//! and Vulkan.
//!
//! ## Features
//!
//! - **Sprite batching**: immediate or coalesced draws into a per-frame vertex buffer
//! - **Texture and descriptor caches**: textures upload on first draw
//! - **Dual-backend textures**: OpenGL handles tagged with a context generation
//! - **Text**: fontdue-rasterized ASCII glyphs with an outline pass
//! - **Perspective warps**: globe, vanishing point and fisheye
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "glfw-window")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use sprite_engine::prelude::*;
//! use sprite_engine::render::glfw_window::GlfwWindow;
//!
//! let mut window = GlfwWindow::new("Sprites", 800, 600)?;
//! let config = RendererConfig::default();
//! let shaders = FileShaderSource::new(&config.shaders);
//! let mut renderer = SpriteRenderer::init(&mut window, &config, &shaders, None)?;
//!
//! while !window.should_close() {
//!     window.poll_events();
//!     if renderer.begin_frame(&mut window) {
//!         renderer.draw_colored_rect(Vec2::new(100.0, 100.0), Vec2::new(50.0, 50.0), 0.0, Vec4::new(1.0, 0.0, 0.0, 1.0));
//!         renderer.end_frame(&mut window);
//!     }
//! }
//! renderer.shutdown();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "glfw-window"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod texture;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::Config,
        foundation::math::{Mat4, Vec2, Vec3, Vec4},
        render::{
            BatchMode, FileShaderSource, FontdueGlyphSource, GlyphSource, PerspectiveMode, RenderWindow,
            RendererConfig, ShaderSource, SpriteRenderer, UvRect, VulkanError,
        },
        texture::{GraphicsContextEpoch, Texture, TextureError},
    };
}

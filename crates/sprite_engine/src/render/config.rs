//! Renderer configuration
//!
//! Applications describe the renderer they want here instead of the renderer
//! hardcoding it. Every type is serde-enabled so a config can live in a TOML
//! or RON file next to the game (see [`crate::config::Config`]).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigError};
use crate::render::perspective::{PerspectiveMode, PerspectiveWarp};

/// How sprite draws become draw calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BatchMode {
    /// One draw call per sprite
    #[default]
    Immediate,
    /// Consecutive sprites with the same texture and constants share a draw call
    Coalesced,
}

/// Where the compiled sprite shaders live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create a shader config, looking for each file in the usual places
    ///
    /// Useful for binaries that may be started from the workspace root or a
    /// crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        Self {
            vertex_shader_path: Self::resolve_shader_path(base_vertex),
            fragment_shader_path: Self::resolve_shader_path(base_fragment),
        }
    }

    fn resolve_shader_path(base_path: &str) -> String {
        if Path::new(base_path).exists() {
            return base_path.to_string();
        }

        let Some(file_name) = Path::new(base_path).file_name().and_then(|f| f.to_str()) else {
            return base_path.to_string();
        };

        ["target/shaders", "../target/shaders", "../../target/shaders"]
            .iter()
            .map(|dir| format!("{dir}/{file_name}"))
            .find(|candidate| Path::new(candidate).exists())
            .unwrap_or_else(|| base_path.to_string())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("target/shaders/sprite_vert.spv", "target/shaders/sprite_frag.spv")
    }
}

/// Initial perspective warp parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    /// Warp mode at startup
    pub mode: PerspectiveMode,
    /// Globe sphere radius in pixels
    pub sphere_radius: f32,
    /// Horizon line for the vanishing-point warp
    pub horizon_y: f32,
    /// Scale at the horizon line
    pub horizon_scale: f32,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        let warp = PerspectiveWarp::default();
        Self {
            mode: warp.mode,
            sphere_radius: warp.sphere_radius,
            horizon_y: warp.horizon_y,
            horizon_scale: warp.horizon_scale,
        }
    }
}

impl PerspectiveConfig {
    /// Warp described by this config, with view geometry left at defaults
    pub fn to_warp(&self) -> PerspectiveWarp {
        PerspectiveWarp {
            mode: self.mode,
            sphere_radius: self.sphere_radius,
            horizon_y: self.horizon_y,
            horizon_scale: self.horizon_scale,
            ..PerspectiveWarp::default()
        }
    }
}

/// Configuration for the sprite renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Application version (major, minor, patch)
    pub application_version: (u32, u32, u32),
    /// Whether to enable Vulkan validation layers; `None` follows the build
    pub enable_validation: Option<bool>,
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Sprites one frame's vertex buffer can hold
    pub max_sprites_per_frame: usize,
    /// Descriptor sets the pool can hand out over the renderer's lifetime
    pub descriptor_pool_capacity: u32,
    /// Background clear color [R, G, B, A] (0.0-1.0 range)
    pub clear_color: [f32; 4],
    /// Prefer mailbox/immediate presentation over vsync
    pub prefer_low_latency: bool,
    /// Sprite batching mode
    pub batch_mode: BatchMode,
    /// Perspective warp at startup
    pub perspective: PerspectiveConfig,
    /// Pixel size glyphs are rasterized at
    pub font_pixel_size: f32,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            application_version: (1, 0, 0),
            enable_validation: None,
            shaders: ShaderConfig::default(),
            max_sprites_per_frame: 10_000,
            descriptor_pool_capacity: 1000,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            prefer_low_latency: true,
            batch_mode: BatchMode::Immediate,
            perspective: PerspectiveConfig::default(),
            font_pixel_size: 16.0,
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.application_version = (major, minor, patch);
        self
    }

    /// Set shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set custom shader paths
    pub fn with_shader_paths(mut self, vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        self.shaders = ShaderConfig::new(vertex_path, fragment_path);
        self
    }

    /// Enable or disable Vulkan validation layers
    pub fn with_validation(mut self, enable: bool) -> Self {
        self.enable_validation = Some(enable);
        self
    }

    /// Set the per-frame sprite capacity
    pub fn with_max_sprites(mut self, max_sprites: usize) -> Self {
        self.max_sprites_per_frame = max_sprites;
        self
    }

    /// Set the descriptor pool capacity
    pub fn with_descriptor_pool_capacity(mut self, capacity: u32) -> Self {
        self.descriptor_pool_capacity = capacity;
        self
    }

    /// Set background clear color [R, G, B, A] (0.0-1.0 range)
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Prefer a low-latency present mode
    pub fn with_low_latency(mut self, prefer: bool) -> Self {
        self.prefer_low_latency = prefer;
        self
    }

    /// Set the batching mode
    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    /// Set the startup perspective parameters
    pub fn with_perspective(mut self, perspective: PerspectiveConfig) -> Self {
        self.perspective = perspective;
        self
    }

    /// Set the glyph pixel size
    pub fn with_font_pixel_size(mut self, size: f32) -> Self {
        self.font_pixel_size = size;
        self
    }

    /// `application_version` packed the way `VkApplicationInfo` expects
    pub fn packed_version(&self) -> u32 {
        let (major, minor, patch) = self.application_version;
        ash::vk::make_api_version(0, major, minor, patch)
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Check values a renderer cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let vertices = self.max_sprites_per_frame.checked_mul(6).filter(|&v| v > 0);
        if vertices.map_or(true, |v| u32::try_from(v).is_err()) {
            return Err(ConfigError::Invalid(format!(
                "max_sprites_per_frame must be between 1 and {}, got {}",
                u32::MAX / 6,
                self.max_sprites_per_frame
            )));
        }
        if self.descriptor_pool_capacity == 0 {
            return Err(ConfigError::Invalid("descriptor_pool_capacity must be positive".to_string()));
        }
        if !(self.font_pixel_size.is_finite() && self.font_pixel_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "font_pixel_size must be positive, got {}",
                self.font_pixel_size
            )));
        }
        if !(self.perspective.sphere_radius.is_finite() && self.perspective.sphere_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "perspective.sphere_radius must be positive, got {}",
                self.perspective.sphere_radius
            )));
        }
        if !self.perspective.horizon_scale.is_finite() || self.perspective.horizon_scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "perspective.horizon_scale must be non-negative, got {}",
                self.perspective.horizon_scale
            )));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::Invalid("clear_color must be finite".to_string()));
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Sprite Engine Application")
    }
}

impl Config for RendererConfig {}

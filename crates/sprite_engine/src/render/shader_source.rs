//! Shader bytecode lookup
//!
//! The renderer asks for SPIR-V by logical name and treats a missing blob as a
//! fatal init error. No fallback shader exists.

use std::path::PathBuf;

use crate::render::config::ShaderConfig;

/// Logical name of the sprite vertex stage
pub const SPRITE_VERTEX: &str = "sprite vertex";
/// Logical name of the sprite fragment stage
pub const SPRITE_FRAGMENT: &str = "sprite fragment";

/// Supplies compiled shader bytecode by logical name
pub trait ShaderSource {
    /// SPIR-V bytes for `name`, or `None` if unavailable
    fn load(&self, name: &str) -> Option<Vec<u8>>;
}

/// Reads the sprite shaders from the paths in a [`ShaderConfig`]
#[derive(Debug, Clone)]
pub struct FileShaderSource {
    vertex: PathBuf,
    fragment: PathBuf,
}

impl FileShaderSource {
    /// Use the paths from `config`
    pub fn new(config: &ShaderConfig) -> Self {
        Self {
            vertex: PathBuf::from(&config.vertex_shader_path),
            fragment: PathBuf::from(&config.fragment_shader_path),
        }
    }
}

impl ShaderSource for FileShaderSource {
    fn load(&self, name: &str) -> Option<Vec<u8>> {
        let path = match name {
            SPRITE_VERTEX => &self.vertex,
            SPRITE_FRAGMENT => &self.fragment,
            _ => {
                log::warn!("Unknown shader '{name}' requested");
                return None;
            }
        };

        match std::fs::read(path) {
            Ok(bytes) => {
                log::debug!("Loaded shader '{name}' from {} ({} bytes)", path.display(), bytes.len());
                Some(bytes)
            }
            Err(e) => {
                log::error!("Failed to read shader '{name}' from {}: {e}", path.display());
                None
            }
        }
    }
}

/// In-memory shader table
impl ShaderSource for std::collections::HashMap<String, Vec<u8>> {
    fn load(&self, name: &str) -> Option<Vec<u8>> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_source_maps_logical_names() {
        let dir = tempfile::tempdir().unwrap();
        let vert = dir.path().join("v.spv");
        let frag = dir.path().join("f.spv");
        std::fs::write(&vert, [3u8, 2, 35, 7]).unwrap();
        std::fs::write(&frag, [1u8, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let source = FileShaderSource::new(&ShaderConfig::new(
            vert.to_string_lossy(),
            frag.to_string_lossy(),
        ));
        assert_eq!(source.load(SPRITE_VERTEX), Some(vec![3, 2, 35, 7]));
        assert_eq!(source.load(SPRITE_FRAGMENT).map(|b| b.len()), Some(8));
        assert_eq!(source.load("bloom"), None);
    }

    #[test]
    fn test_missing_file_is_none() {
        let source = FileShaderSource::new(&ShaderConfig::new("/nope/v.spv", "/nope/f.spv"));
        assert!(source.load(SPRITE_VERTEX).is_none());
    }
}

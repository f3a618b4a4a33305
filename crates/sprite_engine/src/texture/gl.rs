//! OpenGL side of a texture

use std::fmt;
use std::rc::Rc;

use super::epoch::GraphicsContextEpoch;

/// The OpenGL calls a texture needs.
///
/// Implemented over `glow` by [`super::GlowTextureApi`]; tests use a fake.
pub trait GlTextureApi {
    /// Whether an OpenGL context is current on this thread
    fn is_context_current(&self) -> bool;

    /// Create a 2D texture from tightly packed 8-bit pixels and return its name
    fn create_texture(&self, pixels: &[u8], width: u32, height: u32, channels: u8) -> Result<u32, String>;

    /// Delete a texture name
    fn delete_texture(&self, name: u32);

    /// Activate sampler `slot` and bind `name` to it
    fn bind_texture(&self, slot: u32, name: u32);

    /// Unbind the 2D texture from the active sampler slot
    fn unbind_texture(&self);
}

/// An OpenGL API plus the epoch that tracks its context.
#[derive(Clone)]
pub struct GlContextHandle {
    /// API used for all texture calls
    pub api: Rc<dyn GlTextureApi>,
    /// Generation counter shared by every texture of this application
    pub epoch: GraphicsContextEpoch,
}

impl GlContextHandle {
    /// Bundle an API with an epoch
    pub fn new(api: Rc<dyn GlTextureApi>, epoch: GraphicsContextEpoch) -> Self {
        Self { api, epoch }
    }

    /// True when calls through this handle reach a live context
    pub fn is_current(&self) -> bool {
        self.api.is_context_current()
    }
}

impl fmt::Debug for GlContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlContextHandle")
            .field("current", &self.is_current())
            .field("generation", &self.epoch.current())
            .finish()
    }
}

/// A live OpenGL texture name tagged with the generation it was created in.
#[derive(Debug)]
pub(super) struct GlBinding {
    pub name: u32,
    pub generation: u32,
    pub context: GlContextHandle,
}

impl GlBinding {
    /// Delete the name if it still belongs to the live context.
    pub fn release(self) {
        if !self.context.is_current() {
            log::debug!("No current OpenGL context, leaving texture {} alone", self.name);
            return;
        }
        let current = self.context.epoch.current();
        if self.generation == current {
            self.context.api.delete_texture(self.name);
        } else {
            log::debug!(
                "Skipping delete of stale OpenGL texture {} (generation {} != {})",
                self.name,
                self.generation,
                current
            );
        }
    }
}

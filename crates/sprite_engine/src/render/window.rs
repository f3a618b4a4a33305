//! Windowing collaborator
//!
//! The renderer never talks to a windowing library directly. It needs a
//! framebuffer size, a way to block on platform events while minimized, the
//! instance extensions the platform wants, and a surface.

use ash::{vk, Entry, Instance};
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// Windowing library failed to start
    #[error("Window system initialization failed")]
    InitializationFailed,

    /// Window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other platform failure
    #[error("Window system error: {0}")]
    Platform(String),
}

/// Result alias for windowing calls
pub type WindowResult<T> = Result<T, WindowError>;

/// What the renderer needs from a window
pub trait RenderWindow {
    /// Current drawable size in pixels; zero while minimized
    fn framebuffer_size(&self) -> (u32, u32);

    /// Block until at least one platform event arrives
    fn wait_events(&mut self);

    /// Instance extensions needed to present to this window
    fn required_instance_extensions(&self) -> WindowResult<Vec<String>>;

    /// Create a presentation surface on `instance`
    fn create_surface(&mut self, entry: &Entry, instance: &Instance) -> WindowResult<vk::SurfaceKHR>;
}

/// Block on window events until the framebuffer has a non-zero area.
pub fn wait_for_nonzero_extent(window: &mut dyn RenderWindow) -> (u32, u32) {
    let mut size = window.framebuffer_size();
    if size.0 == 0 || size.1 == 0 {
        log::debug!("Framebuffer is {}x{}, waiting for the window to be restored", size.0, size.1);
    }
    while size.0 == 0 || size.1 == 0 {
        window.wait_events();
        size = window.framebuffer_size();
    }
    size
}

//! [`GlTextureApi`] implemented with `glow`

use std::cell::Cell;
use std::num::NonZeroU32;
use std::rc::Rc;

use glow::HasContext;

use super::gl::GlTextureApi;

/// OpenGL texture calls over a `glow` context.
///
/// `glow` cannot tell whether its context is current, so the windowing layer
/// reports it through [`GlowTextureApi::set_context_current`].
pub struct GlowTextureApi {
    gl: Rc<glow::Context>,
    current: Cell<bool>,
}

impl GlowTextureApi {
    /// Wrap a context that is current on the calling thread
    pub fn new(gl: Rc<glow::Context>) -> Self {
        Self {
            gl,
            current: Cell::new(true),
        }
    }

    /// Record whether the wrapped context is current
    pub fn set_context_current(&self, current: bool) {
        self.current.set(current);
    }

    /// Underlying context
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }
}

fn pixel_format(channels: u8) -> Option<u32> {
    match channels {
        1 => Some(glow::RED),
        2 => Some(glow::RG),
        3 => Some(glow::RGB),
        4 => Some(glow::RGBA),
        _ => None,
    }
}

fn native(name: u32) -> Option<glow::NativeTexture> {
    NonZeroU32::new(name).map(glow::NativeTexture)
}

impl GlTextureApi for GlowTextureApi {
    fn is_context_current(&self) -> bool {
        self.current.get()
    }

    fn create_texture(&self, pixels: &[u8], width: u32, height: u32, channels: u8) -> Result<u32, String> {
        let format = pixel_format(channels).ok_or_else(|| format!("unsupported channel count {channels}"))?;
        let gl = &self.gl;
        unsafe {
            let texture = gl.create_texture()?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::CLAMP_TO_EDGE as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                format as i32,
                width as i32,
                height as i32,
                0,
                format,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);

            let error = gl.get_error();
            if error != glow::NO_ERROR {
                gl.delete_texture(texture);
                return Err(format!("glTexImage2D failed with 0x{error:x}"));
            }
            Ok(texture.0.get())
        }
    }

    fn delete_texture(&self, name: u32) {
        if let Some(texture) = native(name) {
            unsafe { self.gl.delete_texture(texture) };
        }
    }

    fn bind_texture(&self, slot: u32, name: u32) {
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + slot);
            self.gl.bind_texture(glow::TEXTURE_2D, native(name));
        }
    }

    fn unbind_texture(&self) {
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, None) };
    }
}

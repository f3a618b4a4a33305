//! CPU-side textures with lazily created GPU resources
//!
//! A [`Texture`] always keeps its decoded pixels in memory. GPU resources are
//! derived from them on demand:
//!
//! - **OpenGL**: created eagerly at load time when a context is current,
//!   otherwise deferred to [`Texture::recreate_opengl_texture`]. Handles are
//!   tagged with a [`GraphicsContextEpoch`] generation so a handle from a torn
//!   down context is never deleted through a newer one.
//! - **Vulkan**: never created at load time. [`Texture::create_vulkan_texture`]
//!   uploads through an [`ImageUploader`], usually on first draw.
//!
//! Each backend slot holds at most one live resource set, owned exclusively by
//! the texture. Textures are move-only; [`Texture::take`] moves the contents out
//! and leaves an empty texture behind.

mod epoch;
mod gl;
mod glow_api;
mod vulkan;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use image::DynamicImage;
use thiserror::Error;

use crate::render::backends::vulkan::VulkanError;

pub use epoch::{GraphicsContextEpoch, UNASSIGNED_GENERATION};
pub use gl::{GlContextHandle, GlTextureApi};
pub use glow_api::GlowTextureApi;
pub use vulkan::{component_mapping_for_format, vulkan_format_for_channels, ImageResources, ImageUploader};

use gl::GlBinding;
use vulkan::VulkanBinding;

/// Texture errors
#[derive(Debug, Error)]
pub enum TextureError {
    /// Width, height or channel count was zero, or the data slice was empty
    #[error("Invalid texture parameters: {width}x{height}, {channels} channels, {len} bytes")]
    InvalidParameters {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Requested channel count
        channels: u8,
        /// Length of the supplied data
        len: usize,
    },

    /// Data slice is shorter than width * height * channels
    #[error("Pixel data too short: expected {expected} bytes, got {actual}")]
    DataTooShort {
        /// Bytes required
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// Image file could not be decoded
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// File that failed
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Operation needs CPU pixels but the texture is empty
    #[error("Texture has no pixel data")]
    NoPixelData,

    /// No OpenGL context is current
    #[error("No current OpenGL context")]
    NoContext,

    /// No GPU format for this channel count
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    /// OpenGL texture creation failed
    #[error("OpenGL texture creation failed: {0}")]
    OpenGl(String),

    /// Vulkan upload failed
    #[error("Vulkan texture upload failed: {0}")]
    Upload(#[from] VulkanError),
}

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a texture, issued when the texture is created.
///
/// Caches key on this rather than on pixel content, so two textures with
/// identical pixels stay distinct. Moving a texture keeps its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Tightly packed 8-bit pixels, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl PixelBuffer {
    /// Validate and copy raw pixels, optionally reversing the row order.
    pub fn from_raw(data: &[u8], width: u32, height: u32, channels: u8, flip_y: bool) -> Result<Self, TextureError> {
        if width == 0 || height == 0 || channels == 0 || data.is_empty() {
            return Err(TextureError::InvalidParameters {
                width,
                height,
                channels,
                len: data.len(),
            });
        }

        let expected = width as usize * height as usize * channels as usize;
        if data.len() < expected {
            return Err(TextureError::DataTooShort {
                expected,
                actual: data.len(),
            });
        }

        let mut buffer = Self {
            data: data[..expected].to_vec(),
            width,
            height,
            channels,
        };
        if flip_y {
            buffer.flip_rows();
        }
        Ok(buffer)
    }

    /// Take ownership of a decoded image, keeping 1, 3 or 4 channel layouts
    /// and expanding anything else to RGBA8.
    pub fn from_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (data, channels) = match image {
            DynamicImage::ImageLuma8(buf) => (buf.into_raw(), 1),
            DynamicImage::ImageRgb8(buf) => (buf.into_raw(), 3),
            DynamicImage::ImageRgba8(buf) => (buf.into_raw(), 4),
            other => (other.to_rgba8().into_raw(), 4),
        };
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Reverse the row order in place
    pub fn flip_rows(&mut self) {
        let row = self.row_len();
        if row == 0 {
            return;
        }
        let rows = self.height as usize;
        for top in 0..rows / 2 {
            let bottom = rows - 1 - top;
            let (head, tail) = self.data.split_at_mut(bottom * row);
            head[top * row..(top + 1) * row].swap_with_slice(&mut tail[..row]);
        }
    }

    /// Bytes per row
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Raw bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Components per pixel
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// True when no pixels are held
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A texture: CPU pixels plus at most one OpenGL and one Vulkan resource.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    pixels: PixelBuffer,
    gl: Option<GlBinding>,
    vulkan: Option<VulkanBinding>,
}

impl Texture {
    /// Create an empty texture with a fresh identity
    pub fn new() -> Self {
        Self {
            id: TextureId::next(),
            pixels: PixelBuffer::default(),
            gl: None,
            vulkan: None,
        }
    }

    /// Create a texture from raw pixels; see [`Texture::load_from_data`]
    pub fn from_data(
        data: &[u8],
        width: u32,
        height: u32,
        channels: u8,
        flip_y: bool,
        gl: Option<&GlContextHandle>,
    ) -> Result<Self, TextureError> {
        let mut texture = Self::new();
        texture.load_from_data(data, width, height, channels, flip_y, gl)?;
        Ok(texture)
    }

    /// Decode an image file, flipped so row 0 is the bottom row.
    ///
    /// Creates the OpenGL texture right away when `gl` is current; Vulkan
    /// resources are always left for later.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>, gl: Option<&GlContextHandle>) -> Result<(), TextureError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            let err = TextureError::Decode {
                path: path.display().to_string(),
                reason: e.to_string(),
            };
            log::error!("{err}");
            err
        })?;

        self.replace_pixels(PixelBuffer::from_image(image.flipv()), gl);
        log::debug!(
            "Loaded texture {:?} from {} ({}x{}, {} channels)",
            self.id,
            path.display(),
            self.width(),
            self.height(),
            self.channels()
        );
        Ok(())
    }

    /// Store externally produced pixels.
    ///
    /// On failure the texture is left as it was.
    pub fn load_from_data(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        channels: u8,
        flip_y: bool,
        gl: Option<&GlContextHandle>,
    ) -> Result<(), TextureError> {
        let pixels = PixelBuffer::from_raw(data, width, height, channels, flip_y).map_err(|e| {
            log::error!("Texture load rejected: {e}");
            e
        })?;
        self.replace_pixels(pixels, gl);
        Ok(())
    }

    fn replace_pixels(&mut self, pixels: PixelBuffer, gl: Option<&GlContextHandle>) {
        self.release_gl();
        self.destroy_vulkan_texture();
        self.pixels = pixels;

        if let Some(gl) = gl.filter(|gl| gl.is_current()) {
            if let Err(e) = self.create_gl(gl) {
                log::warn!("Deferring OpenGL upload of texture {:?}: {e}", self.id);
            }
        }
    }

    fn create_gl(&mut self, gl: &GlContextHandle) -> Result<(), TextureError> {
        let name = gl
            .api
            .create_texture(self.pixels.data(), self.width(), self.height(), self.channels())
            .map_err(TextureError::OpenGl)?;
        self.gl = Some(GlBinding {
            name,
            generation: gl.epoch.current(),
            context: gl.clone(),
        });
        Ok(())
    }

    fn release_gl(&mut self) {
        if let Some(binding) = self.gl.take() {
            binding.release();
        }
    }

    /// Bind the OpenGL texture to sampler `slot`
    pub fn bind(&self, slot: u32) {
        if let Some(binding) = &self.gl {
            binding.context.api.bind_texture(slot, binding.name);
        }
    }

    /// Unbind the 2D texture from the active sampler slot
    pub fn unbind(&self) {
        if let Some(binding) = &self.gl {
            binding.context.api.unbind_texture();
        }
    }

    /// Rebuild the OpenGL texture from the retained pixels.
    ///
    /// Needed after a context switch. The previous handle is deleted only if it
    /// was created in the current epoch generation.
    pub fn recreate_opengl_texture(&mut self, gl: &GlContextHandle) -> Result<(), TextureError> {
        if self.pixels.is_empty() {
            log::warn!("Cannot recreate OpenGL texture {:?}: no pixel data", self.id);
            return Err(TextureError::NoPixelData);
        }
        if !gl.is_current() {
            log::warn!("Cannot recreate OpenGL texture {:?}: no current context", self.id);
            return Err(TextureError::NoContext);
        }

        self.release_gl();
        self.create_gl(gl).map_err(|e| {
            log::error!("{e}");
            e
        })
    }

    /// Upload the pixels to a new Vulkan image.
    ///
    /// Any previous Vulkan resources of this texture are destroyed first.
    /// Blocks until the upload has completed on the GPU.
    pub fn create_vulkan_texture(&mut self, uploader: &Rc<dyn ImageUploader>) -> Result<(), TextureError> {
        if self.pixels.is_empty() {
            return Err(TextureError::NoPixelData);
        }
        let format =
            vulkan_format_for_channels(self.channels()).ok_or(TextureError::UnsupportedChannels(self.channels()))?;

        self.destroy_vulkan_texture();
        let resources = uploader.upload(self.pixels.data(), self.width(), self.height(), format)?;
        self.vulkan = Some(VulkanBinding::new(resources, Rc::clone(uploader)));
        Ok(())
    }

    /// Destroy the Vulkan resources, keeping the CPU pixels. Safe to repeat.
    pub fn destroy_vulkan_texture(&mut self) {
        if let Some(binding) = self.vulkan.take() {
            binding.release();
        }
    }

    /// Move the contents out, leaving this texture empty with a new identity.
    #[must_use]
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Identity used as a cache key
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// CPU pixels
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Width in pixels, 0 when empty
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels, 0 when empty
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Components per pixel, 0 when empty
    pub fn channels(&self) -> u8 {
        self.pixels.channels()
    }

    /// OpenGL texture name, if one is live
    pub fn gl_name(&self) -> Option<u32> {
        self.gl.as_ref().map(|b| b.name)
    }

    /// Generation the OpenGL name was created in, or [`UNASSIGNED_GENERATION`]
    pub fn gl_generation(&self) -> u32 {
        self.gl.as_ref().map_or(UNASSIGNED_GENERATION, |b| b.generation)
    }

    /// Vulkan resources, if uploaded
    pub fn vulkan_resources(&self) -> Option<&ImageResources> {
        self.vulkan.as_ref().map(|b| &b.resources)
    }

    /// Vulkan image view, if uploaded
    pub fn image_view(&self) -> Option<vk::ImageView> {
        self.vulkan_resources().map(|r| r.view)
    }
}

impl Default for Texture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.release_gl();
        self.destroy_vulkan_texture();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeGl, StubUploader};
    use super::*;

    fn gl_handle(gl: &Rc<FakeGl>, epoch: &GraphicsContextEpoch) -> GlContextHandle {
        GlContextHandle::new(Rc::clone(gl) as Rc<dyn GlTextureApi>, epoch.clone())
    }

    fn reference_flip(data: &[u8], row: usize) -> Vec<u8> {
        data.chunks(row).rev().flatten().copied().collect()
    }

    #[test]
    fn test_load_from_data_round_trips_bytes() {
        for channels in [1u8, 3, 4] {
            for (w, h) in [(1u32, 1u32), (3, 2), (4, 5)] {
                let data: Vec<u8> = (0..w * h * u32::from(channels)).map(|i| (i * 7 % 251) as u8).collect();
                let row = (w * u32::from(channels)) as usize;

                let plain = Texture::from_data(&data, w, h, channels, false, None).unwrap();
                assert_eq!(plain.pixels().data(), &data[..]);

                let flipped = Texture::from_data(&data, w, h, channels, true, None).unwrap();
                assert_eq!(flipped.pixels().data(), &reference_flip(&data, row)[..]);
            }
        }
    }

    #[test]
    fn test_load_from_data_rejects_invalid_parameters() {
        let data = [255u8; 16];
        let cases: [(&[u8], u32, u32, u8); 4] = [(&data, 0, 2, 4), (&data, 2, 0, 4), (&data, 2, 2, 0), (&[], 2, 2, 4)];

        for (bytes, w, h, c) in cases {
            let mut texture = Texture::new();
            assert!(texture.load_from_data(bytes, w, h, c, false, None).is_err());
            assert_eq!(texture.width(), 0);
            assert_eq!(texture.height(), 0);
            assert!(texture.pixels().is_empty());
        }
    }

    #[test]
    fn test_load_from_data_rejects_short_buffer() {
        let err = Texture::from_data(&[0u8; 7], 2, 2, 2, false, None).unwrap_err();
        assert!(matches!(err, TextureError::DataTooShort { expected: 8, actual: 7 }));
    }

    #[test]
    fn test_load_creates_gl_texture_only_with_current_context() {
        let gl = Rc::new(FakeGl::default());
        let epoch = GraphicsContextEpoch::new();
        let handle = gl_handle(&gl, &epoch);

        let deferred = Texture::from_data(&[1, 2, 3, 4], 1, 1, 4, false, Some(&handle)).unwrap();
        assert_eq!(deferred.gl_name(), None);

        gl.current.set(true);
        let eager = Texture::from_data(&[1, 2, 3, 4], 1, 1, 4, false, Some(&handle)).unwrap();
        assert_eq!(eager.gl_name(), Some(1));
        assert_eq!(eager.gl_generation(), 1);
        assert!(eager.vulkan_resources().is_none());
    }

    #[test]
    fn test_take_transfers_ownership() {
        let gl = Rc::new(FakeGl::current());
        let epoch = GraphicsContextEpoch::new();
        let uploader: Rc<dyn ImageUploader> = Rc::new(StubUploader::new());

        let mut source = Texture::from_data(&[9u8; 16], 2, 2, 4, false, Some(&gl_handle(&gl, &epoch))).unwrap();
        source.create_vulkan_texture(&uploader).unwrap();
        let id = source.id();
        let name = source.gl_name();
        let resources = *source.vulkan_resources().unwrap();

        let moved = source.take();
        assert_eq!(moved.id(), id);
        assert_eq!(moved.gl_name(), name);
        assert_eq!(moved.vulkan_resources(), Some(&resources));

        assert_eq!(source.gl_name(), None);
        assert!(source.vulkan_resources().is_none());
        assert_eq!((source.width(), source.height(), source.channels()), (0, 0, 0));
        assert_ne!(source.id(), id);

        drop(source);
        assert!(gl.deleted.borrow().is_empty());
        drop(moved);
        assert_eq!(*gl.deleted.borrow(), vec![1]);
    }

    #[test]
    fn test_rust_move_keeps_single_owner() {
        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();
        texture.create_vulkan_texture(&uploader).unwrap();

        let holder = vec![texture];
        drop(holder);
        assert_eq!(stub.destroyed.borrow().len(), 1);
    }

    #[test]
    fn test_stale_generation_is_not_deleted() {
        let gl = Rc::new(FakeGl::current());
        let epoch = GraphicsContextEpoch::new();
        let handle = gl_handle(&gl, &epoch);

        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, Some(&handle)).unwrap();
        assert_eq!(texture.gl_name(), Some(1));

        epoch.advance();
        texture.recreate_opengl_texture(&handle).unwrap();
        assert!(gl.deleted.borrow().is_empty(), "stale handle must not be deleted");
        assert_eq!(texture.gl_name(), Some(2));
        assert_eq!(texture.gl_generation(), 2);

        texture.recreate_opengl_texture(&handle).unwrap();
        assert_eq!(*gl.deleted.borrow(), vec![2]);

        epoch.advance();
        drop(texture);
        assert_eq!(*gl.deleted.borrow(), vec![2], "drop must skip stale handle");
    }

    #[test]
    fn test_drop_without_current_context_skips_delete() {
        let gl = Rc::new(FakeGl::current());
        let epoch = GraphicsContextEpoch::new();
        let texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, Some(&gl_handle(&gl, &epoch))).unwrap();

        gl.current.set(false);
        drop(texture);
        assert!(gl.deleted.borrow().is_empty());
    }

    #[test]
    fn test_recreate_requires_pixels_and_context() {
        let gl = Rc::new(FakeGl::default());
        let epoch = GraphicsContextEpoch::new();
        let handle = gl_handle(&gl, &epoch);

        let mut empty = Texture::new();
        assert!(matches!(empty.recreate_opengl_texture(&handle), Err(TextureError::NoPixelData)));

        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();
        assert!(matches!(texture.recreate_opengl_texture(&handle), Err(TextureError::NoContext)));
    }

    #[test]
    fn test_bind_and_unbind_use_stored_name() {
        let gl = Rc::new(FakeGl::current());
        let epoch = GraphicsContextEpoch::new();
        let texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, Some(&gl_handle(&gl, &epoch))).unwrap();

        texture.bind(3);
        texture.unbind();
        assert_eq!(*gl.bound.borrow(), vec![(3, 1)]);
        assert_eq!(gl.unbinds.get(), 1);
    }

    #[test]
    fn test_checkerboard_upload_and_double_destroy() {
        let white = [255u8, 255, 255, 255];
        let black = [0u8, 0, 0, 255];
        let data: Vec<u8> = [white, black, black, white].concat();

        let mut texture = Texture::from_data(&data, 2, 2, 4, true, None).unwrap();
        assert_eq!(&texture.pixels().data()[..8], &data[8..]);
        assert_eq!(&texture.pixels().data()[8..], &data[..8]);

        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        texture.create_vulkan_texture(&uploader).unwrap();

        let resources = *texture.vulkan_resources().unwrap();
        assert!(resources.is_complete());
        assert_eq!(resources.format, vk::Format::R8G8B8A8_UNORM);

        texture.destroy_vulkan_texture();
        texture.destroy_vulkan_texture();
        assert_eq!(*stub.destroyed.borrow(), vec![resources]);
        assert_eq!(texture.pixels().data().len(), 16);
    }

    #[test]
    fn test_vulkan_format_follows_channel_count() {
        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();

        let mut rgb = Texture::from_data(&[0u8; 3], 1, 1, 3, false, None).unwrap();
        rgb.create_vulkan_texture(&uploader).unwrap();
        let mut gray = Texture::from_data(&[0u8; 1], 1, 1, 1, false, None).unwrap();
        gray.create_vulkan_texture(&uploader).unwrap();

        let formats: Vec<_> = stub.uploads.borrow().iter().map(|u| u.2).collect();
        assert_eq!(formats, vec![vk::Format::R8G8B8_UNORM, vk::Format::R8_UNORM]);
    }

    #[test]
    fn test_recreating_vulkan_texture_releases_previous() {
        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();

        texture.create_vulkan_texture(&uploader).unwrap();
        let first = *texture.vulkan_resources().unwrap();
        texture.create_vulkan_texture(&uploader).unwrap();
        assert_eq!(*stub.destroyed.borrow(), vec![first]);
    }

    #[test]
    fn test_failed_upload_leaves_no_resources() {
        let stub = Rc::new(StubUploader::new());
        stub.fail.set(true);
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();

        assert!(matches!(texture.create_vulkan_texture(&uploader), Err(TextureError::Upload(_))));
        assert!(texture.vulkan_resources().is_none());
    }

    #[test]
    fn test_dead_device_skips_destroy_on_drop() {
        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();
        texture.create_vulkan_texture(&uploader).unwrap();

        stub.alive.set(false);
        drop(texture);
        assert!(stub.destroyed.borrow().is_empty());
    }

    #[test]
    fn test_load_from_file_flips_and_keeps_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stripe.png");
        let mut img = image::RgbImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        img.put_pixel(0, 1, image::Rgb([0, 0, 255]));
        img.save(&path).unwrap();

        let mut texture = Texture::new();
        texture.load_from_file(&path, None).unwrap();
        assert_eq!(texture.channels(), 3);
        assert_eq!(texture.pixels().data(), &[0, 0, 255, 255, 0, 0]);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let mut texture = Texture::new();
        let err = texture.load_from_file("/no/such/texture.png", None).unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
        assert_eq!(texture.width(), 0);
    }

    #[test]
    fn test_pixel_identical_textures_have_distinct_ids() {
        let a = Texture::from_data(&[1u8; 4], 1, 1, 4, false, None).unwrap();
        let b = Texture::from_data(&[1u8; 4], 1, 1, 4, false, None).unwrap();
        assert_eq!(a.pixels(), b.pixels());
        assert_ne!(a.id(), b.id());
    }
}

//! Texture identity to GPU resource cache
//!
//! Entries are keyed by [`TextureId`], never by pixel content. A texture with
//! no uploaded image resolves to the shared white placeholder.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ash::vk;

use crate::texture::{ImageResources, ImageUploader, Texture, TextureId};

/// The parts of a texture's Vulkan resources a draw needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachedTexture {
    /// View to sample
    pub image_view: vk::ImageView,
    /// Sampler created with the texture
    pub sampler: vk::Sampler,
}

impl From<&ImageResources> for CachedTexture {
    fn from(resources: &ImageResources) -> Self {
        Self {
            image_view: resources.view,
            sampler: resources.sampler,
        }
    }
}

/// Texture resource cache with a white fallback
pub struct TextureCache {
    entries: HashMap<TextureId, CachedTexture>,
    white: CachedTexture,
    failed_uploads: HashSet<TextureId>,
}

impl TextureCache {
    /// Create a cache that falls back to `white`
    pub fn new(white: CachedTexture) -> Self {
        Self {
            entries: HashMap::new(),
            white,
            failed_uploads: HashSet::new(),
        }
    }

    /// The placeholder used for textures without an image
    pub fn white(&self) -> CachedTexture {
        self.white
    }

    /// Cached resources for `id`, or the placeholder
    pub fn get(&self, id: TextureId) -> CachedTexture {
        self.entries.get(&id).copied().unwrap_or(self.white)
    }

    /// True if `id` has an entry
    pub fn contains(&self, id: TextureId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Record the texture's current Vulkan resources
    pub fn insert(&mut self, texture: &Texture) -> Option<CachedTexture> {
        let cached = CachedTexture::from(texture.vulkan_resources()?);
        self.entries.insert(texture.id(), cached);
        self.failed_uploads.remove(&texture.id());
        Some(cached)
    }

    /// Resources a draw with `texture` should sample.
    ///
    /// Uses the live image if there is one, otherwise uploads synchronously,
    /// otherwise returns the placeholder. Upload failures are logged once per
    /// texture.
    pub fn resolve(&mut self, texture: &mut Texture, uploader: &Rc<dyn ImageUploader>) -> CachedTexture {
        if let Some(cached) = self.insert(texture) {
            return cached;
        }

        match texture.create_vulkan_texture(uploader) {
            Ok(()) => self.insert(texture).unwrap_or(self.white),
            Err(e) => {
                if self.failed_uploads.insert(texture.id()) {
                    log::warn!("Texture {:?} drawn as white placeholder: {e}", texture.id());
                }
                self.entries.remove(&texture.id());
                self.white
            }
        }
    }

    /// Drop the entry for `id`
    pub fn forget(&mut self, id: TextureId) {
        self.entries.remove(&id);
        self.failed_uploads.remove(&id);
    }

    /// Drop entries whose image view fails `is_live`, returning how many went.
    ///
    /// Textures destroyed or dropped outside the cache leave entries behind;
    /// the renderer prunes them against the uploader's live views.
    pub fn retain_live(&mut self, is_live: impl Fn(vk::ImageView) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| is_live(cached.image_view));
        before - self.entries.len()
    }

    /// Number of cached textures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.failed_uploads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::testing::StubUploader;
    use ash::vk::Handle;

    fn white() -> CachedTexture {
        CachedTexture {
            image_view: vk::ImageView::from_raw(0xFFFF),
            sampler: vk::Sampler::from_raw(0xFFFE),
        }
    }

    #[test]
    fn test_unknown_texture_falls_back_to_white() {
        let cache = TextureCache::new(white());
        assert_eq!(cache.get(Texture::new().id()), white());
    }

    #[test]
    fn test_resolve_uploads_on_first_use_only() {
        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut cache = TextureCache::new(white());
        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();

        let first = cache.resolve(&mut texture, &uploader);
        let second = cache.resolve(&mut texture, &uploader);
        assert_eq!(first, second);
        assert_ne!(first, white());
        assert_eq!(stub.uploads.borrow().len(), 1);
        assert_eq!(cache.get(texture.id()), first);
    }

    #[test]
    fn test_failed_upload_resolves_to_white() {
        let stub = Rc::new(StubUploader::new());
        stub.fail.set(true);
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut cache = TextureCache::new(white());
        let mut texture = Texture::from_data(&[0u8; 4], 1, 1, 4, false, None).unwrap();

        assert_eq!(cache.resolve(&mut texture, &uploader), white());
        assert!(!cache.contains(texture.id()));
    }

    #[test]
    fn test_empty_texture_resolves_to_white() {
        let uploader: Rc<dyn ImageUploader> = Rc::new(StubUploader::new());
        let mut cache = TextureCache::new(white());
        assert_eq!(cache.resolve(&mut Texture::new(), &uploader), white());
    }

    #[test]
    fn test_identical_pixels_stay_distinct() {
        let uploader: Rc<dyn ImageUploader> = Rc::new(StubUploader::new());
        let mut cache = TextureCache::new(white());
        let mut a = Texture::from_data(&[5u8; 4], 1, 1, 4, false, None).unwrap();
        let mut b = Texture::from_data(&[5u8; 4], 1, 1, 4, false, None).unwrap();

        let ra = cache.resolve(&mut a, &uploader);
        let rb = cache.resolve(&mut b, &uploader);
        assert_ne!(ra, rb);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_entry_follows_reupload() {
        let uploader: Rc<dyn ImageUploader> = Rc::new(StubUploader::new());
        let mut cache = TextureCache::new(white());
        let mut texture = Texture::from_data(&[5u8; 4], 1, 1, 4, false, None).unwrap();

        let before = cache.resolve(&mut texture, &uploader);
        texture.create_vulkan_texture(&uploader).unwrap();
        let after = cache.resolve(&mut texture, &uploader);
        assert_ne!(before, after);
        assert_eq!(cache.len(), 1);

        cache.forget(texture.id());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_dropped_texture_entry_pruned() {
        let stub = Rc::new(StubUploader::new());
        let uploader: Rc<dyn ImageUploader> = stub.clone();
        let mut cache = TextureCache::new(white());
        let mut kept = Texture::from_data(&[1u8; 4], 1, 1, 4, false, None).unwrap();
        let mut gone = Texture::from_data(&[2u8; 4], 1, 1, 4, false, None).unwrap();

        let kept_view = cache.resolve(&mut kept, &uploader).image_view;
        let gone_id = gone.id();
        cache.resolve(&mut gone, &uploader);
        drop(gone);
        assert_eq!(cache.len(), 2);

        let destroyed = stub.destroyed.borrow().clone();
        let removed = cache.retain_live(|view| destroyed.iter().all(|r| r.view != view));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(gone_id));
        assert_eq!(cache.get(gone_id), white());
        assert_eq!(cache.get(kept.id()).image_view, kept_view);

        assert_eq!(cache.retain_live(|_| true), 0);
    }
}

//! Per-character glyph images
//!
//! One single-channel image per character in the ASCII range. Glyphs with no
//! pixels (space) point at the white placeholder view and own nothing. A glyph
//! whose upload failed keeps its metrics so text still advances past it, but
//! has no view and draws nothing.

use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;

use crate::render::text::{GlyphMetrics, GlyphSource, GLYPH_RANGE_END, GLYPH_RANGE_START};
use crate::texture::{ImageResources, ImageUploader};

/// A glyph ready to draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedGlyph {
    /// Placement metrics
    pub metrics: GlyphMetrics,
    /// View to sample, `None` when the upload failed
    pub image_view: Option<vk::ImageView>,
    /// Image owned by this glyph, `None` when aliasing the placeholder
    pub resources: Option<ImageResources>,
}

/// Uploaded glyphs for one font at one pixel size
pub struct GlyphCache {
    glyphs: HashMap<char, CachedGlyph>,
    line_height: f32,
    uploader: Rc<dyn ImageUploader>,
}

impl GlyphCache {
    /// Rasterize and upload every character in the glyph range.
    ///
    /// Characters the source cannot rasterize are left out. Characters whose
    /// upload fails are kept without a view.
    pub fn build(
        source: &dyn GlyphSource,
        pixel_size: f32,
        uploader: Rc<dyn ImageUploader>,
        white_view: vk::ImageView,
    ) -> Self {
        let mut glyphs = HashMap::new();
        let mut failed = 0usize;

        for ch in (GLYPH_RANGE_START..GLYPH_RANGE_END).map(char::from) {
            let Some(bitmap) = source.rasterize(ch, pixel_size) else {
                continue;
            };

            let metrics = bitmap.metrics;
            if metrics.is_empty() {
                glyphs.insert(
                    ch,
                    CachedGlyph {
                        metrics,
                        image_view: Some(white_view),
                        resources: None,
                    },
                );
                continue;
            }

            let resources = match uploader.upload(&bitmap.coverage, metrics.width, metrics.height, vk::Format::R8_UNORM) {
                Ok(resources) => Some(resources),
                Err(e) => {
                    failed += 1;
                    log::debug!("Glyph {ch:?} upload failed: {e}");
                    None
                }
            };
            glyphs.insert(
                ch,
                CachedGlyph {
                    metrics,
                    image_view: resources.map(|r| r.view),
                    resources,
                },
            );
        }

        if failed > 0 {
            log::warn!("{failed} glyphs could not be uploaded and will not render");
        }
        log::debug!("Glyph cache holds {} characters at {pixel_size}px", glyphs.len());

        Self {
            glyphs,
            line_height: source.line_height(pixel_size),
            uploader,
        }
    }

    /// Glyph for `ch`, if cached
    pub fn get(&self, ch: char) -> Option<&CachedGlyph> {
        self.glyphs.get(&ch)
    }

    /// Metrics for `ch`, if cached
    pub fn metrics(&self, ch: char) -> Option<GlyphMetrics> {
        self.glyphs.get(&ch).map(|g| g.metrics)
    }

    /// Distance between baselines
    pub fn line_height(&self) -> f32 {
        self.line_height
    }

    /// Number of cached characters
    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    /// True when nothing was cached
    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl Drop for GlyphCache {
    fn drop(&mut self) {
        for glyph in self.glyphs.values() {
            if let Some(resources) = glyph.resources {
                self.uploader.destroy(resources);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec2;
    use crate::render::text::layout_text;
    use crate::render::text::tests::BoxGlyphs;
    use crate::texture::testing::StubUploader;
    use ash::vk::Handle;

    fn white() -> vk::ImageView {
        vk::ImageView::from_raw(0xAAAA)
    }

    #[test]
    fn test_printable_ascii_uploaded_as_single_channel() {
        let stub = Rc::new(StubUploader::new());
        let cache = GlyphCache::build(&BoxGlyphs, 16.0, stub.clone(), white());

        // 95 printable characters, space among them
        assert_eq!(cache.len(), 95);
        assert_eq!(stub.uploads.borrow().len(), 94);
        assert!(stub
            .uploads
            .borrow()
            .iter()
            .all(|&(w, h, format)| (w, h, format) == (6, 8, vk::Format::R8_UNORM)));
        assert_eq!(cache.line_height(), 10.0);
        assert!(cache.get('\n').is_none());
    }

    #[test]
    fn test_space_aliases_white_view() {
        let stub = Rc::new(StubUploader::new());
        let cache = GlyphCache::build(&BoxGlyphs, 16.0, stub, white());

        let space = cache.get(' ').unwrap();
        assert_eq!(space.image_view, Some(white()));
        assert!(space.resources.is_none());
        assert_eq!(space.metrics.advance, 7.0);

        let a = cache.get('A').unwrap();
        assert_ne!(a.image_view, Some(white()));
        assert_eq!(a.resources.map(|r| r.view), a.image_view);
    }

    #[test]
    fn test_drop_destroys_only_owned_images() {
        let stub = Rc::new(StubUploader::new());
        drop(GlyphCache::build(&BoxGlyphs, 16.0, stub.clone(), white()));
        assert_eq!(stub.destroyed.borrow().len(), 94);
    }

    #[test]
    fn test_failed_upload_keeps_metrics_without_view() {
        let stub = Rc::new(StubUploader::new());
        stub.fail.set(true);
        let cache = GlyphCache::build(&BoxGlyphs, 16.0, stub.clone(), white());

        assert_eq!(cache.len(), 95);
        let a = cache.get('A').unwrap();
        assert!(a.image_view.is_none());
        assert!(a.resources.is_none());
        assert_eq!(cache.metrics('A').map(|m| m.advance), Some(7.0));

        drop(cache);
        assert!(stub.destroyed.borrow().is_empty());
    }

    #[test]
    fn test_text_advances_past_failed_glyphs() {
        let stub = Rc::new(StubUploader::new());
        stub.fail.set(true);
        let cache = GlyphCache::build(&BoxGlyphs, 16.0, stub, white());

        let placed = layout_text("A B", Vec2::new(0.0, 0.0), cache.line_height(), |c| cache.metrics(c));
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].ch, 'A');
        assert_eq!(placed[1].ch, 'B');
        // two advances of 7 plus the bearing
        assert_eq!(placed[1].position.x, 15.0);
        assert!(placed.iter().all(|p| cache.get(p.ch).and_then(|g| g.image_view).is_none()));
    }
}

//! Text rendering support
//!
//! Glyph bitmaps come from a [`GlyphSource`]; the renderer uploads one image
//! per character and draws each glyph as its own quad. Layout works in the
//! renderer's Y-up world space: the pen starts on the first baseline and a
//! newline moves it one line height down.

use std::path::{Path, PathBuf};

use crate::foundation::math::{Vec2, Vec4};

/// First character uploaded to the glyph cache
pub const GLYPH_RANGE_START: u8 = 0;
/// One past the last character uploaded to the glyph cache
pub const GLYPH_RANGE_END: u8 = 128;

/// Offsets of the four outline passes drawn under every glyph
pub const OUTLINE_OFFSETS: [(f32, f32); 4] = [(1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (0.0, -1.0)];

/// Errors raised while loading a font
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    /// The font file could not be read
    #[error("Failed to read font {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The font data could not be parsed
    #[error("Failed to parse font: {0}")]
    Parse(String),
}

/// Placement metrics of one glyph, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphMetrics {
    /// Bitmap width
    pub width: u32,
    /// Bitmap height
    pub height: u32,
    /// Offset from the pen to the bitmap's left edge
    pub bearing_x: f32,
    /// Offset from the baseline to the bitmap's bottom edge (Y up)
    pub bearing_y: f32,
    /// Horizontal pen advance
    pub advance: f32,
}

impl GlyphMetrics {
    /// True for glyphs with nothing to draw, such as space
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// An 8-bit coverage bitmap, top row first
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    /// Placement metrics
    pub metrics: GlyphMetrics,
    /// `width * height` coverage bytes
    pub coverage: Vec<u8>,
}

/// Produces glyph bitmaps at a given pixel size
pub trait GlyphSource {
    /// Rasterize `ch`, or `None` if the font has nothing for it
    fn rasterize(&self, ch: char, pixel_size: f32) -> Option<GlyphBitmap>;

    /// Distance between baselines
    fn line_height(&self, pixel_size: f32) -> f32;
}

/// [`GlyphSource`] backed by a `fontdue` font
pub struct FontdueGlyphSource {
    font: fontdue::Font,
}

impl FontdueGlyphSource {
    /// Parse a TrueType/OpenType font from memory
    pub fn from_bytes(data: &[u8]) -> Result<Self, FontError> {
        let font = fontdue::Font::from_bytes(data, fontdue::FontSettings::default())
            .map_err(|e| FontError::Parse(e.to_string()))?;
        Ok(Self { font })
    }

    /// Read and parse a font file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FontError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| FontError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let source = Self::from_bytes(&data)?;
        log::debug!("Loaded font {}", path.display());
        Ok(source)
    }
}

impl GlyphSource for FontdueGlyphSource {
    fn rasterize(&self, ch: char, pixel_size: f32) -> Option<GlyphBitmap> {
        if self.font.lookup_glyph_index(ch) == 0 && !ch.is_whitespace() {
            return None;
        }
        let (metrics, coverage) = self.font.rasterize(ch, pixel_size);
        Some(GlyphBitmap {
            metrics: GlyphMetrics {
                width: metrics.width as u32,
                height: metrics.height as u32,
                bearing_x: metrics.xmin as f32,
                bearing_y: metrics.ymin as f32,
                advance: metrics.advance_width,
            },
            coverage,
        })
    }

    fn line_height(&self, pixel_size: f32) -> f32 {
        self.font
            .horizontal_line_metrics(pixel_size)
            .map_or(pixel_size * 1.2, |m| m.new_line_size)
    }
}

/// Where one glyph's quad goes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphPlacement {
    /// Character drawn
    pub ch: char,
    /// Bottom-left corner of the quad
    pub position: Vec2,
    /// Quad size in pixels
    pub size: Vec2,
}

/// Walk `text` with a pen starting at `origin` (the first baseline).
///
/// Characters `metrics` does not know are skipped without moving the pen.
/// Empty glyphs advance the pen but produce no placement.
pub fn layout_text(
    text: &str,
    origin: Vec2,
    line_height: f32,
    metrics: impl Fn(char) -> Option<GlyphMetrics>,
) -> Vec<GlyphPlacement> {
    let mut placements = Vec::with_capacity(text.len());
    let mut pen = origin;

    for ch in text.chars() {
        if ch == '\n' {
            pen.x = origin.x;
            pen.y -= line_height;
            continue;
        }

        let Some(glyph) = metrics(ch) else {
            continue;
        };

        if !glyph.is_empty() {
            placements.push(GlyphPlacement {
                ch,
                position: Vec2::new(pen.x + glyph.bearing_x, pen.y + glyph.bearing_y),
                size: Vec2::new(glyph.width as f32, glyph.height as f32),
            });
        }
        pen.x += glyph.advance;
    }

    placements
}

/// One glyph quad in draw order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphDraw<H> {
    /// Bottom-left corner in world space
    pub position: Vec2,
    /// Quad size in pixels
    pub size: Vec2,
    /// Image to sample
    pub image: H,
    /// Multiplied into the glyph coverage
    pub tint: Vec4,
}

/// Expand placed glyphs into outlined draw order.
///
/// Every outline offset draws the whole string in black at the text's alpha
/// before the string is drawn once more in `color` at its own position.
pub fn outlined_glyph_draws<H: Copy>(glyphs: &[(Vec2, Vec2, H)], color: Vec4) -> Vec<GlyphDraw<H>> {
    let outline = Vec4::new(0.0, 0.0, 0.0, color.w);
    let mut draws = Vec::with_capacity(glyphs.len() * (OUTLINE_OFFSETS.len() + 1));

    for &(dx, dy) in &OUTLINE_OFFSETS {
        draws.extend(glyphs.iter().map(|&(position, size, image)| GlyphDraw {
            position: position + Vec2::new(dx, dy),
            size,
            image,
            tint: outline,
        }));
    }
    draws.extend(glyphs.iter().map(|&(position, size, image)| GlyphDraw {
        position,
        size,
        image,
        tint: color,
    }));
    draws
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Monospace source: every printable ASCII char is 6x8 with advance 7,
    /// space is empty, anything outside ASCII is unknown.
    pub(crate) struct BoxGlyphs;

    impl GlyphSource for BoxGlyphs {
        fn rasterize(&self, ch: char, _pixel_size: f32) -> Option<GlyphBitmap> {
            if !ch.is_ascii() || ch.is_ascii_control() {
                return None;
            }
            let (width, height) = if ch == ' ' { (0, 0) } else { (6, 8) };
            Some(GlyphBitmap {
                metrics: GlyphMetrics {
                    width,
                    height,
                    bearing_x: 1.0,
                    bearing_y: -2.0,
                    advance: 7.0,
                },
                coverage: vec![255; (width * height) as usize],
            })
        }

        fn line_height(&self, _pixel_size: f32) -> f32 {
            10.0
        }
    }

    fn box_metrics(ch: char) -> Option<GlyphMetrics> {
        BoxGlyphs.rasterize(ch, 16.0).map(|g| g.metrics)
    }

    #[test]
    fn test_pen_advances_and_applies_bearing() {
        let placed = layout_text("AB", Vec2::new(100.0, 50.0), 10.0, box_metrics);
        assert_eq!(placed.len(), 2);
        assert_relative_eq!(placed[0].position.x, 101.0);
        assert_relative_eq!(placed[0].position.y, 48.0);
        assert_relative_eq!(placed[1].position.x, 108.0);
        assert_eq!(placed[1].size, Vec2::new(6.0, 8.0));
    }

    #[test]
    fn test_newline_returns_to_line_start_one_line_down() {
        let placed = layout_text("AB\nC", Vec2::new(100.0, 50.0), 10.0, box_metrics);
        assert_eq!(placed[2].ch, 'C');
        assert_relative_eq!(placed[2].position.x, 101.0);
        assert_relative_eq!(placed[2].position.y, 38.0);
    }

    #[test]
    fn test_space_advances_without_a_quad() {
        let placed = layout_text("A B", Vec2::zeros(), 10.0, box_metrics);
        assert_eq!(placed.len(), 2);
        assert_relative_eq!(placed[1].position.x, 15.0);
    }

    #[test]
    fn test_unknown_characters_are_skipped_without_advance() {
        let placed = layout_text("A\u{e9}B", Vec2::zeros(), 10.0, box_metrics);
        assert_eq!(placed.len(), 2);
        assert_relative_eq!(placed[1].position.x, 8.0);
    }

    #[test]
    fn test_empty_text_places_nothing() {
        assert!(layout_text("", Vec2::zeros(), 10.0, box_metrics).is_empty());
    }

    #[test]
    fn test_invalid_font_bytes_are_rejected() {
        let err = FontdueGlyphSource::from_bytes(b"definitely not a font");
        assert!(matches!(err, Err(FontError::Parse(_))));
    }

    #[test]
    fn test_missing_font_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.ttf");
        match FontdueGlyphSource::from_file(&path) {
            Err(FontError::Io { path: reported, .. }) => assert_eq!(reported, path),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("missing file loaded"),
        }
    }

    #[test]
    fn test_outline_passes_precede_colored_pass() {
        let color = Vec4::new(1.0, 0.5, 0.25, 0.8);
        let glyphs = [
            (Vec2::new(10.0, 20.0), Vec2::new(6.0, 8.0), 'A'),
            (Vec2::new(17.0, 20.0), Vec2::new(6.0, 8.0), 'B'),
        ];
        let draws = outlined_glyph_draws(&glyphs, color);
        assert_eq!(draws.len(), 10);

        let black = Vec4::new(0.0, 0.0, 0.0, 0.8);
        for (pass, &(dx, dy)) in OUTLINE_OFFSETS.iter().enumerate() {
            for (i, &(pos, size, ch)) in glyphs.iter().enumerate() {
                let draw = draws[pass * glyphs.len() + i];
                assert_eq!(draw.image, ch);
                assert_eq!(draw.tint, black);
                assert_eq!(draw.size, size);
                assert_relative_eq!(draw.position.x, pos.x + dx);
                assert_relative_eq!(draw.position.y, pos.y + dy);
            }
        }

        let colored = &draws[8..];
        assert_eq!(colored[0].position, glyphs[0].0);
        assert_eq!(colored[1].position, glyphs[1].0);
        assert!(colored.iter().all(|d| d.tint == color));
    }

    #[test]
    fn test_no_glyphs_no_draws() {
        let draws = outlined_glyph_draws::<u32>(&[], Vec4::new(1.0, 1.0, 1.0, 1.0));
        assert!(draws.is_empty());
    }
}

//! Font loading, shaping, and glyph outline extraction.
//!
//! A [`FontStore`] owns raw TrueType/OpenType bytes and provides the three
//! things the glyph renderer needs: shaped glyph runs (rustybuzz, which
//! handles Arabic joining and other complex-script forms), advance
//! measurement, and glyph outlines converted to `tiny-skia` paths.

use crate::error::{RenderError, Result};
use std::path::Path;
use std::sync::Arc;
use tiny_skia::PathBuilder;
use tracing::debug;
use ttf_parser::{GlyphId, OutlineBuilder};

/// An owned font face. Cheap to clone; the byte buffer is shared.
#[derive(Clone)]
pub struct FontStore {
    data: Arc<Vec<u8>>,
    index: u32,
    units_per_em: u16,
}

impl std::fmt::Debug for FontStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontStore")
            .field("bytes", &self.data.len())
            .field("index", &self.index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

/// One positioned glyph of a shaped run, in pixel units.
#[derive(Debug, Clone, Copy)]
pub struct ShapedGlyph {
    pub id: u16,
    pub x_offset: f32,
    pub y_offset: f32,
    pub advance: f32,
}

/// A shaped run of text at a concrete pixel size.
#[derive(Debug, Clone)]
pub struct ShapedRun {
    pub glyphs: Vec<ShapedGlyph>,
    /// Total advance width, px.
    pub advance: f32,
    /// Font-unit to pixel scale the run was shaped at.
    pub scale: f32,
}

impl FontStore {
    /// Create a store from raw font bytes, validating that they parse.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|e| RenderError::FontLoadFailed(e.to_string()))?;
        let units_per_em = face.units_per_em();
        Ok(Self {
            data: Arc::new(data),
            index: 0,
            units_per_em,
        })
    }

    /// Load a font file from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        debug!("Loaded font {:?} ({} bytes)", path, data.len());
        Self::from_bytes(data)
    }

    /// Discover a usable system font via fontdb.
    ///
    /// Prefers a handwriting-adjacent cursive face, falling back to any
    /// sans-serif face the host provides.
    pub fn system_default() -> Result<Self> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();

        for family in [fontdb::Family::Cursive, fontdb::Family::SansSerif] {
            let query = fontdb::Query {
                families: &[family],
                ..Default::default()
            };
            if let Some(id) = db.query(&query) {
                if let Some(store) = db.with_face_data(id, |data, index| {
                    FontStore::from_bytes(data.to_vec()).map(|mut s| {
                        s.index = index;
                        s
                    })
                }) {
                    if let Ok(store) = store {
                        return Ok(store);
                    }
                }
            }
        }
        Err(RenderError::FontNotFound {
            family: "cursive/sans-serif".to_string(),
        })
    }

    /// Raw font bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Font-unit to pixel scale at a pixel size.
    pub fn scale_for(&self, px_size: f32) -> f32 {
        px_size / self.units_per_em as f32
    }

    /// Shape a text run at a pixel size. `rtl` shapes right-to-left, which
    /// is what preserves Arabic joining forms and reverses visual order.
    pub fn shape(&self, text: &str, px_size: f32, rtl: bool) -> ShapedRun {
        let scale = self.scale_for(px_size);
        let Some(face) = rustybuzz::Face::from_slice(&self.data, self.index) else {
            return ShapedRun {
                glyphs: Vec::new(),
                advance: 0.0,
                scale,
            };
        };

        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        buffer.set_direction(if rtl {
            rustybuzz::Direction::RightToLeft
        } else {
            rustybuzz::Direction::LeftToRight
        });

        let output = rustybuzz::shape(&face, &[], buffer);
        let mut glyphs = Vec::with_capacity(output.len());
        let mut advance = 0.0f32;
        for (info, pos) in output
            .glyph_infos()
            .iter()
            .zip(output.glyph_positions().iter())
        {
            let glyph_advance = pos.x_advance as f32 * scale;
            glyphs.push(ShapedGlyph {
                id: info.glyph_id as u16,
                x_offset: pos.x_offset as f32 * scale,
                y_offset: pos.y_offset as f32 * scale,
                advance: glyph_advance,
            });
            advance += glyph_advance;
        }
        ShapedRun {
            glyphs,
            advance,
            scale,
        }
    }

    /// Measure the advance width of a run without rendering it.
    pub fn measure(&self, text: &str, px_size: f32) -> f32 {
        self.shape(text, px_size, false).advance
    }

    /// Build the outline of one glyph as a tiny-skia path positioned at
    /// `(origin_x, origin_y)` baseline coordinates. Returns `None` for
    /// glyphs without outlines (spaces) or unresolvable glyph ids.
    pub fn glyph_path(
        &self,
        glyph_id: u16,
        scale: f32,
        origin_x: f32,
        origin_y: f32,
    ) -> Option<tiny_skia::Path> {
        let face = ttf_parser::Face::parse(&self.data, self.index).ok()?;
        let mut builder = GlyphPathBuilder::new(origin_x, origin_y, scale);
        face.outline_glyph(GlyphId(glyph_id), &mut builder)?;
        builder.finish()
    }
}

/// Converts ttf-parser outline callbacks into a tiny-skia path, scaling
/// from font units and flipping Y (font outlines are Y-up, raster is
/// Y-down).
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y - y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y - y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_system_font() -> Option<FontStore> {
        match FontStore::system_default() {
            Ok(store) => Some(store),
            Err(_) => {
                eprintln!("Skipping test: no system font found");
                None
            }
        }
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let result = FontStore::from_bytes(vec![0u8; 64]);
        assert!(matches!(result, Err(RenderError::FontLoadFailed(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let result = FontStore::from_file(Path::new("/nonexistent/font.ttf"));
        assert!(matches!(result, Err(RenderError::FontIo(_))));
    }

    #[test]
    fn test_shape_produces_glyphs() {
        let Some(font) = try_system_font() else { return };
        let run = font.shape("hello", 24.0, false);
        assert_eq!(run.glyphs.len(), 5);
        assert!(run.advance > 0.0);
    }

    #[test]
    fn test_measure_monotonic_in_length() {
        let Some(font) = try_system_font() else { return };
        let short = font.measure("ab", 24.0);
        let long = font.measure("abcd", 24.0);
        assert!(long > short);
    }

    #[test]
    fn test_measure_scales_with_size() {
        let Some(font) = try_system_font() else { return };
        let small = font.measure("handwriting", 12.0);
        let large = font.measure("handwriting", 24.0);
        assert!((large / small - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_glyph_path_for_visible_glyph() {
        let Some(font) = try_system_font() else { return };
        let run = font.shape("A", 24.0, false);
        let glyph = run.glyphs[0];
        let path = font.glyph_path(glyph.id, run.scale, 10.0, 30.0);
        assert!(path.is_some());
        let bounds = path.unwrap().bounds();
        assert!(bounds.width() > 0.0);
    }

    #[test]
    fn test_space_has_no_outline_but_advances() {
        let Some(font) = try_system_font() else { return };
        let run = font.shape(" ", 24.0, false);
        assert_eq!(run.glyphs.len(), 1);
        assert!(run.advance > 0.0);
        // Space glyphs are intentionally outline-less.
        assert!(font
            .glyph_path(run.glyphs[0].id, run.scale, 0.0, 0.0)
            .is_none());
    }

    #[test]
    fn test_rtl_shaping_runs() {
        let Some(font) = try_system_font() else { return };
        let run = font.shape("שלום", 24.0, true);
        // The face may lack Hebrew coverage; shaping must still not panic
        // and must report a non-negative advance.
        assert!(run.advance >= 0.0);
    }
}

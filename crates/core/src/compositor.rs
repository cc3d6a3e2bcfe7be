//! Page compositor: renders one `PageRecord` onto a raster surface.
//!
//! A page render moves through four stages in order: background (paper
//! fill, optional custom image, procedural texture), rule overlay (ruled
//! lines, graph grid, dot grid, margin line), content layout (walking the
//! page's line records and dispatching units to the glyph renderer), and
//! post effects (preview vignette). A missing image asset degrades to a
//! no-op with a warning; it never aborts the page.

use crate::config::{PaperGeometry, PaperMaterial, RenderSettings};
use crate::error::{RenderError, Result};
use crate::font::FontStore;
use crate::glyph::{segment_units, GlyphRenderer, GlyphStyle, UnitPosition};
use crate::layout::{Direction, LineKind, LineRecord};
use crate::noise::{NoiseSource, PagePersonality};
use crate::paginate::PageRecord;
use crate::token::StyleMap;
use tiny_skia::{
    Color, FillRule, GradientStop, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Point,
    RadialGradient, Rect, SpreadMode, Stroke, Transform,
};
use tracing::{debug, warn};

/// Number of line slots an inline image will occupy, derived from its
/// intrinsic dimensions scaled to fit the usable width. An unreadable
/// image still reserves one slot so pagination stays stable.
pub fn image_line_slots(src: &str, geometry: &PaperGeometry) -> usize {
    match image::image_dimensions(src) {
        Ok((w, h)) => {
            let display_h = scaled_image_size(w, h, geometry).1;
            ((display_h / geometry.line_height).ceil() as usize).max(1)
        }
        Err(e) => {
            warn!("Failed to read image dimensions for {:?}: {}", src, e);
            1
        }
    }
}

/// Display size for an inline image: fit to the usable width, never
/// upscale beyond the geometry scale, cap at 40% of the usable height.
fn scaled_image_size(w: u32, h: u32, geometry: &PaperGeometry) -> (f32, f32) {
    let natural_w = w as f32 * geometry.scale();
    let natural_h = h as f32 * geometry.scale();
    let mut factor = (geometry.usable_width() / natural_w).min(1.0);
    let max_h = geometry.usable_height() * 0.4;
    if natural_h * factor > max_h {
        factor = max_h / natural_h;
    }
    (natural_w * factor, natural_h * factor)
}

/// Renders pages for one settings snapshot. Construct once per render
/// pass; each `render_page` call owns the surface it returns.
pub struct PageCompositor<'a> {
    settings: &'a RenderSettings,
    geometry: PaperGeometry,
    font: &'a FontStore,
    noise: NoiseSource,
    style_map: Option<&'a StyleMap>,
    /// Export renders skip the vignette so output stays clean.
    for_export: bool,
}

impl<'a> PageCompositor<'a> {
    pub fn new(
        settings: &'a RenderSettings,
        geometry: PaperGeometry,
        font: &'a FontStore,
        style_map: Option<&'a StyleMap>,
        for_export: bool,
    ) -> Self {
        Self {
            settings,
            geometry,
            font,
            noise: NoiseSource::new(settings.regenerate),
            style_map,
            for_export,
        }
    }

    /// Render one page through the full stage sequence.
    pub fn render_page(&self, page: &PageRecord) -> Result<Pixmap> {
        let width = self.geometry.width_px;
        let height = self.geometry.height_px;
        let mut pixmap =
            Pixmap::new(width, height).ok_or(RenderError::SurfaceCreationFailed {
                width,
                height,
            })?;

        self.paint_background(&mut pixmap, page.index);
        self.paint_rule_overlay(&mut pixmap);
        self.paint_content(&mut pixmap, page);
        self.paint_post_effects(&mut pixmap);

        debug!(
            "Composited page {} ({} lines) at {}x{}",
            page.index,
            page.lines.len(),
            width,
            height
        );
        Ok(pixmap)
    }

    // ---- Background ----

    fn paint_background(&self, pixmap: &mut Pixmap, page_index: usize) {
        let (r, g, b) = self.settings.material.base_color();
        pixmap.fill(Color::from_rgba8(r, g, b, 255));

        if let Some(path) = &self.settings.background_image {
            match image::open(path) {
                Ok(img) => self.draw_full_page_image(pixmap, img),
                Err(e) => warn!("Background image {:?} failed to load: {}", path, e),
            }
        }

        if self.settings.texture {
            self.paint_fibers(pixmap, page_index);
            self.paint_grain(pixmap, page_index);
        }

        if self.settings.material.is_aged() {
            self.paint_age_spots(pixmap, page_index);
        }

        if self.settings.material == PaperMaterial::Vintage {
            self.paint_border(pixmap);
        }
    }

    fn draw_full_page_image(&self, pixmap: &mut Pixmap, img: image::DynamicImage) {
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let Some(size) = IntSize::from_wh(w, h) else {
            return;
        };
        let Some(source) = Pixmap::from_vec(rgba.into_raw(), size) else {
            return;
        };
        let sx = pixmap.width() as f32 / w as f32;
        let sy = pixmap.height() as f32 / h as f32;
        let paint = PixmapPaint {
            quality: tiny_skia::FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &paint,
            Transform::from_scale(sx, sy),
            None,
        );
    }

    /// Sparse thin strokes suggesting paper fiber.
    fn paint_fibers(&self, pixmap: &mut Pixmap, page_index: usize) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let count = 120;
        let mut paint = Paint::default();
        paint.anti_alias = true;
        let dark = self.settings.material.is_aged();
        paint.set_color_rgba8(120, 104, 80, if dark { 16 } else { 9 });

        for k in 0..count {
            let x = self.noise.unit(page_index, k, 0, "fiber", "x") * w;
            let y = self.noise.unit(page_index, k, 0, "fiber", "y") * h;
            let len = (4.0 + self.noise.unit(page_index, k, 0, "fiber", "len") * 14.0) * scale;
            let angle = self.noise.unit(page_index, k, 0, "fiber", "angle")
                * std::f32::consts::TAU;
            let mut pb = PathBuilder::new();
            pb.move_to(x, y);
            pb.line_to(x + len * angle.cos(), y + len * angle.sin());
            if let Some(path) = pb.finish() {
                let stroke = Stroke {
                    width: 0.7 * scale,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
    }

    /// Per-pixel-ish luminance noise, approximated with small dot fills.
    fn paint_grain(&self, pixmap: &mut Pixmap, page_index: usize) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let count = 320;
        for k in 0..count {
            let x = self.noise.unit(page_index, k, 1, "grain", "x") * w;
            let y = self.noise.unit(page_index, k, 1, "grain", "y") * h;
            let lum = self.noise.unit(page_index, k, 1, "grain", "lum");
            let mut paint = Paint::default();
            if lum < 0.5 {
                paint.set_color_rgba8(60, 55, 45, 7);
            } else {
                paint.set_color_rgba8(255, 255, 255, 9);
            }
            if let Some(rect) = Rect::from_xywh(x, y, 1.2 * scale, 1.2 * scale) {
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
            }
        }
    }

    /// Radial-gradient age spots for vintage/aged materials.
    fn paint_age_spots(&self, pixmap: &mut Pixmap, page_index: usize) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let count = 6 + (self.noise.page_unit(page_index, "spots") * 6.0) as usize;
        for k in 0..count {
            let cx = self.noise.unit(page_index, k, 2, "spot", "x") * w;
            let cy = self.noise.unit(page_index, k, 2, "spot", "y") * h;
            let radius =
                (8.0 + self.noise.unit(page_index, k, 2, "spot", "r") * 26.0) * scale;
            let center = Point::from_xy(cx, cy);
            let Some(shader) = RadialGradient::new(
                center,
                center,
                radius,
                vec![
                    GradientStop::new(0.0, Color::from_rgba8(150, 118, 70, 34)),
                    GradientStop::new(1.0, Color::from_rgba8(150, 118, 70, 0)),
                ],
                SpreadMode::Pad,
                Transform::identity(),
            ) else {
                continue;
            };
            let mut paint = Paint::default();
            paint.anti_alias = true;
            paint.shader = shader;
            if let Some(circle) = PathBuilder::from_circle(cx, cy, radius) {
                pixmap.fill_path(&circle, &paint, FillRule::Winding, Transform::identity(), None);
            }
        }
    }

    /// Thin double border for the vintage material.
    fn paint_border(&self, pixmap: &mut Pixmap) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color_rgba8(146, 112, 70, 120);
        for (inset, width) in [(10.0 * scale, 1.6 * scale), (16.0 * scale, 0.8 * scale)] {
            let mut pb = PathBuilder::new();
            pb.move_to(inset, inset);
            pb.line_to(w - inset, inset);
            pb.line_to(w - inset, h - inset);
            pb.line_to(inset, h - inset);
            pb.close();
            if let Some(path) = pb.finish() {
                let stroke = Stroke {
                    width,
                    ..Stroke::default()
                };
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
    }

    // ---- Rule overlay ----

    fn paint_rule_overlay(&self, pixmap: &mut Pixmap) {
        match self.settings.material {
            m if m.has_rules() => self.paint_rules(pixmap),
            PaperMaterial::Graph => self.paint_grid(pixmap, false),
            PaperMaterial::Dotted => self.paint_grid(pixmap, true),
            _ => {}
        }
        if self.settings.margin_line {
            self.paint_margin_line(pixmap);
        }
    }

    fn rule_color(&self) -> (u8, u8, u8, u8) {
        if self.settings.material == PaperMaterial::Vintage {
            (168, 134, 94, 96)
        } else {
            (96, 143, 193, 72)
        }
    }

    fn paint_rules(&self, pixmap: &mut Pixmap) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let spacing =
            self.geometry.line_height * self.settings.material.rule_spacing_factor();
        let (r, g, b, a) = self.rule_color();
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color_rgba8(r, g, b, a);
        let stroke = Stroke {
            width: 1.0 * scale,
            ..Stroke::default()
        };

        let mut y = self.geometry.margin_top + spacing;
        while y <= h - self.geometry.margin_bottom {
            let mut pb = PathBuilder::new();
            pb.move_to(0.0, y);
            pb.line_to(w, y);
            if let Some(path) = pb.finish() {
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
            y += spacing;
        }
    }

    /// Graph grid, or a dot grid when `dots` is set. 5mm cells.
    fn paint_grid(&self, pixmap: &mut Pixmap, dots: bool) {
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let cell = 5.0 / 25.4 * self.geometry.ppi;
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color_rgba8(132, 156, 198, if dots { 120 } else { 56 });

        if dots {
            let mut y = cell;
            while y < h {
                let mut x = cell;
                while x < w {
                    if let Some(circle) = PathBuilder::from_circle(x, y, 0.9 * scale) {
                        pixmap.fill_path(
                            &circle,
                            &paint,
                            FillRule::Winding,
                            Transform::identity(),
                            None,
                        );
                    }
                    x += cell;
                }
                y += cell;
            }
            return;
        }

        let stroke = Stroke {
            width: 0.7 * scale,
            ..Stroke::default()
        };
        let mut x = cell;
        while x < w {
            let mut pb = PathBuilder::new();
            pb.move_to(x, 0.0);
            pb.line_to(x, h);
            if let Some(path) = pb.finish() {
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
            x += cell;
        }
        let mut y = cell;
        while y < h {
            let mut pb = PathBuilder::new();
            pb.move_to(0.0, y);
            pb.line_to(w, y);
            if let Some(path) = pb.finish() {
                pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
            y += cell;
        }
    }

    fn paint_margin_line(&self, pixmap: &mut Pixmap) {
        let h = pixmap.height() as f32;
        let scale = self.geometry.scale();
        let x = (self.geometry.margin_left - 10.0 * scale).max(2.0);
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color_rgba8(214, 82, 82, 110);
        let stroke = Stroke {
            width: 1.2 * scale,
            ..Stroke::default()
        };
        let mut pb = PathBuilder::new();
        pb.move_to(x, 0.0);
        pb.line_to(x, h);
        if let Some(path) = pb.finish() {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    // ---- Content ----

    fn paint_content(&self, pixmap: &mut Pixmap, page: &PageRecord) {
        let personality = PagePersonality::for_page(
            &self.noise,
            page.index,
            self.settings.slant_degrees,
        );
        let scale = self.geometry.scale();
        let renderer = GlyphRenderer::new(
            self.font,
            self.settings,
            NoiseSource::new(self.settings.regenerate),
            personality,
            scale,
        );

        for (slot, line) in page.lines.iter().enumerate() {
            match &line.kind {
                LineKind::Empty => continue,
                LineKind::Image { src } => {
                    self.paint_inline_image(pixmap, src, slot);
                }
                _ => self.paint_text_line(pixmap, &renderer, page.index, slot, line),
            }
        }
    }

    fn paint_text_line(
        &self,
        pixmap: &mut Pixmap,
        renderer: &GlyphRenderer<'_>,
        page_index: usize,
        slot: usize,
        line: &LineRecord,
    ) {
        let scale = self.geometry.scale();
        let line_y = self.geometry.line_baseline(slot);
        let indent_px = line.indent as f32 * self.settings.font_size * 1.04 * scale;

        let mut x = self.geometry.width_px as f32 - self.geometry.margin_right - indent_px;
        let rtl = line.direction == Direction::Rtl;
        if !rtl {
            x = self.geometry.margin_left + indent_px;
        }

        let base_state = self
            .style_map
            .map(|m| m.state_at(line.source_offset))
            .unwrap_or_default();
        let px_size = self.settings.font_size * base_state.size_factor() * scale;

        x = self.paint_list_marker(pixmap, renderer, page_index, slot, line, x, line_y, px_size, rtl);

        // The line text has collapsed whitespace, so word positions cannot be
        // re-derived from it. word_offsets carries the original source offset
        // of each word for style lookups.
        let mut word_index = 0usize;
        for (word, &word_offset) in line.text.split_whitespace().zip(line.word_offsets.iter()) {
            let state = self
                .style_map
                .map(|m| m.state_at(word_offset))
                .unwrap_or(base_state);
            let style = GlyphStyle {
                bold: state.bold,
                italic: state.italic,
                underline: state.underline,
            };
            let word_px = self.settings.font_size * state.size_factor() * scale;

            for unit in segment_units(word) {
                let pos = UnitPosition {
                    page: page_index,
                    line: slot,
                    word: word_index,
                };
                if rtl {
                    let est = self.font.measure(&unit, word_px)
                        + self.settings.letter_spacing * scale;
                    x -= est;
                    renderer.draw_unit(pixmap, &unit, x, line_y, word_px, style, pos, true);
                } else {
                    x += renderer.draw_unit(pixmap, &unit, x, line_y, word_px, style, pos, false);
                }
            }

            let space = self.font.measure(" ", word_px)
                + self.settings.word_spacing * scale
                + self.noise.jitter(page_index, slot, word_index, word, "ws", 0.6 * scale);
            if rtl {
                x -= space;
            } else {
                x += space;
            }
            word_index += 1;
        }
    }

    /// Draw the bullet dash or list number ahead of the line text; returns
    /// the cursor after the marker.
    #[allow(clippy::too_many_arguments)]
    fn paint_list_marker(
        &self,
        pixmap: &mut Pixmap,
        renderer: &GlyphRenderer<'_>,
        page_index: usize,
        slot: usize,
        line: &LineRecord,
        x: f32,
        line_y: f32,
        px_size: f32,
        rtl: bool,
    ) -> f32 {
        let marker = match (&line.kind, line.ordinal) {
            (LineKind::Numbered, Some(n)) => format!("{}.", n),
            (LineKind::Numbered, None) => "1.".to_string(),
            (LineKind::Bullet, _) => "-".to_string(),
            _ => return x,
        };

        let mut cursor = x;
        for (k, unit) in segment_units(&marker).into_iter().enumerate() {
            let pos = UnitPosition {
                page: page_index,
                line: slot,
                word: usize::MAX - k,
            };
            if rtl {
                let est = self.font.measure(&unit, px_size);
                cursor -= est;
                renderer.draw_unit(
                    pixmap,
                    &unit,
                    cursor,
                    line_y,
                    px_size,
                    GlyphStyle::default(),
                    pos,
                    true,
                );
            } else {
                cursor += renderer.draw_unit(
                    pixmap,
                    &unit,
                    cursor,
                    line_y,
                    px_size,
                    GlyphStyle::default(),
                    pos,
                    false,
                );
            }
        }
        let gap = self.settings.font_size * 0.4 * self.geometry.scale();
        if rtl {
            cursor - gap
        } else {
            cursor + gap
        }
    }

    /// Inline image, top-aligned to the slot it starts in, scaled to fit.
    /// Load failure logs and leaves the reserved slots blank.
    fn paint_inline_image(&self, pixmap: &mut Pixmap, src: &str, slot: usize) {
        let img = match image::open(src) {
            Ok(img) => img,
            Err(e) => {
                warn!("Inline image {:?} failed to load: {}", src, e);
                return;
            }
        };
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let (display_w, display_h) = scaled_image_size(w, h, &self.geometry);
        if display_w <= 0.0 || display_h <= 0.0 {
            return;
        }
        let Some(size) = IntSize::from_wh(w, h) else {
            return;
        };
        let Some(source) = Pixmap::from_vec(rgba.into_raw(), size) else {
            return;
        };

        let top = self.geometry.line_baseline(slot) - self.geometry.line_height + 2.0;
        let transform = Transform::from_scale(display_w / w as f32, display_h / h as f32)
            .post_translate(self.geometry.margin_left, top);
        let paint = PixmapPaint {
            quality: tiny_skia::FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, transform, None);
    }

    // ---- Post effects ----

    fn paint_post_effects(&self, pixmap: &mut Pixmap) {
        if self.for_export || !self.settings.vignette {
            return;
        }
        let w = pixmap.width() as f32;
        let h = pixmap.height() as f32;
        let center = Point::from_xy(w / 2.0, h / 2.0);
        let radius = (w * w + h * h).sqrt() / 2.0;
        let Some(shader) = RadialGradient::new(
            center,
            center,
            radius,
            vec![
                GradientStop::new(0.0, Color::from_rgba8(0, 0, 0, 0)),
                GradientStop::new(0.72, Color::from_rgba8(0, 0, 0, 0)),
                GradientStop::new(1.0, Color::from_rgba8(20, 14, 8, 46)),
            ],
            SpreadMode::Pad,
            Transform::identity(),
        ) else {
            return;
        };
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.shader = shader;
        if let Some(rect) = Rect::from_xywh(0.0, 0.0, w, h) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    /// Side-by-side compare surface: a snapshot render and a live render
    /// joined on one wide canvas with a divider and labels.
    pub fn compose_compare(&self, snapshot: &Pixmap, live: &Pixmap) -> Result<Pixmap> {
        let divider = (4.0 * self.geometry.scale()) as u32;
        let width = snapshot.width() + divider + live.width();
        let height = snapshot.height().max(live.height());
        let mut canvas =
            Pixmap::new(width, height).ok_or(RenderError::SurfaceCreationFailed {
                width,
                height,
            })?;
        canvas.fill(Color::from_rgba8(40, 40, 44, 255));

        let paint = PixmapPaint::default();
        canvas.draw_pixmap(0, 0, snapshot.as_ref(), &paint, Transform::identity(), None);
        canvas.draw_pixmap(
            (snapshot.width() + divider) as i32,
            0,
            live.as_ref(),
            &paint,
            Transform::identity(),
            None,
        );

        let label_px = 14.0 * self.geometry.scale();
        self.draw_plain_label(&mut canvas, "before", 10.0, label_px * 1.6, label_px);
        self.draw_plain_label(
            &mut canvas,
            "after",
            (snapshot.width() + divider) as f32 + 10.0,
            label_px * 1.6,
            label_px,
        );
        Ok(canvas)
    }

    /// Unjittered label text for overlays.
    fn draw_plain_label(&self, pixmap: &mut Pixmap, text: &str, x: f32, y: f32, px_size: f32) {
        let run = self.font.shape(text, px_size, false);
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color_rgba8(30, 30, 34, 255);
        let mut pen_x = x;
        for glyph in &run.glyphs {
            if let Some(path) =
                self.font
                    .glyph_path(glyph.id, run.scale, pen_x + glyph.x_offset, y - glyph.y_offset)
            {
                pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
            }
            pen_x += glyph.advance;
        }
    }
}

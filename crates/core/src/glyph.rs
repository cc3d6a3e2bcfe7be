//! Glyph renderer: draws one visual unit with organic perturbation.
//!
//! A unit is a single character, a detected digraph ligature, or a whole
//! complex-script cluster rendered atomically. Every perturbation draws
//! from the deterministic noise source, so the same inputs paint the same
//! pixels.

use crate::config::{InkColor, RenderSettings};
use crate::font::FontStore;
use crate::noise::{NoiseSource, PagePersonality};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// Digraph pairs rendered as one unit. A rendering heuristic for a joined
/// handwritten look, not true typographic shaping.
const LIGATURE_PAIRS: &[&str] = &["th", "ch", "sh", "ff", "fi", "fl", "ll", "st", "oo", "ee"];

/// Classification of a drawable unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitClass {
    /// Emoji and other supplementary-plane symbols: neutral baseline, full
    /// opacity, no ink effects.
    Emoji,
    /// Arabic/Devanagari cluster shaped and drawn as one atom.
    Complex,
    /// Latin-style character or digraph ligature.
    Simple,
}

fn is_emoji_char(c: char) -> bool {
    let cp = c as u32;
    cp >= 0x1F000 || (0x2600..=0x27BF).contains(&cp) || cp == 0xFE0F || cp == 0x200D
}

fn is_complex_char(c: char) -> bool {
    let cp = c as u32;
    (0x0600..=0x06FF).contains(&cp)
        || (0x0750..=0x077F).contains(&cp)
        || (0x08A0..=0x08FF).contains(&cp)
        || (0xFB50..=0xFDFF).contains(&cp)
        || (0xFE70..=0xFEFF).contains(&cp)
        || (0x0900..=0x097F).contains(&cp)
}

/// Classify one unit string.
pub fn classify_unit(unit: &str) -> UnitClass {
    if unit.chars().any(is_complex_char) {
        UnitClass::Complex
    } else if unit.chars().any(is_emoji_char) {
        UnitClass::Emoji
    } else {
        UnitClass::Simple
    }
}

/// Split a word into drawable units: whole-word clusters for complex
/// scripts, single emoji, and 2-character ligature windows for simple text.
pub fn segment_units(word: &str) -> Vec<String> {
    if word.chars().any(is_complex_char) {
        // Splitting an Arabic word would break its joining forms; the whole
        // chunk is one shaped unit.
        return vec![word.to_string()];
    }

    let chars: Vec<char> = word.chars().collect();
    let mut units = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        if is_emoji_char(chars[i]) {
            units.push(chars[i].to_string());
            i += 1;
            continue;
        }
        if i + 1 < chars.len() && !is_emoji_char(chars[i + 1]) {
            let pair: String = chars[i..i + 2].iter().collect();
            let lowered = pair.to_lowercase();
            if LIGATURE_PAIRS.contains(&lowered.as_str()) {
                units.push(pair);
                i += 2;
                continue;
            }
        }
        units.push(chars[i].to_string());
        i += 1;
    }
    units
}

/// Character style in effect for one unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlyphStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

impl GlyphStyle {
    /// Style-specific baseline lift above the rule line, as a fraction of
    /// the font size. Keeps descenders clear of the rule.
    fn baseline_ratio(&self) -> f32 {
        if self.bold {
            0.12
        } else if self.italic {
            0.08
        } else {
            0.10
        }
    }
}

/// Position of a unit within the page, used to build noise seeds.
#[derive(Debug, Clone, Copy)]
pub struct UnitPosition {
    pub page: usize,
    pub line: usize,
    pub word: usize,
}

/// Draws units onto a pixmap with the organic effect pipeline.
pub struct GlyphRenderer<'a> {
    font: &'a FontStore,
    settings: &'a RenderSettings,
    noise: NoiseSource,
    personality: PagePersonality,
    /// Geometry scale (dpi / 96); jitter magnitudes are layout-px values.
    scale: f32,
}

impl<'a> GlyphRenderer<'a> {
    pub fn new(
        font: &'a FontStore,
        settings: &'a RenderSettings,
        noise: NoiseSource,
        personality: PagePersonality,
        scale: f32,
    ) -> Self {
        Self {
            font,
            settings,
            noise,
            personality,
            scale,
        }
    }

    /// Draw one unit at cursor `x` for the rule line at `line_y`.
    /// Returns the advance width consumed, including letter spacing and
    /// spacing jitter.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_unit(
        &self,
        pixmap: &mut Pixmap,
        unit: &str,
        x: f32,
        line_y: f32,
        font_size_px: f32,
        style: GlyphStyle,
        pos: UnitPosition,
        rtl: bool,
    ) -> f32 {
        let class = classify_unit(unit);
        let n = |channel: &str| self.noise.unit(pos.page, pos.line, pos.word, unit, channel);

        // Size variance shapes the unit at a slightly different size, so
        // advances stay consistent with what was drawn.
        let size_factor = if class == UnitClass::Simple {
            1.0 + (n("size") - 0.5) * 0.10
        } else {
            1.0
        };
        let px_size = font_size_px * size_factor;
        let run = self.font.shape(unit, px_size, rtl && class == UnitClass::Complex);

        let baseline = if class == UnitClass::Emoji {
            line_y - font_size_px * 0.10
        } else {
            line_y - font_size_px * style.baseline_ratio() + self.personality.drift_at(x)
        };

        let (dx, dy, rotation) = if class == UnitClass::Simple {
            (
                (n("dx") - 0.5) * 1.6 * self.scale,
                (n("dy") - 0.5) * 2.0 * self.settings.baseline_jitter * self.scale,
                self.personality.slant_degrees
                    + (n("rot") - 0.5) * 2.0 * self.settings.rotation_jitter,
            )
        } else if class == UnitClass::Complex {
            (
                0.0,
                (n("dy") - 0.5) * self.settings.baseline_jitter * self.scale,
                self.personality.slant_degrees * 0.5,
            )
        } else {
            (0.0, 0.0, 0.0)
        };

        let ink = self.resolve_ink(unit, pos, class);
        let alpha = if self.settings.pressure && class != UnitClass::Emoji {
            0.85 + n("alpha") * 0.15
        } else {
            1.0
        };

        let origin_x = x + dx;
        let origin_y = baseline + dy;
        let transform = self.unit_transform(origin_x, origin_y, rotation, style.italic);

        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.set_color_rgba8(ink.r, ink.g, ink.b, (alpha * 255.0) as u8);

        // Bleed: a soft halo pass under the main fill, offset sub-pixel in
        // four directions at low opacity.
        let bleed_radius = if self.settings.bleed && class == UnitClass::Simple {
            (0.3 + n("bleed") * 0.5) * self.settings.bleed_intensity.clamp(0.0, 1.0) * self.scale
        } else {
            0.0
        };

        let mut pen_x = origin_x;
        for glyph in &run.glyphs {
            let gx = pen_x + glyph.x_offset;
            let gy = origin_y - glyph.y_offset;
            if let Some(path) = self.font.glyph_path(glyph.id, run.scale, gx, gy) {
                if bleed_radius > 0.0 {
                    let mut halo = Paint::default();
                    halo.anti_alias = true;
                    halo.set_color_rgba8(ink.r, ink.g, ink.b, (alpha * 255.0 * 0.22) as u8);
                    for (ox, oy) in [
                        (bleed_radius, 0.0),
                        (-bleed_radius, 0.0),
                        (0.0, bleed_radius),
                        (0.0, -bleed_radius),
                    ] {
                        let shifted = transform.pre_concat(Transform::from_translate(ox, oy));
                        pixmap.fill_path(&path, &halo, FillRule::Winding, shifted, None);
                    }
                }

                pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);

                if style.bold {
                    let stroke = Stroke {
                        width: (font_size_px * 0.035).max(0.4),
                        ..Stroke::default()
                    };
                    pixmap.stroke_path(&path, &paint, &stroke, transform, None);
                }
            }
            pen_x += glyph.advance;
        }

        let advance = run.advance;

        if style.underline && advance > 0.0 {
            self.draw_wavy_underline(pixmap, origin_x, line_y, advance, &ink, alpha, pos, unit);
        }

        // Occasional ink speckle near the glyph.
        if class == UnitClass::Simple && n("speckle") < 0.05 {
            self.draw_speckle(pixmap, origin_x, origin_y, font_size_px, &ink, pos, unit);
        }

        let spacing_jitter = (n("adv") - 0.5) * 0.8 * self.scale;
        advance + self.settings.letter_spacing * self.scale + spacing_jitter
    }

    /// Resolve ink for one unit: base color, an occasional family-variant
    /// swap, or a slight brightness perturbation.
    fn resolve_ink(&self, unit: &str, pos: UnitPosition, class: UnitClass) -> InkColor {
        if class == UnitClass::Emoji || !self.settings.ink_variation {
            return self.settings.ink;
        }
        let roll = self.noise.unit(pos.page, pos.line, pos.word, unit, "ink");
        let swap_chance = 0.04 + self.personality.ink_family_bias * 0.04;
        if roll < swap_chance {
            let family = self.settings.ink.family();
            family[(roll * 1000.0) as usize % family.len()]
        } else if roll > 0.9 {
            self.settings.ink.perturbed((roll - 0.95) * 20.0)
        } else {
            self.settings.ink
        }
    }

    /// Rotation about the unit origin plus an italic shear.
    fn unit_transform(&self, x: f32, y: f32, rotation_deg: f32, italic: bool) -> Transform {
        let mut ts = Transform::from_rotate_at(rotation_deg, x, y);
        if italic {
            let shear = Transform::from_translate(x, y)
                .pre_concat(Transform::from_skew(-0.22, 0.0))
                .pre_concat(Transform::from_translate(-x, -y));
            ts = ts.pre_concat(shear);
        }
        ts
    }

    /// Hand-wavy underline sized by the unit's measured width.
    #[allow(clippy::too_many_arguments)]
    fn draw_wavy_underline(
        &self,
        pixmap: &mut Pixmap,
        x: f32,
        line_y: f32,
        width: f32,
        ink: &InkColor,
        alpha: f32,
        pos: UnitPosition,
        unit: &str,
    ) {
        let y = line_y + 3.0 * self.scale;
        let wobble = self
            .noise
            .jitter(pos.page, pos.line, pos.word, unit, "under", 1.2 * self.scale);
        let mut pb = PathBuilder::new();
        pb.move_to(x, y + wobble);
        pb.quad_to(x + width * 0.5, y - wobble, x + width, y + wobble * 0.5);
        if let Some(path) = pb.finish() {
            let mut paint = Paint::default();
            paint.anti_alias = true;
            paint.set_color_rgba8(ink.r, ink.g, ink.b, (alpha * 255.0) as u8);
            let stroke = Stroke {
                width: (1.1 * self.scale).max(0.6),
                ..Stroke::default()
            };
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    /// Small ink-speckle artifact near a glyph.
    fn draw_speckle(
        &self,
        pixmap: &mut Pixmap,
        x: f32,
        y: f32,
        font_size_px: f32,
        ink: &InkColor,
        pos: UnitPosition,
        unit: &str,
    ) {
        let ox = self
            .noise
            .jitter(pos.page, pos.line, pos.word, unit, "spk-x", font_size_px * 0.4);
        let oy = self
            .noise
            .jitter(pos.page, pos.line, pos.word, unit, "spk-y", font_size_px * 0.3);
        let radius = (font_size_px * 0.03).max(0.5);
        if let Some(circle) =
            PathBuilder::from_circle(x + font_size_px * 0.3 + ox, y - font_size_px * 0.3 + oy, radius)
        {
            let mut paint = Paint::default();
            paint.anti_alias = true;
            paint.set_color_rgba8(ink.r, ink.g, ink.b, 110);
            pixmap.fill_path(&circle, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderSettings;
    use crate::font::FontStore;
    use crate::noise::{NoiseSource, PagePersonality};

    fn try_system_font() -> Option<FontStore> {
        match FontStore::system_default() {
            Ok(store) => Some(store),
            Err(_) => {
                eprintln!("Skipping test: no system font found");
                None
            }
        }
    }

    // ========== Segmentation tests ==========

    #[test]
    fn test_segment_plain_word() {
        assert_eq!(segment_units("cat"), vec!["c", "a", "t"]);
    }

    #[test]
    fn test_segment_ligature_pairs() {
        assert_eq!(segment_units("the"), vec!["th", "e"]);
        assert_eq!(segment_units("fill"), vec!["fi", "ll"]);
        assert_eq!(segment_units("street"), vec!["st", "r", "ee", "t"]);
    }

    #[test]
    fn test_segment_ligature_case_insensitive() {
        assert_eq!(segment_units("This"), vec!["Th", "i", "s"]);
    }

    #[test]
    fn test_segment_advances_two_chars_at_once() {
        // "oo" then "o": the window never re-reads a consumed character.
        assert_eq!(segment_units("ooo"), vec!["oo", "o"]);
    }

    #[test]
    fn test_segment_arabic_whole_cluster() {
        let units = segment_units("مرحبا");
        assert_eq!(units.len(), 1);
        assert_eq!(units[0], "مرحبا");
    }

    #[test]
    fn test_segment_emoji_own_unit() {
        let units = segment_units("a😀b");
        assert_eq!(units, vec!["a", "😀", "b"]);
    }

    // ========== Classification tests ==========

    #[test]
    fn test_classify_simple() {
        assert_eq!(classify_unit("th"), UnitClass::Simple);
        assert_eq!(classify_unit("x"), UnitClass::Simple);
    }

    #[test]
    fn test_classify_emoji() {
        assert_eq!(classify_unit("😀"), UnitClass::Emoji);
        assert_eq!(classify_unit("☀"), UnitClass::Emoji);
    }

    #[test]
    fn test_classify_complex() {
        assert_eq!(classify_unit("مرحبا"), UnitClass::Complex);
        assert_eq!(classify_unit("नमस्ते"), UnitClass::Complex);
    }

    // ========== Draw tests (need a real font) ==========

    fn renderer_fixture<'a>(
        font: &'a FontStore,
        settings: &'a RenderSettings,
    ) -> GlyphRenderer<'a> {
        let noise = NoiseSource::new(settings.regenerate);
        let personality = PagePersonality::for_page(&noise, 0, settings.slant_degrees);
        GlyphRenderer::new(font, settings, noise, personality, 1.0)
    }

    #[test]
    fn test_draw_unit_returns_positive_advance() {
        let Some(font) = try_system_font() else { return };
        let settings = RenderSettings::default();
        let renderer = renderer_fixture(&font, &settings);
        let mut pixmap = Pixmap::new(200, 100).unwrap();
        let advance = renderer.draw_unit(
            &mut pixmap,
            "h",
            20.0,
            60.0,
            24.0,
            GlyphStyle::default(),
            UnitPosition {
                page: 0,
                line: 0,
                word: 0,
            },
            false,
        );
        assert!(advance > 0.0);
    }

    #[test]
    fn test_draw_unit_paints_pixels() {
        let Some(font) = try_system_font() else { return };
        let settings = RenderSettings::default();
        let renderer = renderer_fixture(&font, &settings);
        let mut pixmap = Pixmap::new(200, 100).unwrap();
        renderer.draw_unit(
            &mut pixmap,
            "M",
            40.0,
            60.0,
            30.0,
            GlyphStyle::default(),
            UnitPosition {
                page: 0,
                line: 0,
                word: 0,
            },
            false,
        );
        let painted = pixmap.data().iter().any(|&b| b != 0);
        assert!(painted, "expected glyph to paint at least one pixel");
    }

    #[test]
    fn test_draw_unit_deterministic() {
        let Some(font) = try_system_font() else { return };
        let settings = RenderSettings::default();
        let renderer = renderer_fixture(&font, &settings);
        let draw = || {
            let mut pixmap = Pixmap::new(120, 80).unwrap();
            renderer.draw_unit(
                &mut pixmap,
                "g",
                30.0,
                50.0,
                26.0,
                GlyphStyle::default(),
                UnitPosition {
                    page: 0,
                    line: 1,
                    word: 2,
                },
                false,
            );
            pixmap.data().to_vec()
        };
        assert_eq!(draw(), draw());
    }

    #[test]
    fn test_draw_unit_regenerate_changes_pixels() {
        let Some(font) = try_system_font() else { return };
        let settings = RenderSettings::default();
        let mut shuffled = settings.clone();
        shuffled.regenerate = 1;

        let render_with = |s: &RenderSettings| {
            let noise = NoiseSource::new(s.regenerate);
            let personality = PagePersonality::for_page(&noise, 0, s.slant_degrees);
            let renderer = GlyphRenderer::new(&font, s, noise, personality, 1.0);
            let mut pixmap = Pixmap::new(120, 80).unwrap();
            renderer.draw_unit(
                &mut pixmap,
                "g",
                30.0,
                50.0,
                26.0,
                GlyphStyle::default(),
                UnitPosition {
                    page: 0,
                    line: 1,
                    word: 2,
                },
                false,
            );
            pixmap.data().to_vec()
        };

        assert_ne!(render_with(&settings), render_with(&shuffled));
    }

    #[test]
    fn test_underline_paints_below_baseline() {
        let Some(font) = try_system_font() else { return };
        let settings = RenderSettings::default();
        let renderer = renderer_fixture(&font, &settings);
        let mut plain = Pixmap::new(200, 100).unwrap();
        let mut underlined = Pixmap::new(200, 100).unwrap();
        let style = GlyphStyle {
            underline: true,
            ..Default::default()
        };
        let pos = UnitPosition {
            page: 0,
            line: 0,
            word: 0,
        };
        renderer.draw_unit(&mut plain, "o", 40.0, 50.0, 24.0, GlyphStyle::default(), pos, false);
        renderer.draw_unit(&mut underlined, "o", 40.0, 50.0, 24.0, style, pos, false);
        let count = |p: &Pixmap| p.data().iter().filter(|&&b| b != 0).count();
        assert!(count(&underlined) > count(&plain));
    }
}

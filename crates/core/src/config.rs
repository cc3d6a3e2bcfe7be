//! Configuration types for handwriting rendering.
//!
//! All settings are plain serde-serializable structs treated as immutable
//! snapshots per render pass: no component reads ambient state mid-render.
//! Mutation happens only between passes, by whoever owns the settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Preview rendering resolution, CSS-pixel equivalent.
pub const PREVIEW_DPI: u32 = 96;

/// Export rendering target resolution.
pub const EXPORT_DPI: u32 = 300;

/// Physical page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    Letter,
    A5,
    A6,
    Legal,
    Tabloid,
}

impl PaperSize {
    /// Portrait dimensions in millimetres.
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::Letter => (215.9, 279.4),
            PaperSize::A5 => (148.0, 210.0),
            PaperSize::A6 => (105.0, 148.0),
            PaperSize::Legal => (215.9, 355.6),
            PaperSize::Tabloid => (279.4, 431.8),
        }
    }
}

/// Page orientation; landscape swaps the paper axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Paper material: background fill, texture treatment, and rule overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperMaterial {
    Plain,
    Lined,
    /// College-ruled: tighter line spacing than `Lined`.
    College,
    /// Wide-ruled: looser line spacing than `Lined`.
    Wide,
    Graph,
    Dotted,
    Vintage,
    Aged,
    Cream,
}

impl PaperMaterial {
    /// Base paper fill color.
    pub fn base_color(&self) -> (u8, u8, u8) {
        match self {
            PaperMaterial::Plain | PaperMaterial::Lined => (253, 253, 250),
            PaperMaterial::College | PaperMaterial::Wide => (255, 255, 252),
            PaperMaterial::Graph => (252, 253, 255),
            PaperMaterial::Dotted => (254, 254, 252),
            PaperMaterial::Vintage => (242, 233, 215),
            PaperMaterial::Aged => (235, 222, 195),
            PaperMaterial::Cream => (250, 244, 227),
        }
    }

    /// Rule line spacing as a multiple of the layout line height.
    /// College rules sit tighter, wide rules looser.
    pub fn rule_spacing_factor(&self) -> f32 {
        match self {
            PaperMaterial::College => 0.85,
            PaperMaterial::Wide => 1.25,
            _ => 1.0,
        }
    }

    /// Whether this material draws horizontal rule lines.
    pub fn has_rules(&self) -> bool {
        matches!(
            self,
            PaperMaterial::Lined
                | PaperMaterial::College
                | PaperMaterial::Wide
                | PaperMaterial::Vintage
        )
    }

    /// Whether this material ages the paper (spots, stronger noise).
    pub fn is_aged(&self) -> bool {
        matches!(self, PaperMaterial::Vintage | PaperMaterial::Aged)
    }
}

/// RGB ink color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl InkColor {
    pub const BLACK: InkColor = InkColor { r: 20, g: 20, b: 24 };
    pub const BLUE: InkColor = InkColor { r: 24, g: 42, b: 115 };
    pub const RED: InkColor = InkColor { r: 158, g: 34, b: 28 };

    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Family variants simulating a pen that is not quite consistent:
    /// near-tones of the base color a glyph may occasionally swap to.
    pub fn family(&self) -> [InkColor; 3] {
        let shift = |v: u8, d: i16| (v as i16 + d).clamp(0, 255) as u8;
        [
            InkColor::new(shift(self.r, 12), shift(self.g, 12), shift(self.b, 10)),
            InkColor::new(shift(self.r, -10), shift(self.g, -10), shift(self.b, -8)),
            InkColor::new(shift(self.r, 6), shift(self.g, 4), shift(self.b, 18)),
        ]
    }

    /// Brightness perturbation in `[-1, 1]` applied uniformly.
    pub fn perturbed(&self, amount: f32) -> InkColor {
        let d = (amount * 16.0) as i16;
        let shift = |v: u8| (v as i16 + d).clamp(0, 255) as u8;
        InkColor::new(shift(self.r), shift(self.g), shift(self.b))
    }
}

impl Default for InkColor {
    fn default() -> Self {
        InkColor::BLUE
    }
}

/// Page margins in layout pixels (96 DPI base; scaled with the geometry).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 64.0,
            right: 40.0,
            bottom: 64.0,
            left: 48.0,
        }
    }
}

/// The organic-effect configuration: a read-only snapshot per render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub paper_size: PaperSize,
    pub orientation: Orientation,
    pub material: PaperMaterial,
    pub margins: Margins,

    /// Font size in layout pixels at the 96 DPI base.
    pub font_size: f32,
    /// Line height as a multiple of the font size.
    pub line_spacing: f32,
    pub letter_spacing: f32,
    pub word_spacing: f32,

    pub ink: InkColor,
    /// Allow occasional swaps into ink family variants.
    pub ink_variation: bool,

    /// Base handwriting slant, degrees. Each page adds a small delta.
    pub slant_degrees: f32,
    /// Half-range of vertical per-glyph jitter, px.
    pub baseline_jitter: f32,
    /// Half-range of per-glyph rotation jitter, degrees.
    pub rotation_jitter: f32,

    /// Opacity variation simulating pen pressure.
    pub pressure: bool,
    /// Soft ink-bleed pass around glyph edges.
    pub bleed: bool,
    pub bleed_intensity: f32,

    /// Procedural paper fiber strokes and luminance noise.
    pub texture: bool,
    /// Vertical red margin line.
    pub margin_line: bool,
    /// Radial corner vignette on preview renders (never on export).
    pub vignette: bool,

    /// Custom background image layered over the base fill.
    pub background_image: Option<PathBuf>,

    /// Reduced line capacity for page 0, reserving header room.
    pub first_page_lines: Option<usize>,

    /// Reshuffles all jitter without changing layout.
    pub regenerate: u64,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            orientation: Orientation::Portrait,
            material: PaperMaterial::Lined,
            margins: Margins::default(),
            font_size: 24.0,
            line_spacing: 1.55,
            letter_spacing: 0.6,
            word_spacing: 2.0,
            ink: InkColor::default(),
            ink_variation: true,
            slant_degrees: 0.8,
            baseline_jitter: 1.6,
            rotation_jitter: 1.4,
            pressure: true,
            bleed: true,
            bleed_intensity: 0.5,
            texture: true,
            margin_line: true,
            vignette: true,
            background_image: None,
            first_page_lines: None,
            regenerate: 0,
        }
    }
}

impl RenderSettings {
    /// Set the paper size.
    pub fn paper_size(mut self, size: PaperSize) -> Self {
        self.paper_size = size;
        self
    }

    /// Set the orientation.
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the font size in layout pixels.
    pub fn font_size(mut self, px: f32) -> Self {
        self.font_size = px;
        self
    }

    /// Set the paper material.
    pub fn material(mut self, material: PaperMaterial) -> Self {
        self.material = material;
        self
    }

    /// Set the ink color.
    pub fn ink(mut self, ink: InkColor) -> Self {
        self.ink = ink;
        self
    }

    /// Bump the regenerate counter: new jitter, same layout.
    pub fn regenerate(mut self) -> Self {
        self.regenerate += 1;
        self
    }

    /// Line height in layout pixels at the 96 DPI base.
    pub fn line_height(&self) -> f32 {
        self.font_size * self.line_spacing
    }

    /// Estimated character budget per line for the given geometry.
    ///
    /// Handwriting is not monospaced; the budget is an average-advance
    /// estimate. The glyph renderer measures real advances at draw time,
    /// and the estimate errs narrow so drawn lines stay inside the margins.
    pub fn chars_per_line(&self, geometry: &PaperGeometry) -> usize {
        let avg_advance = (self.font_size * 0.52 + self.letter_spacing) * geometry.scale();
        ((geometry.usable_width() / avg_advance).floor() as usize).max(1)
    }

    /// Serialize to JSON for settings presets.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::RenderError::InvalidConfig(e.to_string()))
    }

    /// Load a settings preset from JSON. The result is validated.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| crate::error::RenderError::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.font_size <= 0.0 {
            return Err(crate::error::RenderError::InvalidConfig(
                "font_size must be positive".to_string(),
            ));
        }
        if self.line_spacing < 1.0 {
            return Err(crate::error::RenderError::InvalidConfig(
                "line_spacing must be at least 1.0".to_string(),
            ));
        }
        let geometry = PaperGeometry::preview(self);
        if geometry.lines_per_page() == 0 {
            return Err(crate::error::RenderError::InvalidConfig(
                "margins and line height leave no room for text".to_string(),
            ));
        }
        if let Some(first) = self.first_page_lines {
            if first == 0 {
                return Err(crate::error::RenderError::InvalidConfig(
                    "first_page_lines must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Pixel geometry of one page at a concrete DPI.
///
/// The same settings produce geometrically similar layouts at every DPI:
/// all pixel fields scale together by `dpi / 96`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperGeometry {
    pub width_px: u32,
    pub height_px: u32,
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub line_height: f32,
    pub ppi: f32,
}

impl PaperGeometry {
    /// Geometry for a DPI target.
    pub fn new(settings: &RenderSettings, dpi: f32) -> Self {
        let (mut w_mm, mut h_mm) = settings.paper_size.dimensions_mm();
        if settings.orientation == Orientation::Landscape {
            std::mem::swap(&mut w_mm, &mut h_mm);
        }
        let scale = dpi / PREVIEW_DPI as f32;
        Self {
            width_px: ((w_mm / 25.4) * dpi).round() as u32,
            height_px: ((h_mm / 25.4) * dpi).round() as u32,
            margin_top: settings.margins.top * scale,
            margin_right: settings.margins.right * scale,
            margin_bottom: settings.margins.bottom * scale,
            margin_left: settings.margins.left * scale,
            line_height: settings.line_height() * scale,
            ppi: dpi,
        }
    }

    /// Screen-preview geometry (96 DPI equivalent).
    pub fn preview(settings: &RenderSettings) -> Self {
        Self::new(settings, PREVIEW_DPI as f32)
    }

    /// Export geometry: 300 DPI with an oversample multiplier on top.
    pub fn export(settings: &RenderSettings, oversample: f32) -> Self {
        Self::new(settings, EXPORT_DPI as f32 * oversample)
    }

    /// Ratio of this geometry to the 96 DPI layout base.
    pub fn scale(&self) -> f32 {
        self.ppi / PREVIEW_DPI as f32
    }

    pub fn usable_width(&self) -> f32 {
        (self.width_px as f32 - self.margin_left - self.margin_right).max(0.0)
    }

    pub fn usable_height(&self) -> f32 {
        (self.height_px as f32 - self.margin_top - self.margin_bottom).max(0.0)
    }

    /// Fixed page capacity: `floor(usable_height / line_height)`.
    pub fn lines_per_page(&self) -> usize {
        if self.line_height <= 0.0 {
            return 0;
        }
        (self.usable_height() / self.line_height).floor() as usize
    }

    /// Baseline Y of line `index` (0-based) on this page.
    pub fn line_baseline(&self, index: usize) -> f32 {
        self.margin_top + (index as f32 + 1.0) * self.line_height
    }
}

/// Configuration for the export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Output DPI. Default: 300.
    pub dpi: u32,

    /// Oversample multiplier applied on top of the DPI target.
    /// Default: 2.0; clamped to the 2-3x range the pipeline supports.
    pub oversample: f32,

    /// Number of threads for parallel PNG encoding.
    /// Default: number of CPU cores.
    pub encode_threads: usize,

    /// PNG compression preference: fast favors throughput.
    pub fast_compression: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dpi: EXPORT_DPI,
            oversample: 2.0,
            encode_threads: num_cpus::get(),
            fast_compression: true,
        }
    }
}

impl ExportOptions {
    /// Create export options with a specific DPI.
    pub fn with_dpi(dpi: u32) -> Self {
        Self {
            dpi,
            ..Default::default()
        }
    }

    /// Set the oversample multiplier.
    pub fn oversample(mut self, factor: f32) -> Self {
        self.oversample = factor;
        self
    }

    /// Set the number of encode threads.
    pub fn encode_threads(mut self, threads: usize) -> Self {
        self.encode_threads = threads;
        self
    }

    /// Effective raster DPI including oversampling.
    pub fn raster_dpi(&self) -> f32 {
        self.dpi as f32 * self.oversample.clamp(1.0, 3.0)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.dpi == 0 || self.dpi > 1200 {
            return Err(crate::error::RenderError::InvalidConfig(
                "dpi must be between 1 and 1200".to_string(),
            ));
        }
        if self.encode_threads == 0 {
            return Err(crate::error::RenderError::InvalidConfig(
                "encode_threads must be at least 1".to_string(),
            ));
        }
        if !(1.0..=3.0).contains(&self.oversample) {
            return Err(crate::error::RenderError::InvalidConfig(
                "oversample must be between 1.0 and 3.0".to_string(),
            ));
        }
        Ok(())
    }
}

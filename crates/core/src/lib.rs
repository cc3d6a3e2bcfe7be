//! # handscript-core
//!
//! A handwriting rendering engine: turns lightly-tagged text into pages
//! that look written by hand, with deterministic per-glyph jitter, paper
//! materials, and export to PNG, PDF, or ZIP.
//!
//! The pipeline is: tokenize the markup, build logical lines against a
//! character budget, group lines into pages with orphan/widow control,
//! then composite each page (paper background, rule overlay, glyph
//! rendering with organic effects, post effects). All randomness flows
//! through a seeded noise source, so the same content and settings always
//! produce pixel-identical output; bumping the `regenerate` counter
//! reshuffles the jitter without moving a single line break.
//!
//! ## Quick start
//!
//! Render a live preview page:
//!
//! ```no_run
//! use handscript_core::{FontStore, RenderEngine, RenderSettings};
//!
//! # fn main() -> handscript_core::Result<()> {
//! let font = FontStore::system_default()?;
//! let mut engine = RenderEngine::new(font, RenderSettings::default())?;
//! engine.set_text("Dear diary, today <b>everything</b> changed.")?;
//! engine.layout_now();
//! let pixmap = engine.render_page(0)?;
//! pixmap.save_png("preview.png").ok();
//! # Ok(())
//! # }
//! ```
//!
//! Export a document to PDF at print resolution:
//!
//! ```no_run
//! use handscript_core::{ExportOptions, ExportPipeline, FontStore, RenderSettings};
//!
//! # fn main() -> handscript_core::Result<()> {
//! let font = FontStore::system_default()?;
//! let settings = RenderSettings::default();
//! let pipeline = ExportPipeline::new(&font, &settings, ExportOptions::default())?;
//! let pdf = pipeline.export_pdf("A letter worth keeping.")?;
//! std::fs::write("letter.pdf", pdf)?;
//! # Ok(())
//! # }
//! ```

pub mod compositor;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod font;
pub mod glyph;
pub mod layout;
pub mod noise;
pub mod paginate;
pub mod token;

pub use compositor::PageCompositor;
pub use config::{
    ExportOptions, InkColor, Margins, Orientation, PaperGeometry, PaperMaterial, PaperSize,
    RenderSettings, EXPORT_DPI, PREVIEW_DPI,
};
pub use engine::RenderEngine;
pub use error::{RenderError, Result};
pub use export::{ExportPipeline, PngPage};
pub use font::FontStore;
pub use layout::{build_lines, LineKind, LineRecord};
pub use paginate::{paginate, PageRecord};
pub use token::{tokenize, StyleMap, Token};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize logging for binaries and tests.
///
/// Respects `RUST_LOG`; defaults to `info` for this crate. Safe to call
/// more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("handscript_core=info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}

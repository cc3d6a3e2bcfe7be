//! Export pipeline: replays the page compositor at export resolution and
//! assembles the pages into PNG, PDF, or ZIP output.
//!
//! Layout budgets are always taken from the base-DPI geometry, so the
//! export pass paginates to exactly the same page count as the preview.
//! Page rasters render strictly in order for bounded memory; PNG encoding
//! fans out across a rayon pool since encoded pages are independent.

use crate::compositor::{image_line_slots, PageCompositor};
use crate::config::{ExportOptions, PaperGeometry, RenderSettings};
use crate::error::{RenderError, Result};
use crate::font::FontStore;
use crate::layout::build_lines_from_tokens;
use crate::paginate::{paginate, PageRecord};
use crate::token::{tokenize, StyleMap};
use flate2::write::ZlibEncoder;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use rayon::prelude::*;
use std::io::Write;
use std::path::Path;
use tiny_skia::Pixmap;
use tracing::{debug, info};

/// One page rendered at export resolution.
pub struct RenderedPage {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub pixmap: Pixmap,
}

/// An encoded PNG for one page.
pub struct PngPage {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Drives export renders for one document snapshot.
pub struct ExportPipeline<'a> {
    font: &'a FontStore,
    settings: &'a RenderSettings,
    options: ExportOptions,
}

impl<'a> ExportPipeline<'a> {
    pub fn new(
        font: &'a FontStore,
        settings: &'a RenderSettings,
        options: ExportOptions,
    ) -> Result<Self> {
        settings.validate()?;
        options.validate()?;
        Ok(Self {
            font,
            settings,
            options,
        })
    }

    /// Paginate the document for export.
    ///
    /// All layout budgets (character budget, page capacity, image slots)
    /// come from the base-DPI geometry, the same one the preview uses.
    /// Deriving them from the export geometry would let per-DPI pixel
    /// rounding shift a capacity by one and silently change the page count.
    pub fn paginate_document(&self, markup: &str) -> (Vec<PageRecord>, StyleMap) {
        let layout = PaperGeometry::preview(self.settings);
        let tokens = tokenize(markup);
        let style_map = StyleMap::from_tokens(&tokens);
        let lines = build_lines_from_tokens(
            &tokens,
            self.settings.chars_per_line(&layout),
            |src| image_line_slots(src, &layout),
        );
        let pages = paginate(
            &lines,
            layout.lines_per_page(),
            self.settings.first_page_lines,
        );
        (pages, style_map)
    }

    fn geometry(&self) -> PaperGeometry {
        PaperGeometry::new(self.settings, self.options.raster_dpi())
    }

    /// Render every page at export resolution, strictly in order. Any
    /// single page failure fails the whole export.
    pub fn render_pages(&self, markup: &str) -> Result<Vec<RenderedPage>> {
        let geometry = self.geometry();
        let (pages, style_map) = self.paginate_document(markup);
        if pages.is_empty() {
            return Err(RenderError::NoPagesToExport);
        }
        info!(
            "Export render: {} page(s) at {} DPI ({}x{})",
            pages.len(),
            self.options.raster_dpi(),
            geometry.width_px,
            geometry.height_px
        );

        let compositor =
            PageCompositor::new(self.settings, geometry, self.font, Some(&style_map), true);
        let mut rendered = Vec::with_capacity(pages.len());
        for page in &pages {
            let pixmap =
                compositor
                    .render_page(page)
                    .map_err(|e| RenderError::PageCaptureFailed {
                        page: page.index,
                        message: e.to_string(),
                    })?;
            rendered.push(RenderedPage {
                index: page.index,
                width: pixmap.width(),
                height: pixmap.height(),
                pixmap,
            });
        }
        Ok(rendered)
    }

    /// Render and encode every page to PNG, encoding in parallel.
    pub fn export_pngs(&self, markup: &str) -> Result<Vec<PngPage>> {
        let rendered = self.render_pages(markup)?;
        let fast = self.options.fast_compression;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.encode_threads)
            .build()
            .map_err(|e| RenderError::PngEncodingError(e.to_string()))?;

        let mut encoded = pool.install(|| {
            rendered
                .par_iter()
                .map(|page| {
                    let data = encode_png(&page.pixmap, fast)?;
                    Ok(PngPage {
                        index: page.index,
                        width: page.width,
                        height: page.height,
                        data,
                    })
                })
                .collect::<Result<Vec<PngPage>>>()
        })?;
        encoded.sort_by_key(|p| p.index);
        Ok(encoded)
    }

    /// Render one page to PNG bytes.
    pub fn export_png(&self, markup: &str, page_index: usize) -> Result<PngPage> {
        let rendered = self.render_pages(markup)?;
        let total = rendered.len();
        let page = rendered
            .into_iter()
            .find(|p| p.index == page_index)
            .ok_or(RenderError::PageOutOfRange {
                page: page_index,
                total,
            })?;
        let data = encode_png(&page.pixmap, self.options.fast_compression)?;
        Ok(PngPage {
            index: page.index,
            width: page.width,
            height: page.height,
            data,
        })
    }

    /// Assemble the whole document into a PDF: one full-bleed image per
    /// physical page, sized from the paper geometry.
    pub fn export_pdf(&self, markup: &str) -> Result<Vec<u8>> {
        let rendered = self.render_pages(markup)?;
        let raster_dpi = self.options.raster_dpi();

        let mut pdf = Pdf::new();
        let mut alloc = RefAllocator::new();
        let catalog_id = alloc.next();
        let page_tree_id = alloc.next();

        let mut page_ids = Vec::with_capacity(rendered.len());
        for _ in &rendered {
            page_ids.push(alloc.next());
        }

        pdf.catalog(catalog_id).pages(page_tree_id);
        pdf.pages(page_tree_id)
            .kids(page_ids.iter().copied())
            .count(rendered.len() as i32);

        for (page, &page_id) in rendered.iter().zip(&page_ids) {
            let image_id = alloc.next();
            let content_id = alloc.next();
            let image_name = Name(b"Im0");

            // Physical page size in PDF points from the raster dimensions.
            let width_pt = page.width as f32 / raster_dpi * 72.0;
            let height_pt = page.height as f32 / raster_dpi * 72.0;

            let rgb = demultiplied_rgb(&page.pixmap);
            let compressed = deflate(&rgb)?;

            let mut image = pdf.image_xobject(image_id, &compressed);
            image.filter(Filter::FlateDecode);
            image.width(page.width as i32);
            image.height(page.height as i32);
            image.color_space().device_rgb();
            image.bits_per_component(8);
            image.finish();

            let mut content = Content::new();
            content.save_state();
            content.transform([width_pt, 0.0, 0.0, height_pt, 0.0, 0.0]);
            content.x_object(image_name);
            content.restore_state();
            pdf.stream(content_id, &content.finish());

            let mut pdf_page = pdf.page(page_id);
            pdf_page.media_box(Rect::new(0.0, 0.0, width_pt, height_pt));
            pdf_page.parent(page_tree_id);
            pdf_page.contents(content_id);
            pdf_page
                .resources()
                .x_objects()
                .pair(image_name, image_id);
            pdf_page.finish();

            debug!(
                "PDF page {}: {:.1}x{:.1}pt, {} bytes compressed",
                page.index,
                width_pt,
                height_pt,
                compressed.len()
            );
        }

        Ok(pdf.finish())
    }

    /// Assemble the document into a ZIP of per-page PNGs, one file per
    /// page named by ordinal.
    pub fn export_zip(&self, markup: &str) -> Result<Vec<u8>> {
        let pages = self.export_pngs(markup)?;

        let cursor = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(cursor);
        let zip_options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for page in &pages {
            // PNG payloads are already compressed; deflate still trims the
            // container overhead a little.
            zip.start_file(format!("page-{:03}.png", page.index + 1), zip_options)
                .map_err(|e| RenderError::ZipAssemblyError(e.to_string()))?;
            zip.write_all(&page.data)
                .map_err(|e| RenderError::ZipAssemblyError(e.to_string()))?;
        }

        // Qualified call: the imported pdf_writer::Finish trait has a
        // blanket impl whose by-value finish() would resolve first.
        let cursor = zip::ZipWriter::finish(&mut zip)
            .map_err(|e| RenderError::ZipAssemblyError(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    /// Write any exported byte payload to disk.
    pub fn write_output(&self, path: &Path, data: &[u8]) -> Result<()> {
        std::fs::write(path, data).map_err(|e| RenderError::OutputWriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Monotonic PDF object id allocator.
struct RefAllocator {
    next: i32,
}

impl RefAllocator {
    fn new() -> Self {
        Self { next: 1 }
    }

    fn next(&mut self) -> Ref {
        let id = Ref::new(self.next);
        self.next += 1;
        id
    }
}

/// Encode a pixmap as RGBA PNG. Pixmap storage is premultiplied; PNG
/// wants straight alpha.
pub fn encode_png(pixmap: &Pixmap, fast: bool) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(pixmap.data().len());
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        raw.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, pixmap.width(), pixmap.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(if fast {
            png::Compression::Fast
        } else {
            png::Compression::Default
        });
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::PngEncodingError(e.to_string()))?;
        writer
            .write_image_data(&raw)
            .map_err(|e| RenderError::PngEncodingError(e.to_string()))?;
    }
    Ok(out)
}

/// Flatten a pixmap to straight-alpha RGB rows for the PDF image stream.
fn demultiplied_rgb(pixmap: &Pixmap) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixmap.width() as usize * pixmap.height() as usize * 3);
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        rgb.extend_from_slice(&[c.red(), c.green(), c.blue()]);
    }
    rgb
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| RenderError::PdfAssemblyError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| RenderError::PdfAssemblyError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PaperSize, RenderSettings};
    use crate::font::FontStore;

    fn try_system_font() -> Option<FontStore> {
        match FontStore::system_default() {
            Ok(store) => Some(store),
            Err(_) => {
                eprintln!("Skipping test: no system font found");
                None
            }
        }
    }

    fn fast_settings() -> RenderSettings {
        let mut s = RenderSettings::default().paper_size(PaperSize::A6);
        s.texture = false;
        s.bleed = false;
        s
    }

    fn fast_options() -> ExportOptions {
        // Low DPI keeps test surfaces small.
        ExportOptions::with_dpi(72).oversample(1.0)
    }

    // ========== PNG encoding tests ==========

    #[test]
    fn test_encode_png_signature() {
        let pixmap = Pixmap::new(8, 8).unwrap();
        let data = encode_png(&pixmap, true).unwrap();
        assert_eq!(&data[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_encode_png_fast_vs_default() {
        let mut pixmap = Pixmap::new(64, 64).unwrap();
        pixmap.fill(tiny_skia::Color::from_rgba8(120, 90, 60, 255));
        let fast = encode_png(&pixmap, true).unwrap();
        let default = encode_png(&pixmap, false).unwrap();
        assert!(!fast.is_empty());
        assert!(!default.is_empty());
    }

    // ========== Pipeline tests (need a real font) ==========

    #[test]
    fn test_page_count_immune_to_dpi_rounding() {
        let Some(font) = try_system_font() else { return };
        // Capacity-boundary settings: with budgets derived from the export
        // geometry, per-DPI pixel rounding flipped lines_per_page by one
        // here and the export grew an extra page.
        let mut settings = RenderSettings::default();
        settings.font_size = 18.0;
        settings.line_spacing = 1.005;
        settings.texture = false;
        settings.bleed = false;
        let options = ExportOptions::with_dpi(300).oversample(2.0);
        let pipeline = ExportPipeline::new(&font, &settings, options).unwrap();

        let markup = "word ".repeat(3050);
        let preview = PaperGeometry::preview(&settings);
        let lines = build_lines_from_tokens(
            &tokenize(&markup),
            settings.chars_per_line(&preview),
            |_| 1,
        );
        let expected = paginate(&lines, preview.lines_per_page(), None).len();
        let (pages, _) = pipeline.paginate_document(&markup);
        assert_eq!(pages.len(), expected);
        assert!(pages.len() > 1);
    }

    #[test]
    fn test_export_png_page_out_of_range() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        assert!(matches!(
            pipeline.export_png("one page", 9),
            Err(RenderError::PageOutOfRange { page: 9, total: 1 })
        ));
    }

    #[test]
    fn test_page_count_matches_paginator() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let markup = "one two three four five six seven eight\n\nnine ten";
        let (pages, _) = pipeline.paginate_document(markup);
        let rendered = pipeline.render_pages(markup).unwrap();
        assert_eq!(rendered.len(), pages.len());
    }

    #[test]
    fn test_export_pngs_one_per_page_in_order() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let pages = pipeline.export_pngs("hello export").unwrap();
        assert!(!pages.is_empty());
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.index, i);
            assert_eq!(&page.data[..4], &[0x89, b'P', b'N', b'G']);
        }
    }

    #[test]
    fn test_empty_document_still_exports_one_page() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let pages = pipeline.export_pngs("").unwrap();
        assert_eq!(pages.len(), 1);
    }

    #[test]
    fn test_export_pdf_structure() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let pdf = pipeline.export_pdf("pdf export check").unwrap();
        assert_eq!(&pdf[..5], b"%PDF-");
        assert!(pdf.windows(5).any(|w| w == b"/Page"));
    }

    #[test]
    fn test_export_pdf_page_size_points() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let rendered = pipeline.render_pages("x").unwrap();
        // A6 is 105x148mm; at 72 points per inch that is ~297.6x419.5pt.
        let width_pt = rendered[0].width as f32 / 72.0 * 72.0;
        assert!((width_pt - 105.0 / 25.4 * 72.0).abs() < 2.0);
    }

    #[test]
    fn test_export_zip_contains_named_pages() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let bytes = pipeline.export_zip("zip export check").unwrap();
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).unwrap();
        assert!(archive.len() >= 1);
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "page-001.png");
    }

    #[test]
    fn test_write_output_roundtrip() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let pipeline = ExportPipeline::new(&font, &settings, fast_options()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        pipeline.write_output(&path, b"payload").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_invalid_options_rejected() {
        let Some(font) = try_system_font() else { return };
        let settings = fast_settings();
        let mut options = ExportOptions::default();
        options.dpi = 0;
        assert!(ExportPipeline::new(&font, &settings, options).is_err());
    }
}

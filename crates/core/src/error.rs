//! Error types for the handwriting rendering engine.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the handscript library.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Font data could not be parsed as a TrueType/OpenType face.
    #[error("Failed to load font: {0}")]
    FontLoadFailed(String),

    /// No usable font was found through system discovery.
    #[error("No font found for family '{family}'. Install a TrueType font or supply one explicitly")]
    FontNotFound { family: String },

    /// Reading a font file from disk failed.
    #[error("Failed to read font file: {0}")]
    FontIo(#[from] std::io::Error),

    /// The raster surface could not be allocated.
    #[error("Failed to create raster surface of {width}x{height} pixels")]
    SurfaceCreationFailed { width: u32, height: u32 },

    /// An export was requested for a document that paginates to zero pages.
    /// Pagination always yields at least one page for well-formed input, so
    /// hitting this indicates a caller-side inconsistency.
    #[error("No pages to export")]
    NoPagesToExport,

    /// A single page failed to render during export. The whole export fails
    /// rather than producing a silently truncated document.
    #[error("Failed to capture page {page}: {message}")]
    PageCaptureFailed { page: usize, message: String },

    /// A page index outside the paginated range was requested.
    #[error("Page {page} out of range: document has {total} page(s)")]
    PageOutOfRange { page: usize, total: usize },

    /// PNG encoding failed.
    #[error("PNG encoding failed: {0}")]
    PngEncodingError(String),

    /// PDF assembly failed.
    #[error("PDF assembly failed: {0}")]
    PdfAssemblyError(String),

    /// ZIP assembly failed.
    #[error("ZIP assembly failed: {0}")]
    ZipAssemblyError(String),

    /// Writing export output to disk failed.
    #[error("Failed to write output '{path}': {message}")]
    OutputWriteError { path: PathBuf, message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The layout worker channel closed unexpectedly.
    #[error("Layout worker channel error: {0}")]
    ChannelError(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, RenderError>;

impl<T> From<crossbeam_channel::SendError<T>> for RenderError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        RenderError::ChannelError("Channel closed".to_string())
    }
}

impl From<crossbeam_channel::RecvError> for RenderError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        RenderError::ChannelError("Channel closed".to_string())
    }
}

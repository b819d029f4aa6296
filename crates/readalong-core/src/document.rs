//! Contracts for the PDF engine that backs the reader.
//!
//! The engine itself lives outside this crate; the coordinator only needs a
//! page count, per-page text content and a cancellable bitmap render.

use crate::cancellation::CancellationToken;
use crate::error::RenderError;
use crate::geometry::{TextItem, Viewport};
use image::RgbaImage;
use std::sync::Arc;

pub trait PdfDocument: Send + Sync {
    fn page_count(&self) -> usize;

    /// Fetch a page by its 1-based number.
    fn page(&self, page_number: usize) -> anyhow::Result<Arc<dyn PdfPage>>;
}

pub trait PdfPage: Send + Sync {
    /// Viewport of this page at `scale`, in output pixels.
    fn viewport(&self, scale: f32) -> Viewport;

    /// Raw text-content items as stored in the page's content stream.
    fn text_content(&self) -> anyhow::Result<Vec<TextItem>>;

    /// Draw the page into a bitmap sized to `viewport`.
    ///
    /// Implementations must poll `cancel` between drawing stages and return
    /// [`RenderError::Cancelled`] once it fires.
    fn render(
        &self,
        viewport: &Viewport,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError>;
}

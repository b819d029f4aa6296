//! Native text-layer extraction: PDF text items to positioned word boxes.
//!
//! Text items carry an affine transform in PDF user space (origin bottom-left).
//! Word boxes live in viewport pixels (origin top-left), so `y` is flipped
//! against the page height and everything is multiplied by the viewport scale.
//! Glyphs inside an item are assumed to share one width; variable-width fonts
//! therefore position words approximately.

use crate::document::PdfPage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ts_rs::TS;

/// A positioned, sized text token on a rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WordBox {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// Zero-based page index.
    pub page_index: usize,
    /// Order in which the extractor produced the box.
    pub sequence_index: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtractionResult {
    /// Unordered; sort before reconstruction.
    pub words: Vec<WordBox>,
    pub full_text: String,
    /// Boxes came from OCR and are positionally approximate.
    pub is_ocr: bool,
}

impl ExtractionResult {
    pub fn empty(is_ocr: bool) -> Self {
        Self {
            words: Vec::new(),
            full_text: String::new(),
            is_ocr,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// One entry of a page's text content.
#[derive(Debug, Clone, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// `[a, b, c, d, e, f]`; `e`/`f` are the translation.
    pub transform: [f32; 6],
    /// Advance width of the whole item, in PDF units.
    pub width: f32,
    /// Glyph height in PDF units; zero when the engine does not report one.
    pub height: f32,
}

/// Target pixel space for a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scale: f32,
    /// Output width in pixels.
    pub width: f32,
    /// Output height in pixels.
    pub height: f32,
    /// Unscaled page height in PDF units.
    pub page_height: f32,
}

impl Viewport {
    pub fn new(page_width: f32, page_height: f32, scale: f32) -> Self {
        Self {
            scale,
            width: page_width * scale,
            height: page_height * scale,
            page_height,
        }
    }

    pub fn pixel_width(&self) -> u32 {
        self.width.max(1.0).floor() as u32
    }

    pub fn pixel_height(&self) -> u32 {
        self.height.max(1.0).floor() as u32
    }
}

/// Extract word boxes from the page's native text layer.
///
/// Never fails: a text-content error is logged and reported as an empty
/// result, which callers treat as "no text layer".
pub fn extract_native(page: &dyn PdfPage, page_number: usize, viewport: &Viewport) -> ExtractionResult {
    let items = match page.text_content() {
        Ok(items) => items,
        Err(err) => {
            warn!(page = page_number, "Native text extraction failed: {err:#}");
            return ExtractionResult::empty(false);
        }
    };
    if items.is_empty() {
        debug!(page = page_number, "Page has no native text items");
        return ExtractionResult::empty(false);
    }

    let (words, full_text) = words_from_items(&items, page_number, viewport);
    debug!(
        page = page_number,
        items = items.len(),
        words = words.len(),
        "Extracted native word boxes"
    );
    ExtractionResult {
        words,
        full_text,
        is_ocr: false,
    }
}

/// Split every item on whitespace and place each word proportionally inside
/// the item's advance width.
pub fn words_from_items(
    items: &[TextItem],
    page_number: usize,
    viewport: &Viewport,
) -> (Vec<WordBox>, String) {
    let page_index = page_number.saturating_sub(1);
    let scale = viewport.scale;
    let mut words = Vec::new();
    let mut full_text = String::new();

    for item in items {
        let char_count = item.text.chars().count();
        if char_count == 0 {
            continue;
        }
        if !item.transform.iter().all(|v| v.is_finite()) || !item.width.is_finite() {
            debug!(text = %item.text, "Skipping text item with non-finite geometry");
            continue;
        }
        if !full_text.is_empty() {
            full_text.push(' ');
        }

        let char_width = item.width / char_count as f32;
        let glyph_height = item_height(item);
        let origin_x = item.transform[4];
        let baseline_y = (viewport.page_height - item.transform[5]) * scale;
        let mut offset = 0usize;

        for (is_space, run) in whitespace_runs(&item.text) {
            let run_chars = run.chars().count();
            full_text.push_str(run);
            if !is_space {
                words.push(WordBox {
                    text: run.to_string(),
                    x: (origin_x + offset as f32 * char_width) * scale,
                    y: baseline_y,
                    w: run_chars as f32 * char_width * scale,
                    h: glyph_height * scale,
                    page_index,
                    sequence_index: words.len(),
                });
            }
            offset += run_chars;
        }
    }

    (words, full_text)
}

fn item_height(item: &TextItem) -> f32 {
    if item.height > 0.0 && item.height.is_finite() {
        return item.height;
    }
    // Fall back to the vertical scale of the text matrix (the font size).
    let [_, _, c, d, _, _] = item.transform;
    c.hypot(d)
}

/// Alternating runs of whitespace and non-whitespace, in order.
fn whitespace_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0usize;
    let mut current: Option<bool> = None;
    for (idx, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        match current {
            Some(kind) if kind == is_space => {}
            Some(kind) => {
                runs.push((kind, &text[start..idx]));
                start = idx;
                current = Some(is_space);
            }
            None => current = Some(is_space),
        }
    }
    if let Some(kind) = current {
        runs.push((kind, &text[start..]));
    }
    runs
}

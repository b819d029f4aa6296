//! Reading-order reconstruction from scattered word boxes.
//!
//! Words whose `y` lies within a small tolerance of a line's first word join
//! that line; lines read top to bottom and words left to right. This is a
//! heuristic, not a column analyzer: multi-column pages interleave, and a
//! tolerance that is too strict or too loose mis-groups OCR lines.

use crate::geometry::WordBox;
use std::cmp::Ordering;
use tracing::trace;

pub const DEFAULT_LINE_TOLERANCE_PX: f32 = 5.0;

#[derive(Debug, Clone, Copy)]
pub struct LayoutOptions {
    pub line_tolerance_px: f32,
    /// Drop lines that are nothing but a number (page numbers).
    pub drop_numeric_lines: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            line_tolerance_px: DEFAULT_LINE_TOLERANCE_PX,
            drop_numeric_lines: true,
        }
    }
}

impl LayoutOptions {
    pub fn from_config(config: &crate::config::ReaderConfig) -> Self {
        Self {
            line_tolerance_px: config.line_tolerance_px.max(0.0),
            drop_numeric_lines: config.drop_numeric_lines,
        }
    }
}

/// Character span of one word inside [`PageLayout::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub word: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageLayout {
    pub text: String,
    pub lines: Vec<Vec<WordBox>>,
    /// One entry per word, in reading order.
    pub spans: Vec<WordSpan>,
}

impl PageLayout {
    pub fn word(&self, span: &WordSpan) -> Option<&WordBox> {
        self.lines.get(span.line)?.get(span.word)
    }

    /// Words in reading order.
    pub fn words(&self) -> impl Iterator<Item = &WordBox> {
        self.lines.iter().flatten()
    }
}

/// Reading-order text with default options.
pub fn reconstruct(words: &[WordBox]) -> String {
    reconstruct_layout(words, &LayoutOptions::default()).text
}

pub fn reconstruct_layout(words: &[WordBox], options: &LayoutOptions) -> PageLayout {
    if words.is_empty() {
        return PageLayout::default();
    }

    let mut sorted: Vec<&WordBox> = words.iter().collect();
    sorted.sort_by(|a, b| by_position(a, b));

    let mut lines: Vec<Vec<WordBox>> = Vec::new();
    let mut anchor_y = f32::NAN;
    for word in sorted {
        match lines.last_mut() {
            Some(line) if (word.y - anchor_y).abs() < options.line_tolerance_px => {
                line.push(word.clone());
            }
            _ => {
                anchor_y = word.y;
                lines.push(vec![word.clone()]);
            }
        }
    }

    let mut layout = PageLayout::default();
    let mut cursor = 0usize;
    for mut line in lines {
        line.sort_by(|a, b| a.x.total_cmp(&b.x));
        let joined = line
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if options.drop_numeric_lines && is_numeric_only(&joined) {
            trace!(line = %joined, "Dropping numeric-only line");
            continue;
        }

        if !layout.text.is_empty() {
            layout.text.push('\n');
            cursor += 1;
        }
        let line_idx = layout.lines.len();
        for (word_idx, word) in line.iter().enumerate() {
            if word_idx > 0 {
                cursor += 1;
            }
            let len = word.text.chars().count();
            layout.spans.push(WordSpan {
                start: cursor,
                end: cursor + len,
                line: line_idx,
                word: word_idx,
            });
            cursor += len;
        }
        layout.text.push_str(&joined);
        layout.lines.push(line);
    }
    layout
}

fn by_position(a: &WordBox, b: &WordBox) -> Ordering {
    a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x))
}

fn is_numeric_only(text: &str) -> bool {
    let mut any = false;
    for ch in text.chars().filter(|c| !c.is_whitespace()) {
        if !ch.is_numeric() {
            return false;
        }
        any = true;
    }
    any
}

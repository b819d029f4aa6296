//! Highlight ranges and the two ways a renderer consumes them.

use crate::layout::PageLayout;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Char offsets `[start, end)` into the text being spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HighlightRange {
    pub start: usize,
    pub end: usize,
}

impl HighlightRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// What produced the current highlight. Network audio only knows where in a
/// chunk playback is, so it moves a one-character cursor; on-device synthesis
/// reports exact word boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export)]
pub enum SpokenHighlight {
    ChunkInterpolated {
        range: HighlightRange,
        chunk_index: usize,
    },
    WordBoundaryExact {
        range: HighlightRange,
    },
}

impl SpokenHighlight {
    pub fn range(&self) -> HighlightRange {
        match self {
            SpokenHighlight::ChunkInterpolated { range, .. } => *range,
            SpokenHighlight::WordBoundaryExact { range } => *range,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, SpokenHighlight::WordBoundaryExact { .. })
    }
}

/// Index (reading order) of the word box under `offset`.
///
/// Walks words accumulating their lengths plus one separator each; an offset
/// landing on a separator resolves to the following word.
pub fn word_index_for_offset(layout: &PageLayout, offset: usize) -> Option<usize> {
    if layout.spans.is_empty() {
        return None;
    }
    layout
        .spans
        .iter()
        .position(|span| offset < span.end)
        .or(Some(layout.spans.len() - 1))
}

/// Char span of the whitespace-delimited token containing `offset` in `text`.
/// Offsets on whitespace resolve to the next token.
pub fn token_span_for_offset(text: &str, offset: usize) -> Option<HighlightRange> {
    let mut start: Option<usize> = None;
    let mut idx = 0usize;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if let Some(token_start) = start.take() {
                if offset < idx {
                    return Some(HighlightRange::new(token_start, idx));
                }
            }
        } else if start.is_none() {
            start = Some(idx);
        }
        idx += 1;
    }
    match start {
        Some(token_start) if offset < idx => Some(HighlightRange::new(token_start, idx)),
        _ => None,
    }
}

//! Chunk offsets and cursor interpolation for streamed speech.

use super::highlight::HighlightRange;
use super::provider::ChunkSource;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackChunk {
    pub text: String,
    pub audio_url: String,
    pub char_start: usize,
    pub char_end: usize,
}

/// Assign each chunk its `[char_start, char_end)` span.
///
/// Spans are cumulative with one separator character assumed between chunks,
/// then clamped to `text_len` so a provider that reshapes segment text can
/// never push a highlight past the end of the source.
pub fn plan_chunks(sources: Vec<ChunkSource>, text_len: usize) -> Vec<PlaybackChunk> {
    let mut cursor = 0usize;
    let mut chunks = Vec::with_capacity(sources.len());
    for source in sources {
        let len = source.text.chars().count();
        let char_start = cursor.min(text_len);
        let char_end = (cursor + len).min(text_len);
        chunks.push(PlaybackChunk {
            text: source.text,
            audio_url: source.audio_url,
            char_start,
            char_end,
        });
        cursor += len + 1;
    }
    chunks
}

/// One-character cursor placed proportionally to `current / duration`.
pub fn interpolate_cursor(
    chunk: &PlaybackChunk,
    current: Duration,
    duration: Duration,
) -> HighlightRange {
    let span = chunk.char_end.saturating_sub(chunk.char_start);
    if span == 0 || duration.is_zero() {
        return HighlightRange::new(chunk.char_start, chunk.char_start);
    }
    let fraction = (current.as_secs_f64() / duration.as_secs_f64()).clamp(0.0, 1.0);
    let offset = ((span as f64) * fraction).floor() as usize;
    let start = chunk.char_start + offset.min(span - 1);
    HighlightRange::new(start, start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text_utils::split_speakable;

    fn source(text: &str) -> ChunkSource {
        ChunkSource {
            text: text.to_string(),
            audio_url: format!("mem://{text}"),
        }
    }

    #[test]
    fn spans_are_cumulative_with_one_char_gap() {
        let chunks = plan_chunks(vec![source("Tere"), source("Kuidas läheb?")], 18);
        assert_eq!((chunks[0].char_start, chunks[0].char_end), (0, 4));
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (5, 18));
    }

    #[test]
    fn split_segments_map_back_onto_source_text() {
        let text = "Wait... Tere?! Pi is 3.14 now";
        let sources = split_speakable(text, 200)
            .iter()
            .map(|segment| source(segment))
            .collect();
        let chunks = plan_chunks(sources, text.chars().count());

        assert_eq!(chunks.len(), 3);
        for chunk in &chunks {
            let slice: String = text
                .chars()
                .skip(chunk.char_start)
                .take(chunk.char_end - chunk.char_start)
                .collect();
            assert_eq!(slice, chunk.text);
        }
    }

    #[test]
    fn spans_never_exceed_source_length() {
        let chunks = plan_chunks(vec![source("abcdef"), source("ghijkl")], 8);
        assert_eq!((chunks[1].char_start, chunks[1].char_end), (7, 8));
    }

    #[test]
    fn cursor_advances_monotonically_to_chunk_end() {
        let chunk = PlaybackChunk {
            text: "Kuidas läheb?".to_string(),
            audio_url: String::new(),
            char_start: 5,
            char_end: 18,
        };
        let duration = Duration::from_millis(1300);
        let mut last = 0usize;
        for ms in (0..=1300).step_by(50) {
            let range = interpolate_cursor(&chunk, Duration::from_millis(ms), duration);
            assert!(range.start >= last);
            assert!(range.start >= 5 && range.end <= 18);
            assert_eq!(range.end, range.start + 1);
            last = range.start;
        }
        assert_eq!(last, 17);
        let past_end = interpolate_cursor(&chunk, Duration::from_secs(9), duration);
        assert_eq!(past_end, HighlightRange::new(17, 18));
    }
}

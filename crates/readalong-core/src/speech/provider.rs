//! Network speech-audio providers.

use crate::text_utils::split_speakable;
use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tracing::debug;

static RE_LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(?:[-_][A-Za-z0-9]{2,8})*$").unwrap());

/// One provider segment and where its audio lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSource {
    pub text: String,
    pub audio_url: String,
}

pub trait SpeechProvider: Send + Sync {
    /// Ordered audio chunks covering `text`.
    fn fetch_chunks(&self, text: &str, language: &str) -> Result<Vec<ChunkSource>>;
}

/// Translate-style TTS endpoint: one GET per segment, `q` = text, `tl` = language.
#[derive(Debug, Clone)]
pub struct TranslateTtsProvider {
    endpoint: Url,
    max_chunk_chars: usize,
}

impl TranslateTtsProvider {
    pub fn new(endpoint: &str, max_chunk_chars: usize) -> Result<Self> {
        let endpoint = Url::parse(endpoint).with_context(|| format!("Invalid TTS endpoint {endpoint}"))?;
        Ok(Self {
            endpoint,
            max_chunk_chars: max_chunk_chars.max(1),
        })
    }

    pub fn from_config(config: &crate::config::ReaderConfig) -> Result<Self> {
        Self::new(&config.tts_endpoint, config.tts_max_chunk_chars)
    }

    fn chunk_url(&self, segment: &str, language: &str, idx: usize, total: usize) -> String {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("tl", language)
            .append_pair("q", segment)
            .append_pair("idx", &idx.to_string())
            .append_pair("total", &total.to_string())
            .append_pair("textlen", &segment.chars().count().to_string());
        url.into()
    }
}

impl SpeechProvider for TranslateTtsProvider {
    fn fetch_chunks(&self, text: &str, language: &str) -> Result<Vec<ChunkSource>> {
        let language = language.trim();
        if !RE_LANGUAGE_TAG.is_match(language) {
            bail!("unsupported language code `{language}`");
        }
        let segments = split_speakable(text, self.max_chunk_chars);
        let total = segments.len();
        debug!(language, segments = total, "Planned TTS segments");
        Ok(segments
            .into_iter()
            .enumerate()
            .map(|(idx, segment)| ChunkSource {
                audio_url: self.chunk_url(&segment, language, idx, total),
                text: segment,
            })
            .collect())
    }
}

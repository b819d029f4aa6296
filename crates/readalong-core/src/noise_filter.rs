//! Noise-token pass for OCR output.
//!
//! Scans pick up margin debris, rules and stray punctuation that read as
//! words. The rules are data (`NoiseFilterConfig`) so they can be tuned
//! without touching the extractor.

use crate::config::NoiseFilterConfig;
use regex::Regex;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone)]
pub struct NoiseFilter {
    min_confidence: f32,
    drop_rules: Vec<Regex>,
    strip_chars: Vec<char>,
    normalize_unicode: bool,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        Self::from_config(&NoiseFilterConfig::default())
    }
}

impl NoiseFilter {
    /// Build the filter; patterns that fail to compile are logged and skipped.
    pub fn from_config(config: &NoiseFilterConfig) -> Self {
        let drop_rules = config
            .drop_patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    warn!(%pattern, "Ignoring invalid noise filter pattern: {err}");
                    None
                }
            })
            .collect();
        Self {
            min_confidence: config.min_confidence,
            drop_rules,
            strip_chars: config.strip_chars.chars().collect(),
            normalize_unicode: config.normalize_unicode,
        }
    }

    /// Cleaned token, or `None` when the token is noise.
    pub fn clean_token(&self, text: &str, confidence: f32) -> Option<String> {
        if confidence < self.min_confidence {
            return None;
        }
        let normalized: String = if self.normalize_unicode {
            text.nfc().collect()
        } else {
            text.to_string()
        };
        let trimmed = normalized
            .trim()
            .trim_matches(|c: char| self.strip_chars.contains(&c))
            .trim();
        if trimmed.is_empty() {
            return None;
        }
        if self.drop_rules.iter().any(|re| re.is_match(trimmed)) {
            return None;
        }
        Some(trimmed.to_string())
    }
}

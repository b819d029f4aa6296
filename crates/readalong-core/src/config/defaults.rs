pub const MIN_PLAYBACK_RATE: f32 = 0.25;
pub const MAX_PLAYBACK_RATE: f32 = 4.0;

pub(crate) fn default_log_level() -> crate::config::LogLevel {
    crate::config::LogLevel::Debug
}

pub(crate) fn default_source_language() -> String {
    "en".to_string()
}

pub(crate) fn default_target_language() -> String {
    "et".to_string()
}

pub(crate) fn default_line_tolerance_px() -> f32 {
    5.0
}

pub(crate) fn default_drop_numeric_lines() -> bool {
    true
}

pub(crate) fn default_frame_interval_ms() -> u64 {
    16
}

pub(crate) fn default_playback_rate() -> f32 {
    1.0
}

pub(crate) fn default_tts_endpoint() -> String {
    "https://translate.google.com/translate_tts?ie=UTF-8&client=tw-ob".to_string()
}

pub(crate) fn default_tts_max_chunk_chars() -> usize {
    200
}

pub(crate) fn default_audio_cache_dir() -> String {
    ".cache/audio".to_string()
}

pub(crate) fn default_min_confidence() -> f32 {
    20.0
}

pub(crate) fn default_drop_patterns() -> Vec<String> {
    vec![
        // Stray punctuation and box-drawing debris from scanned margins.
        r"^[^\p{L}\p{N}]+$".to_string(),
        // Single consonant-like crumbs such as `l` or `|` glued to rules.
        r"^[|lI]$".to_string(),
    ]
}

pub(crate) fn default_strip_chars() -> String {
    "|¦~_".to_string()
}

pub(crate) fn default_normalize_unicode() -> bool {
    true
}

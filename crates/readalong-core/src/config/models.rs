use serde::Deserialize;

/// Runtime configuration; deserializable from TOML.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ReaderConfig {
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
    /// Language of the imported text (ISO 639-1).
    #[serde(default = "crate::config::defaults::default_source_language")]
    pub source_language: String,
    /// Language the learner translates into (ISO 639-1).
    #[serde(default = "crate::config::defaults::default_target_language")]
    pub target_language: String,
    #[serde(default = "crate::config::defaults::default_line_tolerance_px")]
    pub line_tolerance_px: f32,
    #[serde(default = "crate::config::defaults::default_drop_numeric_lines")]
    pub drop_numeric_lines: bool,
    #[serde(default = "crate::config::defaults::default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "crate::config::defaults::default_playback_rate")]
    pub playback_rate: f32,
    #[serde(default = "crate::config::defaults::default_tts_endpoint")]
    pub tts_endpoint: String,
    #[serde(default = "crate::config::defaults::default_tts_max_chunk_chars")]
    pub tts_max_chunk_chars: usize,
    #[serde(default = "crate::config::defaults::default_audio_cache_dir")]
    pub audio_cache_dir: String,
    #[serde(default)]
    pub noise_filter: NoiseFilterConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            log_level: crate::config::defaults::default_log_level(),
            source_language: crate::config::defaults::default_source_language(),
            target_language: crate::config::defaults::default_target_language(),
            line_tolerance_px: crate::config::defaults::default_line_tolerance_px(),
            drop_numeric_lines: crate::config::defaults::default_drop_numeric_lines(),
            frame_interval_ms: crate::config::defaults::default_frame_interval_ms(),
            playback_rate: crate::config::defaults::default_playback_rate(),
            tts_endpoint: crate::config::defaults::default_tts_endpoint(),
            tts_max_chunk_chars: crate::config::defaults::default_tts_max_chunk_chars(),
            audio_cache_dir: crate::config::defaults::default_audio_cache_dir(),
            noise_filter: NoiseFilterConfig::default(),
        }
    }
}

impl ReaderConfig {
    pub fn clamped_playback_rate(&self) -> f32 {
        clamp_rate(self.playback_rate)
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

pub(crate) fn clamp_rate(rate: f32) -> f32 {
    if !rate.is_finite() {
        return crate::config::defaults::default_playback_rate();
    }
    rate.clamp(
        crate::config::defaults::MIN_PLAYBACK_RATE,
        crate::config::defaults::MAX_PLAYBACK_RATE,
    )
}

/// Rules for the OCR noise-token pass.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct NoiseFilterConfig {
    /// Words recognized below this confidence (0..=100) are dropped.
    #[serde(default = "crate::config::defaults::default_min_confidence")]
    pub min_confidence: f32,
    /// Regexes; a word matching any of them is dropped.
    #[serde(default = "crate::config::defaults::default_drop_patterns")]
    pub drop_patterns: Vec<String>,
    /// Characters trimmed from both ends of each word.
    #[serde(default = "crate::config::defaults::default_strip_chars")]
    pub strip_chars: String,
    #[serde(default = "crate::config::defaults::default_normalize_unicode")]
    pub normalize_unicode: bool,
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        NoiseFilterConfig {
            min_confidence: crate::config::defaults::default_min_confidence(),
            drop_patterns: crate::config::defaults::default_drop_patterns(),
            strip_chars: crate::config::defaults::default_strip_chars(),
            normalize_unicode: crate::config::defaults::default_normalize_unicode(),
        }
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

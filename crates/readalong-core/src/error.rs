//! Error kinds callers need to tell apart.
//!
//! Everything else travels as `anyhow::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// The render was superseded by a newer request. Expected, never surfaced.
    #[error("render cancelled")]
    Cancelled,
    #[error("render failed: {0}")]
    Failed(#[from] anyhow::Error),
}

impl RenderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    /// The on-device engine has no voice for the language; it refuses rather
    /// than reading with the wrong accent.
    #[error("no on-device voice available for language `{0}`")]
    NoVoice(String),
    #[error("speech synthesis interrupted")]
    Interrupted,
    #[error("speech synthesis canceled")]
    Canceled,
    #[error("speech provider failed: {0}")]
    Provider(String),
    #[error("audio playback failed: {0}")]
    Playback(String),
    #[error("speech synthesis failed: {0}")]
    Synthesis(String),
}

impl SpeechError {
    /// Interruptions caused by our own stop/supersede calls.
    pub fn is_interruption(&self) -> bool {
        matches!(self, SpeechError::Interrupted | SpeechError::Canceled)
    }
}

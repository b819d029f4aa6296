//! Contract for an on-device speech-synthesis engine.

use crate::error::SpeechError;
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP-47 tag such as `et-EE`.
    pub lang: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Voice,
    pub rate: f32,
}

#[derive(Debug)]
pub enum SynthesisEvent {
    /// Word boundary; char offsets into the utterance text.
    Boundary { char_index: usize, char_length: usize },
    End,
    Error(SpeechError),
}

pub trait SynthesisEngine: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Start speaking. Events for this utterance arrive on `events`; a
    /// cancelled utterance reports `SpeechError::Canceled`.
    fn speak(
        &self,
        utterance: Utterance,
        events: Sender<SynthesisEvent>,
    ) -> anyhow::Result<Box<dyn SynthesisControl>>;
}

pub trait SynthesisControl: Send + Sync {
    fn pause(&self);
    fn resume(&self);
    fn cancel(&self);
}

/// First voice whose language matches `language` by primary subtag.
///
/// An exact tag match wins over a prefix match (`et-EE` for `et-EE` before
/// `et` for `et-EE`).
pub fn find_voice(voices: &[Voice], language: &str) -> Option<Voice> {
    let wanted = language.trim().replace('_', "-").to_ascii_lowercase();
    if wanted.is_empty() {
        return None;
    }
    let primary = wanted.split('-').next().unwrap_or(&wanted).to_string();
    let normalized = |voice: &Voice| voice.lang.replace('_', "-").to_ascii_lowercase();

    voices
        .iter()
        .find(|voice| normalized(voice) == wanted)
        .or_else(|| {
            voices.iter().find(|voice| {
                let lang = normalized(voice);
                lang == primary || lang.starts_with(&format!("{primary}-"))
            })
        })
        .cloned()
}

//! One open PDF: page pipeline plus read-along speech.

use crate::config::ReaderConfig;
use crate::document::PdfDocument;
use crate::geometry::WordBox;
use crate::layout::LayoutOptions;
use crate::noise_filter::NoiseFilter;
use crate::ocr::{OcrExtractor, RecognitionEngine};
use crate::render::{PageState, RenderCoordinator};
use crate::speech::highlight::{SpokenHighlight, word_index_for_offset};
use crate::speech::synchronizer::{SpeakHandle, SpeechSynchronizer};
use anyhow::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};
use ts_rs::TS;

/// Everything the page view draws from.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct ReaderSnapshot {
    pub page_number: Option<usize>,
    pub words: Vec<WordBox>,
    pub page_text: String,
    pub is_ocr: bool,
    pub rendering: bool,
    pub ocr_running: bool,
    pub ocr_progress_pct: u8,
    pub highlight: Option<SpokenHighlight>,
    pub is_speaking: bool,
    pub is_paused: bool,
    pub error: Option<String>,
}

impl ReaderSnapshot {
    /// JSON for the web view bridge.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub struct PdfReader {
    coordinator: RenderCoordinator,
    speech: SpeechSynchronizer,
    language: String,
    /// Page revision whose text is being spoken.
    spoken_revision: Mutex<Option<u64>>,
}

impl PdfReader {
    pub fn new(
        document: Arc<dyn PdfDocument>,
        ocr_engine: Option<Arc<dyn RecognitionEngine>>,
        speech: SpeechSynchronizer,
        config: &ReaderConfig,
    ) -> Self {
        let ocr = ocr_engine.map(|engine| {
            OcrExtractor::new(
                engine,
                &[
                    config.source_language.as_str(),
                    config.target_language.as_str(),
                ],
                NoiseFilter::from_config(&config.noise_filter),
            )
        });
        info!(
            pages = document.page_count(),
            language = %config.source_language,
            ocr = ocr.is_some(),
            "Opened PDF reader"
        );
        Self {
            coordinator: RenderCoordinator::new(document, ocr, LayoutOptions::from_config(config)),
            speech,
            language: config.source_language.clone(),
            spoken_revision: Mutex::new(None),
        }
    }

    pub fn page_count(&self) -> usize {
        self.coordinator.page_count()
    }

    pub fn request_render(&self, page_number: usize, scale: f32) -> Result<()> {
        self.coordinator.request_render(page_number, scale)
    }

    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.coordinator.wait_idle(timeout)
    }

    pub fn page(&self) -> PageState {
        self.coordinator.snapshot()
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        let page = self.coordinator.snapshot();
        ReaderSnapshot {
            page_number: page.request.map(|request| request.page_number),
            page_text: page.layout.text.clone(),
            words: page.words,
            is_ocr: page.is_ocr,
            rendering: page.rendering,
            ocr_running: page.ocr_running,
            ocr_progress_pct: (page.ocr_progress.clamp(0.0, 1.0) * 100.0).round() as u8,
            highlight: self.speech.highlight(),
            is_speaking: self.speech.is_speaking(),
            is_paused: self.speech.is_paused(),
            error: page.error,
        }
    }

    /// Read the current page aloud. Returns `None` when the page has no text.
    pub fn speak_page(&self, on_end: impl FnOnce() + Send + 'static) -> Option<SpeakHandle> {
        let page = self.coordinator.snapshot();
        if page.layout.text.trim().is_empty() {
            debug!("Current page has no text to speak");
            return None;
        }
        *self
            .spoken_revision
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(page.revision);
        Some(self.speech.speak(page.layout.text, &self.language, on_end))
    }

    pub fn pause_speaking(&self) {
        self.speech.pause_speaking();
    }

    pub fn resume_speaking(&self) {
        self.speech.resume_speaking();
    }

    pub fn stop_speaking(&self) {
        self.speech.stop_speaking();
    }

    pub fn set_playback_rate(&self, rate: f32) {
        self.speech.set_playback_rate(rate);
    }

    pub fn pronounce(&self, word: &str) -> SpeakHandle {
        self.speech.pronounce(word, &self.language)
    }

    /// Word box under the spoken highlight, if the spoken text is still the
    /// page on screen.
    pub fn highlighted_word(&self) -> Option<WordBox> {
        let range = self.speech.highlight_range()?;
        let page = self.coordinator.snapshot();
        let spoken = *self
            .spoken_revision
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if spoken != Some(page.revision) {
            return None;
        }
        let idx = word_index_for_offset(&page.layout, range.start)?;
        let span = page.layout.spans.get(idx)?;
        page.layout.word(span).cloned()
    }

    pub fn speech(&self) -> &SpeechSynchronizer {
        &self.speech
    }
}

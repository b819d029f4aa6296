//! OCR fallback for pages without a native text layer.
//!
//! Recognition runs on the bitmap the coordinator just rendered, so the
//! engine's pixel boxes are already in viewport space. Workers are torn down
//! on every exit path, including failures.

use crate::geometry::{ExtractionResult, WordBox};
use crate::noise_filter::NoiseFilter;
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Axis-aligned box in bitmap pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedWord {
    pub text: String,
    pub bbox: BoundingBox,
    /// 0..=100
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Recognition {
    pub words: Vec<RecognizedWord>,
    pub text: String,
    pub confidence: f32,
}

pub trait RecognitionEngine: Send + Sync {
    /// Spin up a worker loaded with the given engine language codes.
    fn create_worker(&self, languages: &[String]) -> anyhow::Result<Box<dyn RecognitionWorker>>;
}

pub trait RecognitionWorker: Send {
    /// Recognize `bitmap`, calling `progress` with fractions in `0.0..=1.0`.
    fn recognize(
        &mut self,
        bitmap: &RgbaImage,
        progress: &mut dyn FnMut(f32),
    ) -> anyhow::Result<Recognition>;

    fn terminate(&mut self);
}

/// Terminates the worker when dropped.
struct WorkerGuard(Box<dyn RecognitionWorker>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.terminate();
        debug!("Terminated OCR worker");
    }
}

/// Map an app language (ISO 639-1) to the recognition engine's code.
pub fn ocr_language_code(lang: &str) -> String {
    let primary = lang
        .split(['-', '_'])
        .next()
        .unwrap_or(lang)
        .to_ascii_lowercase();
    let code = match primary.as_str() {
        "en" => "eng",
        "et" => "est",
        "fi" => "fin",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        "ru" => "rus",
        "lv" => "lav",
        "lt" => "lit",
        "sv" => "swe",
        "it" => "ita",
        "pt" => "por",
        "pl" => "pol",
        "uk" => "ukr",
        _ => return primary,
    };
    code.to_string()
}

#[derive(Clone)]
pub struct OcrExtractor {
    engine: Arc<dyn RecognitionEngine>,
    languages: Vec<String>,
    filter: NoiseFilter,
}

impl OcrExtractor {
    /// `languages` are app codes; duplicates (same source and target) collapse.
    pub fn new(engine: Arc<dyn RecognitionEngine>, languages: &[&str], filter: NoiseFilter) -> Self {
        let mut codes: Vec<String> = Vec::new();
        for lang in languages {
            let code = ocr_language_code(lang);
            if !code.is_empty() && !codes.contains(&code) {
                codes.push(code);
            }
        }
        Self {
            engine,
            languages: codes,
            filter,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Recognize words on a rendered page. Failures degrade to an empty result.
    pub fn extract_via_ocr(
        &self,
        bitmap: &RgbaImage,
        page_number: usize,
        progress: &mut dyn FnMut(f32),
    ) -> ExtractionResult {
        info!(
            page = page_number,
            width = bitmap.width(),
            height = bitmap.height(),
            languages = %self.languages.join("+"),
            "Running OCR"
        );
        let worker = match self.engine.create_worker(&self.languages) {
            Ok(worker) => worker,
            Err(err) => {
                warn!(page = page_number, "Failed to start OCR worker: {err:#}");
                return ExtractionResult::empty(true);
            }
        };
        let mut guard = WorkerGuard(worker);
        let mut report = |fraction: f32| {
            let fraction = if fraction.is_finite() {
                fraction.clamp(0.0, 1.0)
            } else {
                0.0
            };
            progress(fraction);
        };

        let recognition = match guard.0.recognize(bitmap, &mut report) {
            Ok(recognition) => recognition,
            Err(err) => {
                warn!(page = page_number, "OCR recognition failed: {err:#}");
                return ExtractionResult::empty(true);
            }
        };
        drop(guard);

        let result = self.to_extraction(recognition, page_number);
        info!(
            page = page_number,
            words = result.words.len(),
            "OCR finished"
        );
        result
    }

    fn to_extraction(&self, recognition: Recognition, page_number: usize) -> ExtractionResult {
        let page_index = page_number.saturating_sub(1);
        let total = recognition.words.len();
        let mut words = Vec::with_capacity(total);
        for word in recognition.words {
            let Some(text) = self.filter.clean_token(&word.text, word.confidence) else {
                continue;
            };
            let BoundingBox { x0, y0, x1, y1 } = word.bbox;
            words.push(WordBox {
                text,
                x: x0.min(x1),
                y: y0.min(y1),
                w: (x1 - x0).abs(),
                h: (y1 - y0).abs(),
                page_index,
                sequence_index: words.len(),
            });
        }
        if words.len() < total {
            debug!(
                page = page_number,
                dropped = total - words.len(),
                "Noise filter removed OCR tokens"
            );
        }
        let full_text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        ExtractionResult {
            words,
            full_text,
            is_ocr: true,
        }
    }
}

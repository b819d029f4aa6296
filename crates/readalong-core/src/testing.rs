//! In-crate fakes for the collaborators the pipeline talks to.

use crate::cancellation::CancellationToken;
use crate::document::{PdfDocument, PdfPage};
use crate::error::{RenderError, SpeechError};
use crate::geometry::{TextItem, Viewport};
use crate::ocr::{BoundingBox, Recognition, RecognitionEngine, RecognitionWorker, RecognizedWord};
use crate::speech::audio::{AudioBackend, AudioClip};
use crate::speech::provider::{ChunkSource, SpeechProvider};
use crate::speech::synthesis::{
    SynthesisControl, SynthesisEngine, SynthesisEvent, Utterance, Voice,
};
use crate::text_utils::split_speakable;
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const PAGE_WIDTH: f32 = 200.0;
pub const PAGE_HEIGHT: f32 = 300.0;

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// Counts calls; handy as an `on_end` spy.
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn hook(&self) -> impl FnOnce() + Send + 'static {
        let count = Arc::clone(&self.0);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// PDF

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    RenderStarted(usize),
    RenderCancelled(usize),
    RenderFinished(usize),
    TextRequested(usize),
}

#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    pub items: Vec<TextItem>,
    pub fail_render: bool,
}

/// One line of text items at PDF baseline `y`, laid left to right.
pub fn line_items(words: &[&str], y: f32) -> Vec<TextItem> {
    let mut x = 10.0;
    words
        .iter()
        .map(|word| {
            let width = word.chars().count() as f32 * 6.0;
            let item = TextItem {
                text: word.to_string(),
                transform: [10.0, 0.0, 0.0, 10.0, x, y],
                width,
                height: 10.0,
            };
            x += width + 6.0;
            item
        })
        .collect()
}

pub fn text_page(words: &[&str]) -> PageSpec {
    PageSpec {
        items: line_items(words, 250.0),
        fail_render: false,
    }
}

pub struct FakeDocument {
    pages: Vec<Arc<FakePage>>,
    released: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<PageEvent>>>,
}

pub struct FakePage {
    number: usize,
    spec: PageSpec,
    released: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<PageEvent>>>,
}

impl FakeDocument {
    /// Renders block until [`FakeDocument::release`] when `gated`.
    pub fn new(specs: Vec<PageSpec>, gated: bool) -> Arc<Self> {
        let released = Arc::new(AtomicBool::new(!gated));
        let log = Arc::new(Mutex::new(Vec::new()));
        let pages = specs
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| {
                Arc::new(FakePage {
                    number: idx + 1,
                    spec,
                    released: Arc::clone(&released),
                    log: Arc::clone(&log),
                })
            })
            .collect();
        Arc::new(Self {
            pages,
            released,
            log,
        })
    }

    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn render_started(&self, page: usize) -> bool {
        self.events().contains(&PageEvent::RenderStarted(page))
    }

    pub fn text_requests(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PageEvent::TextRequested(page) => Some(page),
                _ => None,
            })
            .collect()
    }
}

impl PdfDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, page_number: usize) -> anyhow::Result<Arc<dyn PdfPage>> {
        let page = self
            .pages
            .get(page_number.wrapping_sub(1))
            .ok_or_else(|| anyhow::anyhow!("no page {page_number}"))?;
        Ok(Arc::clone(page) as Arc<dyn PdfPage>)
    }
}

impl FakePage {
    fn record(&self, event: PageEvent) {
        self.log.lock().unwrap().push(event);
    }
}

impl PdfPage for FakePage {
    fn viewport(&self, scale: f32) -> Viewport {
        Viewport::new(PAGE_WIDTH, PAGE_HEIGHT, scale)
    }

    fn text_content(&self) -> anyhow::Result<Vec<TextItem>> {
        self.record(PageEvent::TextRequested(self.number));
        Ok(self.spec.items.clone())
    }

    fn render(
        &self,
        viewport: &Viewport,
        cancel: &CancellationToken,
    ) -> Result<RgbaImage, RenderError> {
        self.record(PageEvent::RenderStarted(self.number));
        loop {
            if cancel.check_cancelled("paint").is_err() {
                self.record(PageEvent::RenderCancelled(self.number));
                return Err(RenderError::Cancelled);
            }
            if self.released.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        if self.spec.fail_render {
            return Err(RenderError::Failed(anyhow::anyhow!(
                "corrupt content on page {}",
                self.number
            )));
        }
        self.record(PageEvent::RenderFinished(self.number));
        Ok(RgbaImage::new(viewport.pixel_width(), viewport.pixel_height()))
    }
}

// ---------------------------------------------------------------------------
// OCR

/// Scripted engine recording how workers were used.
#[derive(Default)]
pub struct ScriptedEngine {
    pub fail_create: bool,
    pub fail_recognize: bool,
    pub words: Vec<RecognizedWord>,
    pub created: AtomicUsize,
    pub terminated: Arc<AtomicUsize>,
    pub languages_seen: Mutex<Vec<String>>,
    /// While set, recognition waits halfway through.
    pub hold: Arc<AtomicBool>,
}

struct ScriptedWorker {
    fail: bool,
    words: Vec<RecognizedWord>,
    terminated: Arc<AtomicUsize>,
    hold: Arc<AtomicBool>,
}

impl RecognitionEngine for ScriptedEngine {
    fn create_worker(&self, languages: &[String]) -> anyhow::Result<Box<dyn RecognitionWorker>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        *self.languages_seen.lock().unwrap() = languages.to_vec();
        if self.fail_create {
            anyhow::bail!("no traineddata");
        }
        Ok(Box::new(ScriptedWorker {
            fail: self.fail_recognize,
            words: self.words.clone(),
            terminated: Arc::clone(&self.terminated),
            hold: Arc::clone(&self.hold),
        }))
    }
}

impl RecognitionWorker for ScriptedWorker {
    fn recognize(
        &mut self,
        _bitmap: &RgbaImage,
        progress: &mut dyn FnMut(f32),
    ) -> anyhow::Result<Recognition> {
        progress(0.0);
        progress(0.5);
        wait_until(Duration::from_secs(5), || !self.hold.load(Ordering::SeqCst));
        if self.fail {
            anyhow::bail!("engine crashed");
        }
        progress(1.0);
        Ok(Recognition {
            text: String::new(),
            words: self.words.clone(),
            confidence: 90.0,
        })
    }

    fn terminate(&mut self) {
        self.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn word(text: &str, x0: f32, y0: f32, x1: f32, y1: f32, confidence: f32) -> RecognizedWord {
    RecognizedWord {
        text: text.to_string(),
        bbox: BoundingBox { x0, y0, x1, y1 },
        confidence,
    }
}

// ---------------------------------------------------------------------------
// Speech provider

/// Splits like the translate provider unless a text has scripted chunks.
#[derive(Default)]
pub struct ScriptedProvider {
    failing: bool,
    scripted: Mutex<HashMap<String, Vec<ChunkSource>>>,
    gates: Mutex<HashMap<String, Arc<AtomicBool>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_chunks(self, text: &str, chunks: &[(&str, &str)]) -> Self {
        self.scripted.lock().unwrap().insert(
            text.to_string(),
            chunks
                .iter()
                .map(|(segment, url)| ChunkSource {
                    text: segment.to_string(),
                    audio_url: url.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Fetches for `text` block until the returned flag is set.
    pub fn gate(&self, text: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.gates
            .lock()
            .unwrap()
            .insert(text.to_string(), Arc::clone(&flag));
        flag
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl SpeechProvider for ScriptedProvider {
    fn fetch_chunks(&self, text: &str, _language: &str) -> anyhow::Result<Vec<ChunkSource>> {
        self.calls.lock().unwrap().push(text.to_string());
        let gate = self.gates.lock().unwrap().get(text).cloned();
        if let Some(gate) = gate {
            while !gate.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
        }
        if self.failing {
            anyhow::bail!("provider unreachable");
        }
        if let Some(chunks) = self.scripted.lock().unwrap().get(text) {
            return Ok(chunks.clone());
        }
        Ok(split_speakable(text, 200)
            .into_iter()
            .map(|segment| ChunkSource {
                audio_url: format!("mem://{segment}"),
                text: segment,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Audio

#[derive(Debug, Clone, Copy)]
pub enum ClipMode {
    /// Each `current_time` poll while playing advances by `step`.
    Auto { duration: Duration, step: Duration },
    /// Position only moves through [`FakeClip::finish`].
    Manual { duration: Duration },
}

pub struct FakeAudio {
    mode: ClipMode,
    clips: Mutex<Vec<Arc<FakeClip>>>,
    failing_urls: Mutex<HashSet<String>>,
    /// `(url, previous clip had ended)` per load.
    load_log: Mutex<Vec<(String, bool)>>,
}

impl FakeAudio {
    pub fn new(mode: ClipMode) -> Self {
        Self {
            mode,
            clips: Mutex::new(Vec::new()),
            failing_urls: Mutex::new(HashSet::new()),
            load_log: Mutex::new(Vec::new()),
        }
    }

    pub fn auto() -> Self {
        Self::new(ClipMode::Auto {
            duration: Duration::from_millis(40),
            step: Duration::from_millis(10),
        })
    }

    pub fn manual() -> Self {
        Self::new(ClipMode::Manual {
            duration: Duration::from_secs(1),
        })
    }

    pub fn fail_url(&self, url: &str) {
        self.failing_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn clips(&self) -> Vec<Arc<FakeClip>> {
        self.clips.lock().unwrap().clone()
    }

    pub fn clip(&self, idx: usize) -> Option<Arc<FakeClip>> {
        self.clips.lock().unwrap().get(idx).cloned()
    }

    pub fn loaded_urls(&self) -> Vec<String> {
        self.load_log
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn load_log(&self) -> Vec<(String, bool)> {
        self.load_log.lock().unwrap().clone()
    }
}

impl AudioBackend for FakeAudio {
    fn load(&self, url: &str) -> anyhow::Result<Arc<dyn AudioClip>> {
        if self.failing_urls.lock().unwrap().contains(url) {
            anyhow::bail!("404 for {url}");
        }
        let mut clips = self.clips.lock().unwrap();
        let previous_ended = clips.last().map(|clip| clip.is_ended()).unwrap_or(true);
        self.load_log
            .lock()
            .unwrap()
            .push((url.to_string(), previous_ended));
        let (duration, step) = match self.mode {
            ClipMode::Auto { duration, step } => (duration, Some(step)),
            ClipMode::Manual { duration } => (duration, None),
        };
        let clip = Arc::new(FakeClip {
            url: url.to_string(),
            duration,
            step,
            state: Mutex::new(FakeClipState {
                position: Duration::ZERO,
                paused: true,
                stopped: false,
                ended: false,
                rate: 1.0,
                play_calls: 0,
            }),
        });
        clips.push(Arc::clone(&clip));
        Ok(clip)
    }
}

#[derive(Debug)]
struct FakeClipState {
    position: Duration,
    paused: bool,
    stopped: bool,
    ended: bool,
    rate: f32,
    play_calls: usize,
}

pub struct FakeClip {
    pub url: String,
    duration: Duration,
    step: Option<Duration>,
    state: Mutex<FakeClipState>,
}

impl FakeClip {
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.position = self.duration;
        state.ended = true;
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().unwrap().play_calls
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().unwrap().stopped
    }

    pub fn rate(&self) -> f32 {
        self.state.lock().unwrap().rate
    }
}

impl AudioClip for FakeClip {
    fn play(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.stopped {
            anyhow::bail!("clip stopped");
        }
        state.paused = false;
        state.play_calls += 1;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopped = true;
        state.paused = true;
    }

    fn set_rate(&self, rate: f32) {
        self.state.lock().unwrap().rate = rate;
    }

    fn current_time(&self) -> Duration {
        let mut state = self.state.lock().unwrap();
        if let Some(step) = self.step {
            if !state.paused && !state.stopped && !state.ended {
                state.position = (state.position + step).min(self.duration);
                if state.position >= self.duration {
                    state.ended = true;
                }
            }
        }
        state.position
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.duration)
    }

    fn is_ended(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.ended || state.stopped
    }
}

// ---------------------------------------------------------------------------
// On-device synthesis

pub fn voice(name: &str, lang: &str) -> Voice {
    Voice {
        name: name.to_string(),
        lang: lang.to_string(),
    }
}

/// Emits a boundary per whitespace-separated word, then `End`. With `hold`
/// it keeps speaking until cancelled.
pub struct FakeSynthesis {
    voices: Vec<Voice>,
    hold: bool,
    utterances: Mutex<Vec<Utterance>>,
    cancelled: Arc<AtomicUsize>,
}

impl FakeSynthesis {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            hold: false,
            utterances: Mutex::new(Vec::new()),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn holding(voices: Vec<Voice>) -> Self {
        Self {
            hold: true,
            ..Self::new(voices)
        }
    }

    pub fn utterances(&self) -> Vec<Utterance> {
        self.utterances.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct FakeControl {
    cancelled: Arc<AtomicBool>,
    cancel_count: Arc<AtomicUsize>,
}

impl SynthesisControl for FakeControl {
    fn pause(&self) {}

    fn resume(&self) {}

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.cancel_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl SynthesisEngine for FakeSynthesis {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(
        &self,
        utterance: Utterance,
        events: Sender<SynthesisEvent>,
    ) -> anyhow::Result<Box<dyn SynthesisControl>> {
        self.utterances.lock().unwrap().push(utterance.clone());
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let hold = self.hold;
        thread::spawn(move || {
            let mut boundaries = Vec::new();
            let mut start: Option<usize> = None;
            let mut idx = 0usize;
            for ch in utterance.text.chars() {
                if ch.is_whitespace() {
                    if let Some(s) = start.take() {
                        boundaries.push((s, idx - s));
                    }
                } else if start.is_none() {
                    start = Some(idx);
                }
                idx += 1;
            }
            if let Some(s) = start {
                boundaries.push((s, idx - s));
            }
            for (char_index, char_length) in boundaries {
                if flag.load(Ordering::SeqCst) {
                    let _ = events.send(SynthesisEvent::Error(SpeechError::Canceled));
                    return;
                }
                let _ = events.send(SynthesisEvent::Boundary {
                    char_index,
                    char_length,
                });
                thread::sleep(Duration::from_millis(2));
            }
            while hold && !flag.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            if flag.load(Ordering::SeqCst) {
                let _ = events.send(SynthesisEvent::Error(SpeechError::Canceled));
            } else {
                let _ = events.send(SynthesisEvent::End);
            }
        });
        Ok(Box::new(FakeControl {
            cancelled,
            cancel_count: Arc::clone(&self.cancelled),
        }))
    }
}

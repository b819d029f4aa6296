//! Speaks text and keeps a highlight in step with the audio.
//!
//! Every `speak` call advances a session generation. Work running on behalf
//! of an older session checks its token under the state lock before it
//! touches anything shared, so a superseded session can neither move the
//! highlight nor fire its end callback.

use super::audio::{AudioBackend, AudioClip};
use super::chunks::{PlaybackChunk, interpolate_cursor, plan_chunks};
use super::highlight::{HighlightRange, SpokenHighlight};
use super::provider::SpeechProvider;
use super::synthesis::{
    SynthesisControl, SynthesisEngine, SynthesisEvent, Utterance, find_voice,
};
use crate::cancellation::Generation;
use crate::config::{ReaderConfig, clamp_rate};
use crate::error::SpeechError;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Chunked,
    OnDevice,
}

/// Read-only view of the session currently owning playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub token: u64,
    pub chunks: Vec<PlaybackChunk>,
    pub current_chunk_index: usize,
    pub rate: f32,
    pub state: PlaybackState,
    pub mode: Option<PlaybackMode>,
}

#[derive(Debug, Clone, Copy)]
pub struct SynchronizerOptions {
    /// How often a playing clip is polled for its position.
    pub frame_interval: Duration,
    pub rate: f32,
}

impl Default for SynchronizerOptions {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(16),
            rate: 1.0,
        }
    }
}

impl SynchronizerOptions {
    pub fn from_config(config: &ReaderConfig) -> Self {
        Self {
            frame_interval: config.frame_interval(),
            rate: config.clamped_playback_rate(),
        }
    }
}

pub type HighlightListener = Arc<dyn Fn(Option<SpokenHighlight>) + Send + Sync>;

/// Join handle for a speech thread. Dropping it detaches the thread.
#[derive(Debug)]
pub struct SpeakHandle {
    join: Option<JoinHandle<()>>,
}

impl SpeakHandle {
    pub fn wait(self) {
        if let Some(join) = self.join {
            if join.join().is_err() {
                error!("Speech thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

#[derive(Clone)]
pub struct SpeechSynchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn SpeechProvider>,
    audio: Arc<dyn AudioBackend>,
    synthesis: Option<Arc<dyn SynthesisEngine>>,
    generation: Generation,
    frame_interval: Duration,
    state: Mutex<SyncState>,
    listener: Mutex<Option<HighlightListener>>,
    /// Held while the listener runs, so a stale highlight can never be
    /// delivered after the `None` that cleared it.
    delivery: Mutex<()>,
}

struct SyncState {
    playback: PlaybackState,
    rate: f32,
    highlight: Option<SpokenHighlight>,
    clip: Option<Arc<dyn AudioClip>>,
    synthesis: Option<Arc<dyn SynthesisControl>>,
    session: Option<ActiveSession>,
}

struct ActiveSession {
    token: u64,
    chunks: Vec<PlaybackChunk>,
    current_chunk_index: usize,
    mode: Option<PlaybackMode>,
}

enum Completion {
    Finished,
    Superseded,
}

enum SessionOutcome {
    Finished,
    Superseded,
    /// Nothing could speak the text; the session ends silently.
    Unavailable,
}

struct ChunkFailure {
    resume_at: usize,
    error: SpeechError,
}

impl SpeechSynchronizer {
    pub fn new(
        provider: Arc<dyn SpeechProvider>,
        audio: Arc<dyn AudioBackend>,
        synthesis: Option<Arc<dyn SynthesisEngine>>,
        options: SynchronizerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                audio,
                synthesis,
                generation: Generation::new(),
                frame_interval: options.frame_interval.max(Duration::from_millis(1)),
                state: Mutex::new(SyncState {
                    playback: PlaybackState::Idle,
                    rate: clamp_rate(options.rate),
                    highlight: None,
                    clip: None,
                    synthesis: None,
                    session: None,
                }),
                listener: Mutex::new(None),
                delivery: Mutex::new(()),
            }),
        }
    }

    /// Called with every highlight change, and with `None` when the
    /// highlight is cleared. The listener must not call back into the
    /// synchronizer's playback controls.
    pub fn set_highlight_listener(
        &self,
        listener: impl Fn(Option<SpokenHighlight>) + Send + Sync + 'static,
    ) {
        *self
            .inner
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(listener));
    }

    /// Start speaking `text`, superseding whatever was playing.
    ///
    /// `on_end` runs once if this session reaches its natural end (or ends
    /// silently because nothing could speak it). It never runs for a session
    /// that was stopped or superseded.
    pub fn speak(
        &self,
        text: impl Into<String>,
        language: &str,
        on_end: impl FnOnce() + Send + 'static,
    ) -> SpeakHandle {
        let text = text.into();
        let language = language.to_string();
        let token = self.inner.begin_session();
        info!(token, %language, chars = text.chars().count(), "Starting speech session");

        let inner = Arc::clone(&self.inner);
        let on_end: Box<dyn FnOnce() + Send> = Box::new(on_end);
        let spawned = thread::Builder::new()
            .name(format!("speech-{token}"))
            .spawn(move || inner.run_session(token, text, language, on_end));
        match spawned {
            Ok(join) => SpeakHandle { join: Some(join) },
            Err(err) => {
                error!(token, "Failed to spawn speech thread: {err}");
                self.inner.finish(token);
                SpeakHandle { join: None }
            }
        }
    }

    pub fn pause_speaking(&self) {
        let mut state = self.inner.lock_state();
        if state.playback != PlaybackState::Playing {
            return;
        }
        if let Some(clip) = &state.clip {
            clip.pause();
        }
        if let Some(control) = &state.synthesis {
            control.pause();
        }
        state.playback = PlaybackState::Paused;
        debug!(token = self.inner.generation.current(), "Speech paused");
    }

    pub fn resume_speaking(&self) {
        let mut state = self.inner.lock_state();
        if state.playback != PlaybackState::Paused {
            return;
        }
        if let Some(clip) = &state.clip {
            if let Err(err) = clip.play() {
                warn!("Failed to resume audio clip: {err:#}");
            }
        }
        if let Some(control) = &state.synthesis {
            control.resume();
        }
        state.playback = PlaybackState::Playing;
        debug!(token = self.inner.generation.current(), "Speech resumed");
    }

    /// Stop playback and clear the highlight. The stopped session's
    /// `on_end` is not called.
    pub fn stop_speaking(&self) {
        let token = self.inner.generation.advance();
        {
            let mut state = self.inner.lock_state();
            teardown(&mut state);
            state.playback = PlaybackState::Stopped;
        }
        info!(token, "Speech stopped");
        self.inner.notify(token, None);
    }

    /// Clamp and apply a new playback rate, including to the clip in flight.
    pub fn set_playback_rate(&self, rate: f32) {
        let rate = clamp_rate(rate);
        let mut state = self.inner.lock_state();
        state.rate = rate;
        if let Some(clip) = &state.clip {
            clip.set_rate(rate);
        }
        debug!(rate, "Playback rate set");
    }

    pub fn playback_rate(&self) -> f32 {
        self.inner.lock_state().rate
    }

    /// Speak a single word without touching session state, highlight or
    /// the active playback token.
    pub fn pronounce(&self, text: impl Into<String>, language: &str) -> SpeakHandle {
        let text = text.into();
        let language = language.to_string();
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("pronounce".to_string())
            .spawn(move || inner.pronounce_once(&text, &language));
        match spawned {
            Ok(join) => SpeakHandle { join: Some(join) },
            Err(err) => {
                error!("Failed to spawn pronunciation thread: {err}");
                SpeakHandle { join: None }
            }
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock_state().playback
    }

    pub fn is_speaking(&self) -> bool {
        matches!(
            self.state(),
            PlaybackState::Playing | PlaybackState::Paused
        )
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    pub fn highlight(&self) -> Option<SpokenHighlight> {
        self.inner.lock_state().highlight
    }

    pub fn highlight_range(&self) -> Option<HighlightRange> {
        self.highlight().map(|highlight| highlight.range())
    }

    pub fn current_token(&self) -> u64 {
        self.inner.generation.current()
    }

    pub fn session(&self) -> Option<PlaybackSession> {
        let state = self.inner.lock_state();
        state.session.as_ref().map(|session| PlaybackSession {
            token: session.token,
            chunks: session.chunks.clone(),
            current_chunk_index: session.current_chunk_index,
            rate: state.rate,
            state: state.playback,
            mode: session.mode,
        })
    }
}

fn teardown(state: &mut SyncState) {
    if let Some(clip) = state.clip.take() {
        clip.stop();
    }
    if let Some(control) = state.synthesis.take() {
        control.cancel();
    }
    state.highlight = None;
    state.session = None;
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` only while `token` still owns playback.
    fn with_current<R>(&self, token: u64, f: impl FnOnce(&mut SyncState) -> R) -> Option<R> {
        let mut state = self.lock_state();
        if !self.generation.is_current(token) {
            return None;
        }
        Some(f(&mut state))
    }

    /// Deliver `highlight` to the listener if `token` still owns playback.
    fn notify(&self, token: u64, highlight: Option<SpokenHighlight>) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.generation.is_current(token) {
            return;
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(highlight);
        }
    }

    fn emit(&self, token: u64, highlight: SpokenHighlight) {
        let changed = self
            .with_current(token, |state| {
                if state.highlight == Some(highlight) {
                    return false;
                }
                state.highlight = Some(highlight);
                true
            })
            .unwrap_or(false);
        if changed {
            self.notify(token, Some(highlight));
        }
    }

    fn begin_session(&self) -> u64 {
        let token = self.generation.advance();
        {
            let mut state = self.lock_state();
            teardown(&mut state);
            state.playback = PlaybackState::Playing;
            state.session = Some(ActiveSession {
                token,
                chunks: Vec::new(),
                current_chunk_index: 0,
                mode: None,
            });
        }
        self.notify(token, None);
        token
    }

    /// Reset to idle if `token` still owns playback.
    fn finish(&self, token: u64) -> bool {
        let finished = self
            .with_current(token, |state| {
                teardown(state);
                state.playback = PlaybackState::Idle;
            })
            .is_some();
        if finished {
            self.notify(token, None);
        }
        finished
    }

    fn run_session(
        &self,
        token: u64,
        text: String,
        language: String,
        on_end: Box<dyn FnOnce() + Send>,
    ) {
        match self.play_session(token, &text, &language) {
            SessionOutcome::Superseded => {
                debug!(token, "Speech session superseded");
                return;
            }
            SessionOutcome::Finished => info!(token, "Speech session finished"),
            SessionOutcome::Unavailable => {
                warn!(token, %language, "Speech unavailable; ending session silently")
            }
        }
        if self.finish(token) {
            on_end();
        } else {
            debug!(token, "Session superseded while finishing");
        }
    }

    fn play_session(&self, token: u64, text: &str, language: &str) -> SessionOutcome {
        let text_len = text.chars().count();
        let resume_at = match self.play_chunked(token, text, text_len, language) {
            Ok(Completion::Finished) => return SessionOutcome::Finished,
            Ok(Completion::Superseded) => return SessionOutcome::Superseded,
            Err(failure) => {
                if !self.generation.is_current(token) {
                    return SessionOutcome::Superseded;
                }
                warn!(
                    token,
                    resume_at = failure.resume_at,
                    "Network speech failed, falling back to on-device synthesis: {}",
                    failure.error
                );
                failure.resume_at
            }
        };

        let cleared = self.with_current(token, |state| {
            if let Some(clip) = state.clip.take() {
                clip.stop();
            }
            state.highlight.take().is_some()
        });
        match cleared {
            None => return SessionOutcome::Superseded,
            Some(true) => self.notify(token, None),
            Some(false) => {}
        }

        let Some(engine) = self.synthesis.clone() else {
            warn!(token, "No on-device synthesis engine configured");
            return SessionOutcome::Unavailable;
        };
        let remaining: String = text.chars().skip(resume_at).collect();
        match self.play_on_device(token, engine.as_ref(), &remaining, language, resume_at, text_len)
        {
            Ok(Completion::Finished) => SessionOutcome::Finished,
            Ok(Completion::Superseded) => SessionOutcome::Superseded,
            Err(SpeechError::NoVoice(lang)) => {
                warn!(token, %lang, "No on-device voice; refusing to speak");
                SessionOutcome::Unavailable
            }
            Err(err) if err.is_interruption() => {
                debug!(token, "On-device synthesis interrupted: {err}");
                if self.generation.is_current(token) {
                    SessionOutcome::Unavailable
                } else {
                    SessionOutcome::Superseded
                }
            }
            Err(err) => {
                warn!(token, "On-device synthesis failed: {err}");
                SessionOutcome::Unavailable
            }
        }
    }

    fn play_chunked(
        &self,
        token: u64,
        text: &str,
        text_len: usize,
        language: &str,
    ) -> Result<Completion, ChunkFailure> {
        let sources = self
            .provider
            .fetch_chunks(text, language)
            .map_err(|err| ChunkFailure {
                resume_at: 0,
                error: SpeechError::Provider(format!("{err:#}")),
            })?;
        if !self.generation.is_current(token) {
            debug!(token, "Discarding chunks fetched for a superseded session");
            return Ok(Completion::Superseded);
        }

        let chunks = plan_chunks(sources, text_len);
        if chunks.is_empty() {
            if text.trim().is_empty() {
                return Ok(Completion::Finished);
            }
            return Err(ChunkFailure {
                resume_at: 0,
                error: SpeechError::Provider("provider returned no chunks".to_string()),
            });
        }
        debug!(token, chunks = chunks.len(), "Planned speech chunks");

        let recorded = self.with_current(token, |state| {
            if let Some(session) = state.session.as_mut() {
                session.chunks = chunks.clone();
                session.mode = Some(PlaybackMode::Chunked);
            }
        });
        if recorded.is_none() {
            return Ok(Completion::Superseded);
        }

        for (idx, chunk) in chunks.iter().enumerate() {
            if let Completion::Superseded = self.play_chunk(token, idx, chunk)? {
                return Ok(Completion::Superseded);
            }
        }
        Ok(Completion::Finished)
    }

    fn play_chunk(
        &self,
        token: u64,
        idx: usize,
        chunk: &PlaybackChunk,
    ) -> Result<Completion, ChunkFailure> {
        let fail = |error: SpeechError| ChunkFailure {
            resume_at: chunk.char_start,
            error,
        };
        if !self.generation.is_current(token) {
            return Ok(Completion::Superseded);
        }

        let clip = self
            .audio
            .load(&chunk.audio_url)
            .map_err(|err| fail(SpeechError::Playback(format!("{err:#}"))))?;
        let started = self.with_current(token, |state| {
            state.clip = Some(Arc::clone(&clip));
            if let Some(session) = state.session.as_mut() {
                session.current_chunk_index = idx;
            }
            clip.set_rate(state.rate);
            if state.playback == PlaybackState::Paused {
                Ok(())
            } else {
                clip.play()
            }
        });
        match started {
            None => {
                clip.stop();
                debug!(token, chunk = idx, "Dropping audio loaded for a superseded session");
                return Ok(Completion::Superseded);
            }
            Some(Err(err)) => return Err(fail(SpeechError::Playback(format!("{err:#}")))),
            Some(Ok(())) => {}
        }

        debug!(
            token,
            chunk = idx,
            start = chunk.char_start,
            end = chunk.char_end,
            "Playing speech chunk"
        );
        Ok(self.follow_clip(token, idx, chunk, clip.as_ref()))
    }

    /// Poll the clip once per frame, moving the cursor forward only.
    fn follow_clip(
        &self,
        token: u64,
        idx: usize,
        chunk: &PlaybackChunk,
        clip: &dyn AudioClip,
    ) -> Completion {
        let mut cursor = chunk.char_start;
        loop {
            if !self.generation.is_current(token) {
                return Completion::Superseded;
            }
            if !clip.is_paused() {
                if let Some(duration) = clip.duration().filter(|d| !d.is_zero()) {
                    let range = interpolate_cursor(chunk, clip.current_time(), duration);
                    if range.start >= cursor {
                        cursor = range.start;
                        self.emit(
                            token,
                            SpokenHighlight::ChunkInterpolated {
                                range,
                                chunk_index: idx,
                            },
                        );
                    }
                }
            }
            if clip.is_ended() {
                return Completion::Finished;
            }
            thread::sleep(self.frame_interval);
        }
    }

    fn play_on_device(
        &self,
        token: u64,
        engine: &dyn SynthesisEngine,
        text: &str,
        language: &str,
        base: usize,
        text_len: usize,
    ) -> Result<Completion, SpeechError> {
        let voice = find_voice(&engine.voices(), language)
            .ok_or_else(|| SpeechError::NoVoice(language.to_string()))?;
        if text.trim().is_empty() {
            return Ok(Completion::Finished);
        }

        let rate = self.lock_state().rate;
        info!(token, voice = %voice.name, lang = %voice.lang, base, "Speaking with on-device synthesis");
        let (tx, rx) = mpsc::channel();
        let control: Arc<dyn SynthesisControl> = Arc::from(
            engine
                .speak(
                    Utterance {
                        text: text.to_string(),
                        voice,
                        rate,
                    },
                    tx,
                )
                .map_err(|err| SpeechError::Synthesis(format!("{err:#}")))?,
        );

        let installed = self.with_current(token, |state| {
            state.synthesis = Some(Arc::clone(&control));
            if let Some(session) = state.session.as_mut() {
                session.mode = Some(PlaybackMode::OnDevice);
            }
            if state.playback == PlaybackState::Paused {
                control.pause();
            }
        });
        if installed.is_none() {
            control.cancel();
            return Ok(Completion::Superseded);
        }

        let superseded_or = |completion: Completion| {
            if self.generation.is_current(token) {
                completion
            } else {
                Completion::Superseded
            }
        };
        loop {
            match rx.recv_timeout(self.frame_interval) {
                Ok(SynthesisEvent::Boundary {
                    char_index,
                    char_length,
                }) => {
                    let start = (base + char_index).min(text_len);
                    let end = (start + char_length.max(1)).min(text_len);
                    self.emit(
                        token,
                        SpokenHighlight::WordBoundaryExact {
                            range: HighlightRange::new(start, end),
                        },
                    );
                }
                Ok(SynthesisEvent::End) => return Ok(superseded_or(Completion::Finished)),
                Ok(SynthesisEvent::Error(err)) => {
                    if !self.generation.is_current(token) {
                        return Ok(Completion::Superseded);
                    }
                    return Err(err);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if !self.generation.is_current(token) {
                        return Ok(Completion::Superseded);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if !self.generation.is_current(token) {
                        return Ok(Completion::Superseded);
                    }
                    return Err(SpeechError::Synthesis(
                        "engine closed its event channel".to_string(),
                    ));
                }
            }
        }
    }

    fn pronounce_once(&self, text: &str, language: &str) {
        let rate = self.lock_state().rate;
        match self.pronounce_chunked(text, language, rate) {
            Ok(()) => return,
            Err(err) => debug!("Pronunciation audio unavailable, trying on-device: {err:#}"),
        }

        let Some(engine) = &self.synthesis else {
            warn!(%language, "No way to pronounce word");
            return;
        };
        let Some(voice) = find_voice(&engine.voices(), language) else {
            warn!(%language, "No on-device voice to pronounce word");
            return;
        };
        let (tx, rx) = mpsc::channel();
        let utterance = Utterance {
            text: text.to_string(),
            voice,
            rate,
        };
        match engine.speak(utterance, tx) {
            Ok(_control) => {
                for event in rx {
                    match event {
                        SynthesisEvent::End => break,
                        SynthesisEvent::Error(err) => {
                            debug!("Pronunciation ended early: {err}");
                            break;
                        }
                        SynthesisEvent::Boundary { .. } => {}
                    }
                }
            }
            Err(err) => warn!("Failed to pronounce word: {err:#}"),
        }
    }

    fn pronounce_chunked(&self, text: &str, language: &str, rate: f32) -> anyhow::Result<()> {
        let sources = self.provider.fetch_chunks(text, language)?;
        if sources.is_empty() {
            anyhow::bail!("provider returned no audio for `{text}`");
        }
        for source in sources {
            let clip = self.audio.load(&source.audio_url)?;
            clip.set_rate(rate);
            clip.play()?;
            while !clip.is_ended() {
                thread::sleep(self.frame_interval);
            }
        }
        Ok(())
    }
}

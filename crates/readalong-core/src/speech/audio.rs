//! Audio playback for network speech chunks.

use crate::cache::AudioCache;
use anyhow::{Context, Result, anyhow};
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub trait AudioBackend: Send + Sync {
    /// Fetch and decode the audio at `url`. The clip starts paused.
    fn load(&self, url: &str) -> Result<Arc<dyn AudioClip>>;
}

/// A single loaded audio element.
pub trait AudioClip: Send + Sync {
    fn play(&self) -> Result<()>;
    fn pause(&self);
    fn is_paused(&self) -> bool;
    /// Release the output; the clip cannot be played again.
    fn stop(&self);
    fn set_rate(&self, rate: f32);
    fn current_time(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn is_ended(&self) -> bool;
}

/// Plays clips through the default output device.
///
/// `rodio::OutputStream` must stay on the thread that opened it, so a small
/// thread owns the stream for the backend's lifetime and hands out the
/// sendable handle.
pub struct RodioAudioBackend {
    handle: OutputStreamHandle,
    client: reqwest::blocking::Client,
    cache: Option<AudioCache>,
    _shutdown: mpsc::Sender<()>,
}

impl RodioAudioBackend {
    pub fn new(cache: Option<AudioCache>) -> Result<Self> {
        let (handle_tx, handle_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = handle_tx.send(Ok(handle));
                    // Returns once the backend (and its sender) is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(err) => {
                    let _ = handle_tx.send(Err(anyhow!("Opening audio output: {err}")));
                }
            })
            .context("Spawning audio output thread")?;
        let handle = handle_rx
            .recv()
            .context("Audio output thread exited early")??;
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (readalong)")
            .build()
            .context("Building HTTP client")?;
        info!("Audio output ready");
        Ok(Self {
            handle,
            client,
            cache,
            _shutdown: shutdown_tx,
        })
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.cache.as_ref().and_then(|cache| cache.load(url)) {
            return Ok(bytes);
        }
        if let Some(path) = url.strip_prefix("file://") {
            return std::fs::read(path).with_context(|| format!("Reading audio file {path}"));
        }
        debug!(%url, "Fetching speech audio");
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Requesting {url}"))?
            .error_for_status()
            .with_context(|| format!("Speech audio request failed for {url}"))?;
        let bytes = response.bytes().context("Reading speech audio body")?.to_vec();
        if bytes.is_empty() {
            return Err(anyhow!("Empty audio response from {url}"));
        }
        if let Some(cache) = &self.cache {
            cache.store(url, &bytes);
        }
        Ok(bytes)
    }
}

impl AudioBackend for RodioAudioBackend {
    fn load(&self, url: &str) -> Result<Arc<dyn AudioClip>> {
        let (source, duration) = decode(self.fetch(url)?.into())?;
        let sink = Sink::try_new(&self.handle).context("Creating sink")?;
        sink.pause();
        sink.append(source);
        Ok(Arc::new(RodioClip {
            sink,
            duration: Some(duration),
            clock: Mutex::new(PlaybackClock::default()),
        }))
    }
}

type ClipSource = Decoder<Cursor<Arc<[u8]>>>;

/// Decode `bytes` for playback. Decoders for streamed formats often cannot
/// report a total duration; only then are the samples counted, on a second
/// decoder over the same buffer.
fn decode(bytes: Arc<[u8]>) -> Result<(ClipSource, Duration)> {
    let source = Decoder::new(Cursor::new(Arc::clone(&bytes))).context("Decoding speech audio")?;
    if let Some(total) = source.total_duration() {
        return Ok((source, total));
    }
    let counter = Decoder::new(Cursor::new(bytes)).context("Decoding speech audio")?;
    let channels = u64::from(counter.channels().max(1));
    let sample_rate = u64::from(counter.sample_rate().max(1));
    let frames = counter.count() as u64 / channels;
    Ok((source, Duration::from_secs_f64(frames as f64 / sample_rate as f64)))
}

/// Position tracking: rodio's sink does not report it, so accumulate wall time
/// scaled by rate between play and pause.
#[derive(Debug)]
struct PlaybackClock {
    started_at: Option<Instant>,
    elapsed: Duration,
    rate: f32,
    stopped: bool,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self {
            started_at: None,
            elapsed: Duration::ZERO,
            rate: 1.0,
            stopped: false,
        }
    }
}

impl PlaybackClock {
    fn position(&self, now: Instant) -> Duration {
        let running = self
            .started_at
            .map(|started| now.saturating_duration_since(started).mul_f32(self.rate))
            .unwrap_or(Duration::ZERO);
        self.elapsed + running
    }

    fn fold(&mut self, now: Instant) {
        self.elapsed = self.position(now);
        self.started_at = self.started_at.map(|_| now);
    }
}

struct RodioClip {
    sink: Sink,
    duration: Option<Duration>,
    clock: Mutex<PlaybackClock>,
}

impl RodioClip {
    fn clock(&self) -> std::sync::MutexGuard<'_, PlaybackClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioClip for RodioClip {
    fn play(&self) -> Result<()> {
        let mut clock = self.clock();
        if clock.stopped {
            return Err(anyhow!("clip already stopped"));
        }
        if clock.started_at.is_none() {
            clock.started_at = Some(Instant::now());
        }
        self.sink.play();
        Ok(())
    }

    fn pause(&self) {
        let mut clock = self.clock();
        let now = Instant::now();
        clock.fold(now);
        clock.started_at = None;
        self.sink.pause();
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn stop(&self) {
        let mut clock = self.clock();
        clock.fold(Instant::now());
        clock.started_at = None;
        clock.stopped = true;
        self.sink.stop();
    }

    fn set_rate(&self, rate: f32) {
        let mut clock = self.clock();
        clock.fold(Instant::now());
        clock.rate = rate;
        self.sink.set_speed(rate);
    }

    fn current_time(&self) -> Duration {
        let position = self.clock().position(Instant::now());
        match self.duration {
            Some(total) => position.min(total),
            None => position,
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn is_ended(&self) -> bool {
        let clock = self.clock();
        if clock.stopped {
            return true;
        }
        clock.started_at.is_some() && self.sink.empty()
    }
}

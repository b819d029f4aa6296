//! Command-line read-along: speaks a text file and logs the word being read.
//!
//! Usage: `readalong <text-file> [--lang <code>] [--rate <f32>]`
//!
//! Configuration comes from `conf/config.toml`; flags override the language
//! and playback rate.

use anyhow::{Context, Result, anyhow, bail};
use readalong_core::cache::AudioCache;
use readalong_core::config::load_config;
use readalong_core::speech::{
    RodioAudioBackend, SpeechSynchronizer, SynchronizerOptions, TranslateTtsProvider,
    token_span_for_offset,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

struct Args {
    path: PathBuf,
    language: Option<String>,
    rate: Option<f32>,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config = load_config(Path::new("conf/config.toml"));
    set_log_level(reload_handle, config.log_level.as_filter_str());

    let language = args
        .language
        .clone()
        .unwrap_or_else(|| config.source_language.clone());
    let text = std::fs::read_to_string(&args.path)
        .with_context(|| format!("Failed to read {}", args.path.display()))?;
    info!(
        path = %args.path.display(),
        %language,
        chars = text.chars().count(),
        level = %config.log_level,
        "Starting read-along"
    );

    let provider = TranslateTtsProvider::from_config(&config)?;
    let audio = RodioAudioBackend::new(Some(AudioCache::new(&config.audio_cache_dir)))?;
    let speech = SpeechSynchronizer::new(
        Arc::new(provider),
        Arc::new(audio),
        None,
        SynchronizerOptions::from_config(&config),
    );
    if let Some(rate) = args.rate {
        speech.set_playback_rate(rate);
    }

    let spoken = text.clone();
    let last_token = Mutex::new(None);
    speech.set_highlight_listener(move |highlight| {
        let Some(highlight) = highlight else {
            return;
        };
        let Some(span) = token_span_for_offset(&spoken, highlight.range().start) else {
            return;
        };
        let mut last = last_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *last == Some(span) {
            return;
        }
        *last = Some(span);
        let token: String = spoken
            .chars()
            .skip(span.start)
            .take(span.end - span.start)
            .collect();
        info!(start = span.start, end = span.end, exact = highlight.is_exact(), "{token}");
        match serde_json::to_string(&highlight) {
            Ok(json) => debug!(highlight = %json, "Highlight changed"),
            Err(err) => warn!("Failed to encode highlight: {err}"),
        }
    });

    speech
        .speak(text, &language, || info!("Finished reading"))
        .wait();
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    const USAGE: &str = "Usage: readalong <text-file> [--lang <code>] [--rate <f32>]";
    let mut path = None;
    let mut language = None;
    let mut rate = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--lang" => {
                language = Some(args.next().ok_or_else(|| anyhow!("--lang needs a value"))?);
            }
            "--rate" => {
                let value = args.next().ok_or_else(|| anyhow!("--rate needs a value"))?;
                rate = Some(
                    value
                        .parse::<f32>()
                        .with_context(|| format!("Invalid --rate `{value}`"))?,
                );
            }
            flag if flag.starts_with("--") => bail!("Unknown flag {flag}\n{USAGE}"),
            _ if path.is_none() => path = Some(PathBuf::from(&arg)),
            _ => bail!("Unexpected argument {arg}\n{USAGE}"),
        }
    }

    let path = path.ok_or_else(|| anyhow!(USAGE))?;
    if !path.exists() {
        return Err(anyhow!("File not found: {}", path.as_path().display()));
    }
    Ok(Args {
        path,
        language,
        rate,
    })
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_filter(filter_layer),
        )
        .init();
    debug!("Logging initialized; override level with config.log_level or RUST_LOG");
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("debug"));
    if let Err(err) = handle.modify(|filter| *filter = parsed.clone()) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

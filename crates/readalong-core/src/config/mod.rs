//! Configuration loading for the read-along core.
//!
//! All user-tunable settings are centralized here and loaded from
//! `conf/config.toml` if present. Any missing or invalid entries fall back to
//! defaults so reading still works.

mod defaults;
mod io;
mod models;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{LogLevel, NoiseFilterConfig, ReaderConfig};
pub use defaults::{MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
pub(crate) use models::clamp_rate;

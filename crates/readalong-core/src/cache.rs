//! On-disk cache for fetched speech audio.
//!
//! Files are stored under the configured cache directory using a hash of the
//! audio URL as the filename to avoid filesystem issues. Write failures are
//! logged and ignored so playback never depends on the cache.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct AudioCache {
    root: PathBuf,
}

impl AudioCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        self.root.join(format!("tts-{hash}.audio"))
    }

    pub fn load(&self, url: &str) -> Option<Vec<u8>> {
        let path = self.path_for(url);
        let bytes = fs::read(&path).ok()?;
        debug!(path = %path.display(), "Audio cache hit");
        Some(bytes)
    }

    pub fn store(&self, url: &str, bytes: &[u8]) {
        let path = self.path_for(url);
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), "Failed to create audio cache dir: {err}");
                return;
            }
        }
        if let Err(err) = fs::write(&path, bytes) {
            warn!(path = %path.display(), "Failed to write cached audio: {err}");
        }
    }
}

//! Speech playback and highlight synchronization.

pub mod audio;
pub mod chunks;
pub mod highlight;
pub mod provider;
pub mod synchronizer;
pub mod synthesis;

pub use audio::{AudioBackend, AudioClip, RodioAudioBackend};
pub use chunks::PlaybackChunk;
pub use highlight::{HighlightRange, SpokenHighlight, token_span_for_offset, word_index_for_offset};
pub use provider::{ChunkSource, SpeechProvider, TranslateTtsProvider};
pub use synchronizer::{
    PlaybackMode, PlaybackSession, PlaybackState, SpeakHandle, SpeechSynchronizer,
    SynchronizerOptions,
};
pub use synthesis::{SynthesisControl, SynthesisEngine, SynthesisEvent, Utterance, Voice};

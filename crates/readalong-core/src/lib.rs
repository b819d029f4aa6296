//! PDF reading and audio synchronization for the read-along view.
//!
//! Pages are rendered and turned into positioned word boxes (from the native
//! text layer, or OCR when there is none), reassembled into reading-order
//! text, and spoken with a highlight that follows the audio.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod noise_filter;
pub mod ocr;
pub mod reader;
pub mod render;
pub mod speech;
pub mod text_utils;

#[cfg(test)]
pub(crate) mod testing;

pub use cancellation::{CancellationToken, Generation};
pub use config::{ReaderConfig, load_config};
pub use error::{RenderError, SpeechError};
pub use geometry::{ExtractionResult, WordBox};
pub use layout::{PageLayout, reconstruct};
pub use reader::{PdfReader, ReaderSnapshot};
pub use render::{PageState, RenderCoordinator, RenderRequest};

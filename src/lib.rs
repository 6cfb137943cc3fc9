//! Prepares short, normalized WAV snippets of uploaded audio for
//! fingerprint scanning, and submits them to a scan endpoint.

pub mod audio_file;
pub mod audio_source;
pub mod batch;
pub mod error;
pub mod extractor;
pub mod render;
pub mod scan;
pub mod snippet;
pub mod spotify;
pub mod storage;
pub mod wav;
pub mod wav_header;

pub use audio_source::{AudioPlatform, DecodeContext, DecodedAudio};
pub use error::{DecodeError, ExtractionError, SnippetError};
pub use extractor::{SnippetExtractor, SourceFile};
pub use snippet::{EncodedSnippet, SnippetSettings};

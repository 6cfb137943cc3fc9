use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use log::{info, warn};

use crate::audio_source::{AudioPlatform, ContextGuard, DecodeContext};
use crate::error::{DecodeError, ExtractionError, SnippetError};
use crate::render::NativePlatform;
use crate::snippet::{render_snippet, EncodedSnippet, SnippetSettings};

/// Only the opening segment of each file is scanned.
const FIRST_SEGMENT: u32 = 1;
const FIRST_SEGMENT_START: f64 = 0.0;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Runs `work`, turning a panic into its message.
fn contained<T>(work: impl FnOnce() -> T) -> Result<T, String> {
    panic::catch_unwind(AssertUnwindSafe(work)).map_err(|payload| panic_message(payload.as_ref()))
}

/// An uploaded file, still in its original container/codec.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> SourceFile {
        SourceFile {
            name: name.into(),
            bytes,
        }
    }

    pub fn read(path: &Path) -> std::io::Result<SourceFile> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Ok(SourceFile { name, bytes })
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Turns uploaded files into scan-ready WAV snippets.
pub struct SnippetExtractor<P: AudioPlatform = NativePlatform> {
    platform: P,
    settings: SnippetSettings,
}

impl SnippetExtractor<NativePlatform> {
    pub fn native(settings: SnippetSettings) -> Self {
        SnippetExtractor::new(NativePlatform::new(), settings)
    }
}

impl<P: AudioPlatform> SnippetExtractor<P> {
    pub fn new(platform: P, settings: SnippetSettings) -> Self {
        SnippetExtractor { platform, settings }
    }

    pub fn settings(&self) -> &SnippetSettings {
        &self.settings
    }

    /// Decodes `file` and renders its first segment.
    ///
    /// The decode context is closed on every path out of this function.
    /// Nothing is retried; a file that cannot yield its first segment fails
    /// as a whole. A panic in the decoder or renderer is reported as a
    /// failure of that stage.
    pub fn prepare(&self, file: &SourceFile) -> Result<EncodedSnippet, SnippetError> {
        let result = self.prepare_inner(file);
        match &result {
            Ok(snippet) => info!(
                "prepared {} from {} ({:.2}s, {} bytes)",
                snippet.file_name,
                file.name,
                snippet.duration,
                snippet.bytes.len()
            ),
            Err(err) => warn!("could not prepare {}: {}", file.name, err),
        }
        result
    }

    fn prepare_inner(&self, file: &SourceFile) -> Result<EncodedSnippet, SnippetError> {
        let mut context = ContextGuard::new(self.platform.open_context()?);
        let extension = file.extension();
        let decoded = contained(|| context.decode(&file.bytes, extension.as_deref()))
            .map_err(DecodeError::Panicked)??;

        let snippet = contained(|| {
            render_snippet(
                &self.platform,
                &decoded,
                FIRST_SEGMENT_START,
                &file.name,
                FIRST_SEGMENT,
                &self.settings,
            )
        })
        .map_err(ExtractionError::Panicked)??;
        Ok(snippet)
    }
}

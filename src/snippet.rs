use log::debug;
use serde::{Deserialize, Serialize};

use crate::audio_source::{AudioPlatform, DecodedAudio, RenderTarget, RenderWindow};
use crate::error::ExtractionError;
use crate::wav::{encode_wav, WAV_MEDIA_TYPE};

pub const SNIPPET_DURATION_SECONDS: f64 = 21.0;
pub const TARGET_SAMPLE_RATE: u32 = 44100;
pub const TARGET_CHANNELS: usize = 2;
pub const MAX_SNIPPETS_PER_FILE: usize = 1;
pub const MIN_SNIPPET_SECONDS: f64 = 1.0;
pub const MAX_ORIGINAL_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SnippetSettings {
    pub snippet_seconds: f64,
    pub sample_rate: u32,
    pub channels: usize,
    pub min_snippet_seconds: f64,
    pub max_file_bytes: u64,
}

impl Default for SnippetSettings {
    fn default() -> Self {
        SnippetSettings {
            snippet_seconds: SNIPPET_DURATION_SECONDS,
            sample_rate: TARGET_SAMPLE_RATE,
            channels: TARGET_CHANNELS,
            min_snippet_seconds: MIN_SNIPPET_SECONDS,
            max_file_bytes: MAX_ORIGINAL_FILE_SIZE_BYTES,
        }
    }
}

impl SnippetSettings {
    pub fn target(&self) -> RenderTarget {
        RenderTarget {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// A window to cut from one decoded file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnippetRequest {
    pub start: f64,
    pub duration: f64,
    pub target: RenderTarget,
}

impl SnippetRequest {
    pub fn at(start: f64, settings: &SnippetSettings) -> SnippetRequest {
        SnippetRequest {
            start,
            duration: settings.snippet_seconds,
            target: settings.target(),
        }
    }

    /// Resolves the request against a source of `source_duration` seconds.
    ///
    /// The start is clamped to zero and the window is shortened to what the
    /// source still holds. Windows that start past the end or would be
    /// shorter than `min_seconds` are rejected.
    pub fn window(&self, source_duration: f64, min_seconds: f64) -> Result<RenderWindow, ExtractionError> {
        let start = self.start.max(0.0);
        if start >= source_duration {
            return Err(ExtractionError::PastEnd {
                start,
                duration: source_duration,
            });
        }

        let duration = self.duration.min(source_duration - start);
        if duration < min_seconds {
            return Err(ExtractionError::TooShort {
                available: duration,
                minimum: min_seconds,
            });
        }

        Ok(RenderWindow { start, duration })
    }
}

/// A WAV snippet ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedSnippet {
    pub file_name: String,
    pub media_type: &'static str,
    pub bytes: Vec<u8>,
    pub start: f64,
    pub duration: f64,
    pub sample_rate: u32,
    pub channels: usize,
}

/// Strips the last extension and replaces anything outside `[A-Za-z0-9_.-]`.
pub fn sanitized_base_name(original_name: &str) -> String {
    let base = match original_name.rfind('.') {
        Some(0) | None => original_name,
        Some(dot) => &original_name[..dot],
    };
    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `<base>_S<segment>_<start>s_T<timestamp>.wav`
pub fn snippet_file_name(original_name: &str, segment: u32, start: f64, timestamp_millis: i64) -> String {
    format!(
        "{}_S{}_{}s_T{}.wav",
        sanitized_base_name(original_name),
        segment,
        start.round() as i64,
        timestamp_millis
    )
}

/// Cuts one snippet out of `source` starting at `start` seconds, converts it
/// to the configured rate and channel count, and encodes it as WAV.
pub fn render_snippet<P: AudioPlatform>(
    platform: &P,
    source: &DecodedAudio,
    start: f64,
    original_name: &str,
    segment: u32,
    settings: &SnippetSettings,
) -> Result<EncodedSnippet, ExtractionError> {
    let request = SnippetRequest::at(start, settings);
    let window = request.window(source.duration(), settings.min_snippet_seconds)?;

    let rendered = platform.render(source, window, request.target)?;
    let bytes = encode_wav(&rendered)?;
    let file_name = snippet_file_name(
        original_name,
        segment,
        window.start,
        chrono::Utc::now().timestamp_millis(),
    );

    debug!(
        "snippet {} covers {:.3}s..{:.3}s ({} bytes)",
        file_name,
        window.start,
        window.start + window.duration,
        bytes.len()
    );

    Ok(EncodedSnippet {
        file_name,
        media_type: WAV_MEDIA_TYPE,
        bytes,
        start: window.start,
        duration: rendered.duration(),
        sample_rate: rendered.sample_rate,
        channels: rendered.channels(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::NativePlatform;
    use crate::wav::read_pcm16;

    fn source(seconds: f64, rate: u32, channels: usize) -> DecodedAudio {
        let frames = (seconds * rate as f64).round() as usize;
        DecodedAudio::new(vec![vec![0.1; frames]; channels], rate)
    }

    #[test]
    fn windows_are_clamped_to_the_source() {
        let settings = SnippetSettings::default();
        let window = SnippetRequest::at(-3.0, &settings).window(30.0, 1.0).unwrap();
        assert_eq!(window, RenderWindow { start: 0.0, duration: 21.0 });

        let window = SnippetRequest::at(25.0, &settings).window(30.0, 1.0).unwrap();
        assert_eq!(window, RenderWindow { start: 25.0, duration: 5.0 });
    }

    #[test]
    fn rejects_windows_past_the_end_or_below_the_floor() {
        let settings = SnippetSettings::default();
        assert!(matches!(
            SnippetRequest::at(30.0, &settings).window(30.0, 1.0),
            Err(ExtractionError::PastEnd { .. })
        ));
        assert!(matches!(
            SnippetRequest::at(40.0, &settings).window(30.0, 1.0),
            Err(ExtractionError::PastEnd { .. })
        ));
        assert!(matches!(
            SnippetRequest::at(29.5, &settings).window(30.0, 1.0),
            Err(ExtractionError::TooShort { .. })
        ));
        assert!(matches!(
            SnippetRequest::at(0.0, &settings).window(0.5, 1.0),
            Err(ExtractionError::TooShort { .. })
        ));
        assert!(SnippetRequest::at(0.0, &settings).window(1.0, 1.0).is_ok());
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitized_base_name("My Beat (final).mp3"), "My_Beat__final_");
        assert_eq!(sanitized_base_name("beat.v2.wav"), "beat.v2");
        assert_eq!(sanitized_base_name("noext"), "noext");
        assert_eq!(sanitized_base_name(".hidden"), ".hidden");
        assert_eq!(sanitized_base_name("für élise.flac"), "f_r__lise");
    }

    #[test]
    fn names_differ_only_by_timestamp() {
        let a = snippet_file_name("track one.mp3", 1, 0.4, 1700000000000);
        let b = snippet_file_name("track one.mp3", 1, 0.4, 1700000000001);
        assert_eq!(a, "track_one_S1_0s_T1700000000000.wav");
        assert_ne!(a, b);
        assert_eq!(a.split("_T").next(), b.split("_T").next());
        assert_eq!(snippet_file_name("x.wav", 2, 12.5, 7), "x_S2_13s_T7.wav");
    }

    #[test]
    fn renders_a_full_snippet() {
        let settings = SnippetSettings::default();
        let snippet =
            render_snippet(&NativePlatform::new(), &source(30.0, 44100, 1), 0.0, "beat.wav", 1, &settings)
                .unwrap();

        assert_eq!(snippet.media_type, "audio/wav");
        assert_eq!(snippet.sample_rate, 44100);
        assert_eq!(snippet.channels, 2);
        assert_eq!(snippet.duration, 21.0);
        assert!(snippet.file_name.starts_with("beat_S1_0s_T"));

        let wav = read_pcm16(&snippet.bytes).unwrap();
        assert_eq!(wav.channels(), 2);
        assert_eq!(wav.length(), 926100);
    }

    #[test]
    fn windowed_duration_matches_remaining_audio() {
        let settings = SnippetSettings::default();
        let platform = NativePlatform::new();
        for (seconds, start) in [(10.0, 2.25), (21.0, 0.0), (3.0, 1.5)] {
            let snippet =
                render_snippet(&platform, &source(seconds, 44100, 2), start, "a.wav", 1, &settings)
                    .unwrap();
            let expected = f64::min(21.0, seconds - start);
            assert!((snippet.duration - expected).abs() <= 1.0 / 44100.0, "{} vs {}", snippet.duration, expected);
        }
    }

    #[test]
    fn short_sources_yield_nothing() {
        let settings = SnippetSettings::default();
        let result = render_snippet(&NativePlatform::new(), &source(0.5, 44100, 1), 0.0, "a.wav", 1, &settings);
        assert!(matches!(result, Err(ExtractionError::TooShort { .. })));
    }
}

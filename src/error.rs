use thiserror::Error;

/// Input bytes could not be turned into audio.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unsupported or unrecognised audio format: {0}")]
    Unsupported(String),

    #[error("corrupt audio data: {0}")]
    Corrupt(String),

    #[error("audio stream contains no samples")]
    Empty,

    #[error("decode context is closed")]
    Closed,

    #[error("decoder panicked: {0}")]
    Panicked(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for DecodeError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error;
        match err {
            Error::IoError(e) => DecodeError::Io(e),
            Error::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
            other => DecodeError::Corrupt(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("source has no channels")]
    NoChannels,

    #[error("invalid sample rate {0}")]
    InvalidSampleRate(u32),

    #[error("resampler error: {0}")]
    Resampler(String),
}

impl From<rubato::ResamplerConstructionError> for RenderError {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        RenderError::Resampler(err.to_string())
    }
}

impl From<rubato::ResampleError> for RenderError {
    fn from(err: rubato::ResampleError) -> Self {
        RenderError::Resampler(err.to_string())
    }
}

/// Decoding worked but no snippet window could be produced.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("start offset {start:.3}s is past the end of {duration:.3}s of audio")]
    PastEnd { start: f64, duration: f64 },

    #[error("only {available:.3}s of audio available, need at least {minimum:.3}s")]
    TooShort { available: f64, minimum: f64 },

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("could not encode wav: {0}")]
    Encode(#[from] WavError),

    #[error("renderer panicked: {0}")]
    Panicked(String),
}

/// Why a file could not be prepared for scanning.
#[derive(Error, Debug)]
pub enum SnippetError {
    #[error("could not decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("could not extract snippet: {0}")]
    Extraction(#[from] ExtractionError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WavError {
    #[error("wav header should be at least {needed} bytes, but was {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("missing {0} marker")]
    MissingMarker(&'static str),

    #[error("could not find data chunk in wav file")]
    NoDataChunk,

    #[error("{0} channels do not fit a wav header")]
    TooManyChannels(usize),

    #[error("{frames} frames of {channels} channels exceed the 4 GiB wav limit")]
    DataTooLarge { frames: usize, channels: usize },

    #[error("unsupported wav encoding: format {format_type}, {bits_per_sample} bits")]
    UnsupportedEncoding {
        format_type: u16,
        bits_per_sample: u16,
    },
}

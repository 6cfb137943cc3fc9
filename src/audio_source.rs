use crate::error::{DecodeError, RenderError};

/// Planar PCM audio held in memory.
///
/// Channels normally hold the same number of frames. A shorter channel is
/// treated as if padded with silence to the longest one. Samples are
/// nominally in [-1, 1] but nothing here enforces it; the WAV encoder clamps.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<Vec<f32>>, sample_rate: u32) -> DecodedAudio {
        DecodedAudio {
            samples,
            sample_rate,
        }
    }

    /// A buffer of `frames` frames of silence.
    pub fn silence(channels: usize, frames: usize, sample_rate: u32) -> DecodedAudio {
        DecodedAudio {
            samples: vec![vec![0.0; frames]; channels],
            sample_rate,
        }
    }

    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames, the length of the longest channel.
    pub fn length(&self) -> usize {
        self.samples.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Duration in seconds, `length / sample_rate`.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.length() as f64 / self.sample_rate as f64
    }
}

/// The part of a source buffer to render, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderWindow {
    pub start: f64,
    pub duration: f64,
}

/// Output format every rendered snippet is converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTarget {
    pub sample_rate: u32,
    pub channels: usize,
}

impl RenderTarget {
    /// Frames needed to hold `seconds` of audio at the target rate, rounded up.
    pub fn frames_for(&self, seconds: f64) -> usize {
        (seconds * self.sample_rate as f64).ceil().max(0.0) as usize
    }
}

/// A decoding session. Platforms may back this with a limited resource, so
/// callers must `close` it when done; see [`ContextGuard`].
pub trait DecodeContext {
    /// Decodes a complete encoded file. `extension` is a format hint such as
    /// `"mp3"`; decoders must not rely on it being correct.
    fn decode(&mut self, bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio, DecodeError>;

    fn close(&mut self) -> Result<(), DecodeError>;
}

/// Decoding and offline rendering capabilities the snippet extractor needs.
pub trait AudioPlatform {
    type Context: DecodeContext;

    fn open_context(&self) -> Result<Self::Context, DecodeError>;

    /// Cuts `window` out of `source` and converts it to `target` in one pass.
    /// The result has exactly `target.frames_for(window.duration)` frames.
    fn render(
        &self,
        source: &DecodedAudio,
        window: RenderWindow,
        target: RenderTarget,
    ) -> Result<DecodedAudio, RenderError>;
}

/// Closes the wrapped context when dropped. Close errors are logged and
/// otherwise ignored so they never replace the caller's real result.
pub struct ContextGuard<C: DecodeContext> {
    context: C,
}

impl<C: DecodeContext> ContextGuard<C> {
    pub fn new(context: C) -> ContextGuard<C> {
        ContextGuard { context }
    }
}

impl<C: DecodeContext> std::ops::Deref for ContextGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.context
    }
}

impl<C: DecodeContext> std::ops::DerefMut for ContextGuard<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.context
    }
}

impl<C: DecodeContext> Drop for ContextGuard<C> {
    fn drop(&mut self) {
        if let Err(err) = self.context.close() {
            log::debug!("ignoring error while closing decode context: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingContext {
        closes: Rc<Cell<u32>>,
        fail_close: bool,
    }

    impl DecodeContext for CountingContext {
        fn decode(&mut self, _bytes: &[u8], _ext: Option<&str>) -> Result<DecodedAudio, DecodeError> {
            Err(DecodeError::Empty)
        }

        fn close(&mut self) -> Result<(), DecodeError> {
            self.closes.set(self.closes.get() + 1);
            if self.fail_close {
                return Err(DecodeError::Unsupported("already closed".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn duration_is_length_over_rate() {
        let audio = DecodedAudio::silence(2, 48000 * 3, 48000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.length(), 144000);
        assert_eq!(audio.duration(), 3.0);
    }

    #[test]
    fn empty_buffer_has_zero_duration() {
        let audio = DecodedAudio::new(vec![], 44100);
        assert_eq!(audio.length(), 0);
        assert_eq!(audio.duration(), 0.0);
        assert_eq!(DecodedAudio::new(vec![vec![0.5]], 0).duration(), 0.0);
    }

    #[test]
    fn frames_for_rounds_up() {
        let target = RenderTarget {
            sample_rate: 44100,
            channels: 2,
        };
        assert_eq!(target.frames_for(21.0), 926100);
        assert_eq!(target.frames_for(1.00001), 44101);
        assert_eq!(target.frames_for(0.0), 0);
    }

    #[test]
    fn guard_closes_once_and_swallows_errors() {
        let closes = Rc::new(Cell::new(0));
        {
            let mut guard = ContextGuard::new(CountingContext {
                closes: closes.clone(),
                fail_close: true,
            });
            assert!(guard.decode(&[], None).is_err());
        }
        assert_eq!(closes.get(), 1);
    }
}

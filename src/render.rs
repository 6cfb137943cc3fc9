use std::borrow::Cow;

use log::debug;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::audio_file::AudioFileContext;
use crate::audio_source::{AudioPlatform, DecodedAudio, RenderTarget, RenderWindow};
use crate::error::{DecodeError, RenderError};

const RESAMPLER_CHUNK_FRAMES: usize = 1024;

/// Gain applied to centre and surround channels when folding 5.1 into fewer channels.
const SQRT_HALF: f32 = std::f32::consts::FRAC_1_SQRT_2;

/// Offline renderer backed by symphonia for decoding and rubato for
/// sample rate conversion.
#[derive(Debug, Clone)]
pub struct NativePlatform {
    chunk_frames: usize,
}

impl NativePlatform {
    pub fn new() -> NativePlatform {
        NativePlatform {
            chunk_frames: RESAMPLER_CHUNK_FRAMES,
        }
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        NativePlatform::new()
    }
}

impl AudioPlatform for NativePlatform {
    type Context = AudioFileContext;

    fn open_context(&self) -> Result<AudioFileContext, DecodeError> {
        Ok(AudioFileContext::new())
    }

    fn render(
        &self,
        source: &DecodedAudio,
        window: RenderWindow,
        target: RenderTarget,
    ) -> Result<DecodedAudio, RenderError> {
        if source.channels() == 0 || target.channels == 0 {
            return Err(RenderError::NoChannels);
        }
        if source.sample_rate == 0 {
            return Err(RenderError::InvalidSampleRate(source.sample_rate));
        }
        if target.sample_rate == 0 {
            return Err(RenderError::InvalidSampleRate(target.sample_rate));
        }

        let source_rate = source.sample_rate as f64;
        let length = source.length();
        let start = ((window.start.max(0.0) * source_rate).floor() as usize).min(length);
        let frames = ((window.duration.max(0.0) * source_rate).ceil() as usize).min(length - start);

        // short channels yield short slices, mixing pads them with silence
        let cut: Vec<&[f32]> = source
            .samples
            .iter()
            .map(|channel| {
                let end = (start + frames).min(channel.len());
                &channel[start.min(end)..end]
            })
            .collect();
        let mixed = mix_channels(&cut, target.channels);

        let mut rendered = if source.sample_rate == target.sample_rate {
            mixed
        } else {
            resample(
                &mixed,
                source.sample_rate,
                target.sample_rate,
                self.chunk_frames,
            )?
        };

        // silence past the end of the source, like an offline audio graph
        let out_frames = target.frames_for(window.duration);
        for channel in rendered.iter_mut() {
            channel.resize(out_frames, 0.0);
        }

        debug!(
            "rendered {} frames from {}..{} at {} Hz into {} frames at {} Hz",
            frames,
            start,
            start + frames,
            source.sample_rate,
            out_frames,
            target.sample_rate
        );
        Ok(DecodedAudio::new(rendered, target.sample_rate))
    }
}

/// Up/down-mixes planar channels to `target` channels.
///
/// Mono, stereo, quad and 5.1 inputs follow the usual speaker layouts;
/// anything else is mapped channel by channel, dropping extras and filling
/// missing channels with silence. Every output channel has the length of the
/// longest input channel.
pub fn mix_channels(input: &[&[f32]], target: usize) -> Vec<Vec<f32>> {
    let frames = input.iter().map(|c| c.len()).max().unwrap_or(0);
    let padded = |channel: &[f32]| -> Vec<f32> {
        let mut out = channel.to_vec();
        out.resize(frames, 0.0);
        out
    };
    let mix = |weights: &[(usize, f32)]| -> Vec<f32> {
        (0..frames)
            .map(|i| {
                weights
                    .iter()
                    .map(|(ch, w)| input[*ch].get(i).copied().unwrap_or(0.0) * w)
                    .sum::<f32>()
            })
            .collect()
    };

    match (input.len(), target) {
        (n, t) if n == t => input.iter().map(|c| padded(c)).collect(),
        (1, 2) => vec![padded(input[0]), padded(input[0])],
        (2, 1) => vec![mix(&[(0, 0.5), (1, 0.5)])],
        (4, 1) => vec![mix(&[(0, 0.25), (1, 0.25), (2, 0.25), (3, 0.25)])],
        (4, 2) => vec![mix(&[(0, 0.5), (2, 0.5)]), mix(&[(1, 0.5), (3, 0.5)])],
        // L R C LFE SL SR, LFE is dropped
        (6, 1) => vec![mix(&[
            (0, SQRT_HALF),
            (1, SQRT_HALF),
            (2, 1.0),
            (4, 0.5),
            (5, 0.5),
        ])],
        (6, 2) => vec![
            mix(&[(0, 1.0), (2, SQRT_HALF), (4, SQRT_HALF)]),
            mix(&[(1, 1.0), (2, SQRT_HALF), (5, SQRT_HALF)]),
        ],
        (_, t) => (0..t)
            .map(|ch| match input.get(ch) {
                Some(channel) => padded(channel),
                None => vec![0.0; frames],
            })
            .collect(),
    }
}

/// Converts planar audio between sample rates with a windowed-sinc
/// resampler. Returns `ceil(frames * to / from)` frames per channel, time
/// aligned with the input. Short channels are padded with silence.
pub fn resample(
    input: &[Vec<f32>],
    from: u32,
    to: u32,
    chunk_frames: usize,
) -> Result<Vec<Vec<f32>>, RenderError> {
    let channels = input.len();
    if channels == 0 {
        return Ok(Vec::new());
    }
    let frames = input.iter().map(|c| c.len()).max().unwrap_or(0);
    let input: Vec<Cow<[f32]>> = input
        .iter()
        .map(|c| {
            if c.len() == frames {
                Cow::Borrowed(c.as_slice())
            } else {
                let mut owned = c.clone();
                owned.resize(frames, 0.0);
                Cow::Owned(owned)
            }
        })
        .collect();
    let ratio = to as f64 / from as f64;
    let expected = (frames as f64 * ratio).ceil() as usize;

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_frames, channels)?;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected); channels];
    let append = |output: &mut Vec<Vec<f32>>, block: Vec<Vec<f32>>| {
        for (out, block) in output.iter_mut().zip(block) {
            out.extend_from_slice(&block);
        }
    };

    let mut pos = 0;
    while pos + chunk_frames <= frames {
        let chunk: Vec<&[f32]> = input.iter().map(|c| &c[pos..pos + chunk_frames]).collect();
        let block = resampler.process(&chunk, None)?;
        append(&mut output, block);
        pos += chunk_frames;
    }
    if pos < frames {
        let chunk: Vec<&[f32]> = input.iter().map(|c| &c[pos..]).collect();
        let block = resampler.process_partial(Some(chunk.as_slice()), None)?;
        append(&mut output, block);
    }

    // push zeros through until the tail has come out
    while output[0].len() < expected {
        let before = output[0].len();
        let block = resampler.process_partial(None::<&[Vec<f32>]>, None)?;
        append(&mut output, block);
        if output[0].len() == before {
            break;
        }
    }

    for channel in output.iter_mut() {
        channel.truncate(expected);
    }
    Ok(output)
}

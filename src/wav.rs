use crate::{
    audio_source::DecodedAudio,
    error::WavError,
    wav_header::{WavHeader, PCM_HEADER_LEN},
};

pub const WAV_MEDIA_TYPE: &str = "audio/wav";

/// Converts one float sample to signed 16-bit PCM.
///
/// Negative values use the full 32768 range, positive values 32767, and the
/// result is truncated toward zero.
pub fn sample_to_i16(sample: f32) -> i16 {
    let sample = sample.clamp(-1.0, 1.0);
    if sample <= 0.0 {
        (sample * 32768.0) as i16
    } else {
        (sample * 32767.0) as i16
    }
}

/// Serializes `audio` as a 16-bit PCM WAV file with a 44-byte header and
/// channel-interleaved frames.
pub fn encode_wav(audio: &DecodedAudio) -> Result<Vec<u8>, WavError> {
    let channels = audio.channels();
    let frames = audio.length();
    let header = WavHeader::pcm16(channels, audio.sample_rate, frames)?;

    let mut out = Vec::with_capacity(PCM_HEADER_LEN + header.data_size as usize);
    out.extend_from_slice(&header.to_bytes());

    for frame in 0..frames {
        for channel in &audio.samples {
            // ragged channels are padded with silence
            let sample = channel.get(frame).copied().unwrap_or(0.0);
            out.extend_from_slice(&sample_to_i16(sample).to_le_bytes());
        }
    }

    debug_assert_eq!(out.len(), PCM_HEADER_LEN + header.data_size as usize);
    Ok(out)
}

/// Reads a 16-bit PCM WAV byte stream back into planar floats (`i16 / 32768`).
///
/// A data chunk that claims more bytes than the stream holds is read up to
/// the last whole frame.
pub fn read_pcm16(bytes: &[u8]) -> Result<DecodedAudio, WavError> {
    let header = WavHeader::parse(bytes)?;

    if header.format_type != 1 || header.bits_per_sample != 16 {
        return Err(WavError::UnsupportedEncoding {
            format_type: header.format_type,
            bits_per_sample: header.bits_per_sample,
        });
    }

    let channels = header.number_of_channels as usize;
    let data_start = header.data_start();
    let data_end = (data_start + header.data_size as usize).min(bytes.len());
    let data = &bytes[data_start.min(data_end)..data_end];

    let mut samples = vec![Vec::new(); channels];
    if channels > 0 {
        for frame in data.chunks_exact(channels * 2) {
            for (channel_i, channel_samples) in samples.iter_mut().enumerate() {
                let sample_i = channel_i * 2;
                // s16le
                let value = i16::from_le_bytes([frame[sample_i], frame[sample_i + 1]]);
                channel_samples.push(value as f32 / 32768.0);
            }
        }
    }

    Ok(DecodedAudio::new(samples, header.sample_rate))
}

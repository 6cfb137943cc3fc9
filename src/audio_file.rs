use crate::audio_source::{DecodeContext, DecodedAudio};
use crate::error::DecodeError;
use log::debug;
use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decodes whole files in memory with symphonia's default codec registry.
pub struct AudioFileContext {
    format_opts: FormatOptions,
    metadata_opts: MetadataOptions,
    decoder_opts: DecoderOptions,
    closed: bool,
}

impl AudioFileContext {
    pub fn new() -> AudioFileContext {
        AudioFileContext {
            format_opts: Default::default(),
            metadata_opts: Default::default(),
            decoder_opts: Default::default(),
            closed: false,
        }
    }
}

impl Default for AudioFileContext {
    fn default() -> Self {
        AudioFileContext::new()
    }
}

impl DecodeContext for AudioFileContext {
    fn decode(&mut self, bytes: &[u8], extension: Option<&str>) -> Result<DecodedAudio, DecodeError> {
        if self.closed {
            return Err(DecodeError::Closed);
        }

        // Cursor<Vec<u8>> is a MediaSource, so the whole file is decoded from memory.
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &self.format_opts,
            &self.metadata_opts,
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no decodable audio track".into()))?;

        let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &self.decoder_opts)?;
        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;

        let mut samples: Vec<Vec<f32>> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(Error::ResetRequired) => break,
                Err(err) => return Err(err.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let channel_count = spec.channels.count();
                    if channel_count == 0 {
                        continue;
                    }

                    if samples.is_empty() {
                        samples = vec![Vec::new(); channel_count];
                    } else if samples.len() != channel_count {
                        return Err(DecodeError::Corrupt(format!(
                            "channel count changed from {} to {} mid-stream",
                            samples.len(),
                            channel_count
                        )));
                    }
                    sample_rate.get_or_insert(spec.rate);

                    let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
                    sample_buf.copy_planar_ref(audio_buf);

                    let buf = sample_buf.samples();
                    let samples_per_channel = buf.len() / channel_count;
                    for (channel, out) in samples.iter_mut().enumerate() {
                        out.extend_from_slice(
                            &buf[channel * samples_per_channel..(channel + 1) * samples_per_channel],
                        );
                    }
                }
                Err(Error::DecodeError(err)) => {
                    debug!("skipping undecodable packet: {}", err);
                }
                Err(err) => return Err(err.into()),
            }
        }

        let sample_rate = sample_rate.unwrap_or(0);
        if sample_rate == 0 {
            return Err(DecodeError::Corrupt("stream has no sample rate".into()));
        }
        let audio = DecodedAudio::new(samples, sample_rate);
        if audio.length() == 0 {
            return Err(DecodeError::Empty);
        }

        debug!(
            "decoded {} frames, {} channels at {} Hz ({:.2}s)",
            audio.length(),
            audio.channels(),
            audio.sample_rate,
            audio.duration()
        );
        Ok(audio)
    }

    fn close(&mut self) -> Result<(), DecodeError> {
        if self.closed {
            return Err(DecodeError::Closed);
        }
        self.closed = true;
        Ok(())
    }
}

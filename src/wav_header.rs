use crate::error::WavError;

/// Size of the canonical PCM header written by [`WavHeader::to_bytes`].
pub const PCM_HEADER_LEN: usize = 44;

const PCM_FORMAT_CHUNK_LEN: u32 = 16;
const FORMAT_PCM: u16 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub riff: [u8; 4],
    pub file_size: u32,
    pub file_type: [u8; 4],
    pub format_chunk_marker: [u8; 4],
    pub format_data_length: u32, // should be 16 for PCM
    pub format_type: u16,
    pub number_of_channels: u16,
    pub sample_rate: u32,
    pub bytes_per_second: u32,
    pub bytes_per_frame: u16,
    pub bits_per_sample: u16,
    pub data_chunk_marker: [u8; 4],
    pub data_size: u32,
    /// Byte offset of the first sample, just past the data chunk header.
    pub data_offset: usize,
}

/// Walks `id + u32 size` chunk headers from `start` and returns the offset
/// of the first chunk called `name`. Odd-sized chunks carry one pad byte.
fn find_chunk(bytes: &[u8], start: usize, name: &[u8; 4]) -> Option<usize> {
    let mut at = start;
    while at.checked_add(8)? <= bytes.len() {
        if &marker_at(bytes, at) == name {
            return Some(at);
        }
        let size = u32_at(bytes, at + 4) as usize;
        at = at.checked_add(8)?.checked_add(size)?.checked_add(size & 1)?;
    }
    None
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn marker_at(bytes: &[u8], at: usize) -> [u8; 4] {
    [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

impl WavHeader {
    /// Header for a 16-bit integer PCM stream of `frames` frames.
    ///
    /// Fails when the layout cannot be described by the 32-bit RIFF size
    /// fields, so a written header always matches the bytes that follow it.
    pub fn pcm16(channels: usize, sample_rate: u32, frames: usize) -> Result<WavHeader, WavError> {
        let number_of_channels = u16::try_from(channels)
            .ok()
            .filter(|c| c.checked_mul(2).is_some())
            .ok_or(WavError::TooManyChannels(channels))?;
        let bytes_per_frame = number_of_channels * 2;
        let data_size = (frames as u64)
            .checked_mul(bytes_per_frame as u64)
            .filter(|size| *size <= u32::MAX as u64 - (PCM_HEADER_LEN as u64 - 8))
            .ok_or(WavError::DataTooLarge { frames, channels })? as u32;
        let bytes_per_second = sample_rate
            .checked_mul(bytes_per_frame as u32)
            .ok_or(WavError::DataTooLarge { frames, channels })?;

        Ok(WavHeader {
            riff: *b"RIFF",
            file_size: data_size + PCM_HEADER_LEN as u32 - 8,
            file_type: *b"WAVE",
            format_chunk_marker: *b"fmt ",
            format_data_length: PCM_FORMAT_CHUNK_LEN,
            format_type: FORMAT_PCM,
            number_of_channels,
            sample_rate,
            bytes_per_second,
            bytes_per_frame,
            bits_per_sample: 16,
            data_chunk_marker: *b"data",
            data_size,
            data_offset: PCM_HEADER_LEN,
        })
    }

    /// Serializes the canonical 44-byte layout. `format_data_length` is
    /// always written as 16 since no extension bytes are emitted.
    pub fn to_bytes(&self) -> [u8; PCM_HEADER_LEN] {
        let mut out = [0u8; PCM_HEADER_LEN];
        out[0..4].copy_from_slice(&self.riff);
        out[4..8].copy_from_slice(&self.file_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.file_type);
        out[12..16].copy_from_slice(&self.format_chunk_marker);
        out[16..20].copy_from_slice(&PCM_FORMAT_CHUNK_LEN.to_le_bytes());
        out[20..22].copy_from_slice(&self.format_type.to_le_bytes());
        out[22..24].copy_from_slice(&self.number_of_channels.to_le_bytes());
        out[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[28..32].copy_from_slice(&self.bytes_per_second.to_le_bytes());
        out[32..34].copy_from_slice(&self.bytes_per_frame.to_le_bytes());
        out[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());
        out[36..40].copy_from_slice(&self.data_chunk_marker);
        out[40..44].copy_from_slice(&self.data_size.to_le_bytes());
        out
    }

    /// Reads a header from the start of a WAV file. The data chunk may be
    /// preceded by other chunks (`LIST`, `fact`, ...) after `fmt `.
    pub fn parse(header_bytes: &[u8]) -> Result<WavHeader, WavError> {
        if header_bytes.len() < PCM_HEADER_LEN {
            return Err(WavError::TooShort {
                needed: PCM_HEADER_LEN,
                actual: header_bytes.len(),
            });
        }

        let riff = marker_at(header_bytes, 0);
        if &riff != b"RIFF" {
            return Err(WavError::MissingMarker("RIFF"));
        }
        let file_type = marker_at(header_bytes, 8);
        if &file_type != b"WAVE" {
            return Err(WavError::MissingMarker("WAVE"));
        }
        let format_chunk_marker = marker_at(header_bytes, 12);
        if &format_chunk_marker != b"fmt " {
            return Err(WavError::MissingMarker("fmt "));
        }

        let format_data_length = u32_at(header_bytes, 16);

        let data_chunk_start = find_chunk(header_bytes, 12, b"data").ok_or(WavError::NoDataChunk)?;

        let needed_byte_len = data_chunk_start + 8;
        if header_bytes.len() < needed_byte_len {
            return Err(WavError::TooShort {
                needed: needed_byte_len,
                actual: header_bytes.len(),
            });
        }

        Ok(WavHeader {
            riff,
            file_size: u32_at(header_bytes, 4),
            file_type,
            format_chunk_marker,
            format_data_length,
            format_type: u16_at(header_bytes, 20),
            number_of_channels: u16_at(header_bytes, 22),
            sample_rate: u32_at(header_bytes, 24),
            bytes_per_second: u32_at(header_bytes, 28),
            bytes_per_frame: u16_at(header_bytes, 32),
            bits_per_sample: u16_at(header_bytes, 34),
            data_chunk_marker: marker_at(header_bytes, data_chunk_start),
            data_size: u32_at(header_bytes, data_chunk_start + 4),
            data_offset: needed_byte_len,
        })
    }

    pub fn data_start(&self) -> usize {
        self.data_offset
    }

    pub fn frames(&self) -> usize {
        if self.bytes_per_frame == 0 {
            return 0;
        }
        self.data_size as usize / self.bytes_per_frame as usize
    }
}

// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Canonical 16-bit PCM WAV serialization.
//!
//! Layout (little-endian throughout):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | `RIFF`                                  |
//! | 4      | 4    | 36 + data length                        |
//! | 8      | 4    | `WAVE`                                  |
//! | 12     | 4    | `fmt `                                  |
//! | 16     | 4    | 16 (fmt chunk length)                   |
//! | 20     | 2    | 1 (PCM)                                 |
//! | 22     | 2    | channels                                |
//! | 24     | 4    | sample rate                             |
//! | 28     | 4    | byte rate = sample rate * 2 * channels  |
//! | 32     | 2    | block align = channels * 2              |
//! | 34     | 2    | 16 (bits per sample)                    |
//! | 36     | 4    | `data`                                  |
//! | 40     | 4    | data length                             |
//! | 44     | ...  | interleaved i16 samples                 |

use std::fs;
use std::path::Path;

use tracing::info;

use crate::audio::SampleBuffer;

/// Size of the canonical WAV header in bytes.
pub const HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u32 = 2;
const FORMAT_PCM: u16 = 1;

/// Error types for WAV encoding.
#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("Buffer has no channels")]
    NoChannels,

    #[error("Audio is too long for a WAV file ({0} bytes of sample data)")]
    TooLong(u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Converts a float sample to 16-bit PCM. Negative values scale by 32768 and
/// non-negative values by 32767, matching the asymmetric range of i16.
pub fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0).round() as i16
    } else {
        (s * 32767.0).round() as i16
    }
}

/// Encodes the buffer as a 16-bit PCM WAV file image.
pub fn encode(buffer: &SampleBuffer) -> Result<Vec<u8>, WavError> {
    let channels = buffer.channel_count();
    if channels == 0 {
        return Err(WavError::NoChannels);
    }

    let frames = buffer.frame_count() as u64;
    let data_len = frames * channels as u64 * BYTES_PER_SAMPLE as u64;
    if data_len + (HEADER_LEN as u64 - 8) > u32::MAX as u64 {
        return Err(WavError::TooLong(data_len));
    }
    let data_len = data_len as u32;

    let sample_rate = buffer.sample_rate();
    let block_align = channels * BYTES_PER_SAMPLE as u16;
    let byte_rate = sample_rate * BYTES_PER_SAMPLE * channels as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    let planar = buffer.channels();
    for frame in 0..buffer.frame_count() {
        for channel in planar {
            out.extend_from_slice(&to_pcm16(channel[frame]).to_le_bytes());
        }
    }

    Ok(out)
}

/// Encodes the buffer and writes it to `path`.
pub fn write_file<P: AsRef<Path>>(path: P, buffer: &SampleBuffer) -> Result<(), WavError> {
    let path = path.as_ref();
    let bytes = encode(buffer)?;
    fs::write(path, &bytes)?;
    info!(
        path = ?path,
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        duration_ms = buffer.duration().as_millis(),
        bytes = bytes.len(),
        "Wrote WAV file"
    );
    Ok(())
}

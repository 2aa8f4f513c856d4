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

//! Decoding of encoded audio (WAV, MP3, FLAC, OGG, ...) into a [`SampleBuffer`].

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer as InterleavedScratch;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::buffer::SampleBuffer;

/// Error types for decode operations.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported or malformed audio: {0}")]
    Unsupported(String),

    #[error("No audio track found")]
    NoAudioTrack,

    #[error("Audio stream contains no samples")]
    Empty,

    #[error("Audio file error: {0}")]
    AudioError(#[from] SymphoniaError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Decodes an in-memory encoded audio source.
pub fn decode_bytes(
    bytes: Vec<u8>,
    extension_hint: Option<&str>,
) -> Result<SampleBuffer, DecodeError> {
    decode_source(Box::new(Cursor::new(bytes)), extension_hint)
}

/// Decodes an encoded audio file from disk.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<SampleBuffer, DecodeError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        DecodeError::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let extension = path.extension().and_then(|ext| ext.to_str());
    decode_source(Box::new(file), extension)
}

fn decode_source(
    source: Box<dyn MediaSource>,
    extension_hint: Option<&str>,
) -> Result<SampleBuffer, DecodeError> {
    let mss = MediaSourceStream::new(source, Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(extension) = extension_hint {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| DecodeError::Unsupported("Sample rate not specified".to_string()))?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&params, &decoder_opts)
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    // Prefer container metadata; otherwise take the channel count of the first decoded packet.
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut interleaved: Vec<f32> = Vec::new();

    while let Some(packet) = read_next_packet(format_reader.as_mut(), decoder.as_mut())? {
        if packet.track_id() != track_id {
            continue;
        }
        let (samples, decoded_channels) = decode_packet(decoder.as_mut(), &packet)?;
        if channels == 0 {
            channels = decoded_channels;
        }
        interleaved.extend_from_slice(&samples);
    }

    if channels == 0 {
        return Err(DecodeError::Unsupported("Channels not specified".to_string()));
    }
    if interleaved.is_empty() {
        return Err(DecodeError::Empty);
    }

    let buffer = SampleBuffer::from_interleaved(&interleaved, channels, sample_rate);
    debug!(
        channels,
        sample_rate,
        frames = buffer.frame_count(),
        "Decoded audio"
    );
    Ok(buffer)
}

/// Reads the next packet. `Ok(None)` at the end of the stream.
fn read_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
) -> Result<Option<Packet>, DecodeError> {
    loop {
        match format_reader.next_packet() {
            Ok(packet) => return Ok(Some(packet)),
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            // Some demuxers report a decode error at EOF instead of an IO error.
            Err(SymphoniaError::DecodeError(_)) => return Ok(None),
            Err(e) => return Err(DecodeError::AudioError(e)),
        }
    }
}

/// Decodes a packet into interleaved f32 samples.
fn decode_packet(
    decoder: &mut dyn Decoder,
    packet: &Packet,
) -> Result<(Vec<f32>, u16), DecodeError> {
    let decoded = match decoder.decode(packet) {
        Ok(decoded) => decoded,
        Err(SymphoniaError::ResetRequired) => {
            decoder.reset();
            decoder.decode(packet)?
        }
        // Skip over a corrupt packet rather than failing the whole file.
        Err(SymphoniaError::DecodeError(e)) => {
            debug!(error = e, "Skipping undecodable packet");
            return Ok((Vec::new(), 0));
        }
        Err(e) => return Err(DecodeError::AudioError(e)),
    };

    let spec = *decoded.spec();
    let channels = spec.channels.count() as u16;
    if decoded.frames() == 0 {
        return Ok((Vec::new(), channels));
    }

    let mut scratch = InterleavedScratch::<f32>::new(decoded.capacity() as u64, spec);
    scratch.copy_interleaved_ref(decoded);
    Ok((scratch.samples().to_vec(), channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav;

    #[test]
    fn test_decode_encoded_wav_bytes() {
        let original = SampleBuffer::from_planar(
            vec![vec![0.0, 0.5, -0.5, 0.25], vec![0.1, 0.2, 0.3, 0.4]],
            22050,
        );
        let bytes = wav::encode(&original).unwrap();

        let decoded = decode_bytes(bytes, Some("wav")).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.sample_rate(), 22050);
        assert_eq!(decoded.frame_count(), 4);
        for ch in 0..2 {
            for (a, b) in original.channel(ch).iter().zip(decoded.channel(ch)) {
                assert!((a - b).abs() <= 1.0 / 32767.0, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode_bytes(b"definitely not audio".to_vec(), None);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let result = decode_file("/nonexistent/kick.wav");
        assert!(matches!(result, Err(DecodeError::IoError(_))));
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.wav");
        let original = SampleBuffer::from_planar(vec![vec![0.5; 64]], 44100);
        wav::write_file(&path, &original).unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channel_count(), 1);
        assert_eq!(decoded.frame_count(), 64);
    }
}

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

//! Decoded PCM audio held in memory.
//!
//! Samples are stored planar (one Vec per channel). A buffer is never mutated in
//! place once handed out: edits produce a new buffer that replaces the old one.

use std::time::Duration;

/// Decoded audio: channel count, sample rate and per-channel float samples.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBuffer {
    /// Planar sample storage (one Vec per channel), all of equal length.
    channels: Vec<Vec<f32>>,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl SampleBuffer {
    /// Creates a buffer from planar channel data.
    ///
    /// Channels shorter than the longest one are padded with silence so that every
    /// channel has the same frame length.
    pub fn from_planar(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(|c| c.len()).max().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.resize(frames, 0.0);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(interleaved: &[f32], channel_count: u16, sample_rate: u32) -> Self {
        let num_channels = channel_count as usize;
        if num_channels == 0 {
            return Self::from_planar(Vec::new(), sample_rate);
        }

        let num_frames = interleaved.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(num_frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, sample) in frame.iter().enumerate() {
                channels[ch].push(*sample);
            }
        }

        Self {
            channels,
            sample_rate,
        }
    }

    /// Creates a silent buffer of the given shape.
    pub fn silent(channel_count: u16, frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count as usize],
            sample_rate,
        }
    }

    /// Returns the number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Returns true if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Returns the duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Returns the duration.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Returns the samples of a single channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        self.channels
            .get(channel)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Returns all channels.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Converts a time in seconds to a frame index, clamped to the buffer length.
    pub fn frame_at(&self, seconds: f64) -> usize {
        let frame = (seconds.max(0.0) * self.sample_rate as f64).floor() as usize;
        frame.min(self.frame_count())
    }

    /// Returns a new buffer with frames `[start, end)` of every channel.
    pub fn slice(&self, start: usize, end: usize) -> SampleBuffer {
        let len = self.frame_count();
        let end = end.min(len);
        let start = start.min(end);
        SampleBuffer {
            channels: self
                .channels
                .iter()
                .map(|c| c[start..end].to_vec())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Returns a new buffer with `other` appended after this one, channel by channel.
    /// Both buffers must share channel count and sample rate; `None` otherwise.
    pub fn concat(&self, other: &SampleBuffer) -> Option<SampleBuffer> {
        if self.channel_count() != other.channel_count() || self.sample_rate != other.sample_rate
        {
            return None;
        }

        Some(SampleBuffer {
            channels: self
                .channels
                .iter()
                .zip(other.channels.iter())
                .map(|(a, b)| {
                    let mut joined = Vec::with_capacity(a.len() + b.len());
                    joined.extend_from_slice(a);
                    joined.extend_from_slice(b);
                    joined
                })
                .collect(),
            sample_rate: self.sample_rate,
        })
    }

    /// Returns a new buffer with frames `[start, end)` removed and the remainder
    /// stitched together. No cross-fade is applied at the seam.
    pub fn remove_range(&self, start: usize, end: usize) -> SampleBuffer {
        let len = self.frame_count();
        let end = end.min(len);
        let start = start.min(end);
        SampleBuffer {
            channels: self
                .channels
                .iter()
                .map(|c| {
                    let mut out = Vec::with_capacity(len - (end - start));
                    out.extend_from_slice(&c[..start]);
                    out.extend_from_slice(&c[end..]);
                    out
                })
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Returns the samples interleaved frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let num_channels = self.channels.len();
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(frames * num_channels);
        for frame in 0..frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }

    /// Resamples to the target rate using linear interpolation.
    /// Good enough for drum hits and one-shots.
    pub fn resample_linear(&self, target_rate: u32) -> SampleBuffer {
        if target_rate == self.sample_rate || self.sample_rate == 0 || self.is_empty() {
            return SampleBuffer {
                channels: self.channels.clone(),
                sample_rate: if self.sample_rate == 0 {
                    target_rate
                } else {
                    self.sample_rate
                },
            };
        }

        let ratio = target_rate as f64 / self.sample_rate as f64;
        let source_frames = self.frame_count();
        let target_frames = (source_frames as f64 * ratio).ceil() as usize;

        let channels = self
            .channels
            .iter()
            .map(|samples| {
                let mut output = Vec::with_capacity(target_frames);
                for target_frame in 0..target_frames {
                    let source_pos = target_frame as f64 / ratio;
                    let source_frame = source_pos.floor() as usize;
                    let frac = source_pos.fract() as f32;

                    let s0 = samples.get(source_frame).copied().unwrap_or(0.0);
                    let s1 = samples.get(source_frame + 1).copied().unwrap_or(s0);
                    output.push(s0 + (s1 - s0) * frac);
                }
                output
            })
            .collect();

        SampleBuffer {
            channels,
            sample_rate: target_rate,
        }
    }

    /// Returns the peak absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|c| c.iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }
}

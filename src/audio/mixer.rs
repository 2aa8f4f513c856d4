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
// Core audio mixing logic shared by the CPAL output and the offline renderer.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::warn;

use super::buffer::SampleBuffer;
use super::clock::{Bus, Clock, NodeHandle, PlaybackNode};

/// The shared output bus. Sources are summed; nothing else writes to the output.
///
/// The mixer is also the audio clock: time advances only as frames are mixed, so
/// the live path (driven by the output stream) and the offline path (driven by
/// [`AudioMixer::render`]) see exactly the same timeline.
#[derive(Clone)]
pub struct AudioMixer {
    /// Active audio sources currently playing or waiting for their start sample.
    active_sources: Arc<Mutex<Vec<ActiveSource>>>,
    /// Channel for adding sources without contending on the source lock.
    source_tx: Sender<ActiveSource>,
    source_rx: Receiver<ActiveSource>,
    /// Number of frames mixed so far.
    current_sample: Arc<AtomicU64>,
    /// Number of output channels
    num_channels: u16,
    /// Sample rate
    sample_rate: u32,
}

/// Represents an active audio source in the mixer
struct ActiveSource {
    /// The audio being played.
    buffer: Arc<SampleBuffer>,
    /// Mixer sample at which playback starts.
    start_at_sample: u64,
    /// Read position in source frames.
    position: f64,
    /// Source frames advanced per output frame.
    step: f64,
    /// Linear gain.
    gain: f32,
    /// Cancel/finished state shared with the scheduler.
    handle: NodeHandle,
}

impl ActiveSource {
    /// Mixes up to `num_frames` frames into the interleaved `output`, which starts at
    /// mixer sample `block_start`. Returns false once the source is done.
    fn mix_into(
        &mut self,
        output: &mut [f32],
        num_channels: usize,
        block_start: u64,
        num_frames: usize,
    ) -> bool {
        if self.handle.is_cancelled() {
            return false;
        }

        let first_frame = self.start_at_sample.saturating_sub(block_start);
        if first_frame >= num_frames as u64 {
            return true;
        }

        let source_channels = self.buffer.channel_count() as usize;
        let len = self.buffer.frame_count();
        for frame in first_frame as usize..num_frames {
            let index = self.position as usize;
            if index >= len {
                self.handle.mark_finished();
                return false;
            }
            let frac = (self.position - index as f64) as f32;

            let out = &mut output[frame * num_channels..(frame + 1) * num_channels];
            for (ch, sample) in out.iter_mut().enumerate() {
                // Mono sources feed every output channel.
                let src_ch = if source_channels == 1 { 0 } else { ch };
                if src_ch >= source_channels {
                    continue;
                }
                let data = self.buffer.channel(src_ch);
                let s0 = data[index];
                let value = if frac == 0.0 {
                    s0
                } else {
                    let s1 = data.get(index + 1).copied().unwrap_or(s0);
                    s0 + (s1 - s0) * frac
                };
                *sample += value * self.gain;
            }

            self.position += self.step;
        }

        true
    }
}

impl AudioMixer {
    /// Creates a new audio mixer
    pub fn new(num_channels: u16, sample_rate: u32) -> Self {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        Self {
            active_sources: Arc::new(Mutex::new(Vec::new())),
            source_tx,
            source_rx,
            current_sample: Arc::new(AtomicU64::new(0)),
            num_channels,
            sample_rate,
        }
    }

    /// Gets the number of output channels
    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    /// Gets the sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the number of frames mixed so far.
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Acquire)
    }

    /// Returns the number of sources playing or waiting to play.
    pub fn active_count(&self) -> usize {
        self.active_sources.lock().len() + self.source_rx.len()
    }

    /// Converts a clock time in seconds to a mixer sample.
    pub fn sample_for_time(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Mixes `num_frames` interleaved frames into `output` (which is cleared first)
    /// and advances the clock.
    pub fn process_into_output(&self, output: &mut [f32], num_frames: usize) {
        let num_channels = self.num_channels as usize;
        let output = &mut output[..num_frames * num_channels];
        output.fill(0.0);

        let mut sources = self.active_sources.lock();
        sources.extend(self.source_rx.try_iter());

        let block_start = self.current_sample.load(Ordering::Acquire);
        sources.retain_mut(|source| {
            source.mix_into(output, num_channels, block_start, num_frames)
        });
        drop(sources);

        self.current_sample
            .fetch_add(num_frames as u64, Ordering::AcqRel);
    }

    /// Mixes the next `num_frames` frames into a new planar buffer and advances the clock.
    pub fn render(&self, num_frames: usize) -> SampleBuffer {
        const BLOCK_FRAMES: usize = 1024;

        let num_channels = self.num_channels as usize;
        let mut scratch = vec![0.0f32; BLOCK_FRAMES * num_channels];
        let mut interleaved = Vec::with_capacity(num_frames * num_channels);

        let mut remaining = num_frames;
        while remaining > 0 {
            let frames = remaining.min(BLOCK_FRAMES);
            self.process_into_output(&mut scratch, frames);
            interleaved.extend_from_slice(&scratch[..frames * num_channels]);
            remaining -= frames;
        }

        SampleBuffer::from_interleaved(&interleaved, self.num_channels, self.sample_rate)
    }

    /// Cancels every active source.
    pub fn stop_all(&self) {
        let mut sources = self.active_sources.lock();
        sources.extend(self.source_rx.try_iter());
        for source in sources.drain(..) {
            source.handle.cancel();
        }
    }
}

impl Clock for AudioMixer {
    fn now(&self) -> f64 {
        self.current_sample() as f64 / self.sample_rate as f64
    }
}

impl Bus for AudioMixer {
    fn schedule(&self, node: PlaybackNode) -> NodeHandle {
        let handle = NodeHandle::new();
        if node.buffer.is_empty() || node.buffer.sample_rate() == 0 {
            handle.mark_finished();
            return handle;
        }

        let rate_ratio = node.buffer.sample_rate() as f64 / self.sample_rate as f64;
        let source = ActiveSource {
            start_at_sample: self.sample_for_time(node.start_time),
            position: node.offset.max(0.0) * node.buffer.sample_rate() as f64,
            step: node.playback_rate.max(0.0) * rate_ratio,
            gain: node.gain,
            buffer: node.buffer,
            handle: handle.clone(),
        };

        // Send via channel - the next mixing pass picks it up
        if let Err(e) = self.source_tx.send(source) {
            warn!(error = %e, "Failed to send node to mixer");
            handle.mark_finished();
        }
        handle
    }
}

impl std::fmt::Debug for AudioMixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioMixer")
            .field("num_channels", &self.num_channels)
            .field("sample_rate", &self.sample_rate)
            .field("current_sample", &self.current_sample())
            .field("active_sources", &self.active_count())
            .finish()
    }
}

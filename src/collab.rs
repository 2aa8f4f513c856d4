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

//! Contracts for components that live outside the deck.

use std::error::Error;
use std::sync::Arc;

use tracing::debug;

use crate::audio::{Bus, NodeHandle, PlaybackNode, SampleBuffer};

/// A text prompt and how strongly it steers generation.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f32,
}

/// A remote real-time music generator.
pub trait GenerativeStream: Send {
    /// Replaces the active prompts. The generator crossfades to them over
    /// roughly `transition_bars` bars.
    fn set_prompts(
        &mut self,
        prompts: &[WeightedPrompt],
        transition_bars: u32,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// The next decoded chunk, or `None` when nothing is buffered.
    fn next_chunk(&mut self) -> Option<SampleBuffer>;
}

/// Enumerates MIDI inputs for control-surface binding.
pub trait MidiInputs {
    fn input_names(&self) -> Vec<String>;
}

/// Storage for the generator's API key.
pub trait CredentialStore {
    fn get(&self) -> Option<String>;
    fn set(&mut self, key: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
    fn clear(&mut self);
    fn has_valid(&self) -> bool;
}

/// Plays generated chunks back to back on the bus.
///
/// A chunk that arrives late starts at the current clock time instead of in the
/// past, leaving a gap rather than dropping audio.
#[derive(Debug)]
pub struct StreamPlayer {
    next_start: f64,
    gain: f32,
}

impl StreamPlayer {
    pub fn new(gain: f32) -> Self {
        Self {
            next_start: 0.0,
            gain,
        }
    }

    /// Clock time at which the next chunk will be placed.
    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Schedules one chunk after the previous one.
    pub fn push(&mut self, bus: &dyn Bus, chunk: Arc<SampleBuffer>) -> NodeHandle {
        let now = bus.now();
        if self.next_start < now {
            debug!(late_by = now - self.next_start, "Generated audio underrun");
            self.next_start = now;
        }
        let start = self.next_start;
        self.next_start += chunk.duration_secs();
        bus.schedule(PlaybackNode {
            gain: self.gain,
            ..PlaybackNode::new(chunk, start)
        })
    }

    /// Moves everything buffered in `stream` onto the bus. Returns the number of
    /// chunks scheduled.
    pub fn drain(&mut self, bus: &dyn Bus, stream: &mut dyn GenerativeStream) -> usize {
        let mut count = 0;
        while let Some(chunk) = stream.next_chunk() {
            self.push(bus, Arc::new(chunk));
            count += 1;
        }
        count
    }
}

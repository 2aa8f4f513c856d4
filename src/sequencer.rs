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

//! The drum step sequencer.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod pattern;
pub mod presets;
pub mod scheduler;
pub mod transport;

pub use pattern::{Pattern, PatternBank};
pub use presets::Preset;
pub use scheduler::{ScheduledEvent, StepScheduler};
pub use transport::{Transport, TransportHandle};

/// Steps per pattern (one bar of sixteenth notes).
pub const NUM_STEPS: usize = 16;

/// Tracks per pattern, one per drum voice.
pub const NUM_TRACKS: usize = crate::samples::NUM_VOICES;

pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 200;
pub const DEFAULT_BPM: u32 = 120;

/// A tempo in beats per minute, always within [`MIN_BPM`, `MAX_BPM`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    /// Creates a tempo, clamping the BPM into range.
    pub fn new(bpm: u32) -> Tempo {
        Tempo(bpm.clamp(MIN_BPM, MAX_BPM))
    }

    pub fn bpm(self) -> u32 {
        self.0
    }

    /// Duration of one sixteenth-note step in seconds.
    pub fn seconds_per_step(self) -> f64 {
        60.0 / self.0 as f64 / 4.0
    }

    /// Duration of a whole pattern in seconds.
    pub fn seconds_per_bar(self) -> f64 {
        self.seconds_per_step() * NUM_STEPS as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo(DEFAULT_BPM)
    }
}

impl From<u32> for Tempo {
    fn from(bpm: u32) -> Self {
        Tempo::new(bpm)
    }
}

impl From<Tempo> for u32 {
    fn from(tempo: Tempo) -> Self {
        tempo.0
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}

/// Clock time of the `index`th step after `origin` at a constant tempo.
///
/// Both the live scheduler and the offline renderer place hits with this, so a
/// render lines up with what was heard.
pub fn step_time(origin: f64, index: u64, tempo: Tempo) -> f64 {
    origin + index as f64 * tempo.seconds_per_step()
}

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

//! Drum sample playback.
//!
//! This module provides:
//! - The fixed set of eight drum voices
//! - Sample decoding into memory (zero-latency playback)
//! - One-shot voice triggering on the shared bus

use std::{fmt, path::PathBuf};

mod bank;
mod voice;

pub use bank::SampleBank;
pub use voice::{VoicePlayer, BOOST_808};

/// Number of drum voices (and sequencer tracks).
pub const NUM_VOICES: usize = 8;

/// The drum voices, in track order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Voice {
    Bass808,
    Kick,
    Snare,
    Clap,
    ClosedHat,
    OpenHat,
    Crash,
    Perc,
}

impl Voice {
    /// All voices, indexed by track.
    pub const ALL: [Voice; NUM_VOICES] = [
        Voice::Bass808,
        Voice::Kick,
        Voice::Snare,
        Voice::Clap,
        Voice::ClosedHat,
        Voice::OpenHat,
        Voice::Crash,
        Voice::Perc,
    ];

    /// Returns the voice for a track index.
    pub fn from_index(index: usize) -> Option<Voice> {
        Self::ALL.get(index).copied()
    }

    /// Returns the track index of this voice.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name of the voice.
    pub fn name(self) -> &'static str {
        match self {
            Voice::Bass808 => "808",
            Voice::Kick => "Kick",
            Voice::Snare => "Snare",
            Voice::Clap => "Clap",
            Voice::ClosedHat => "Closed Hat",
            Voice::OpenHat => "Open Hat",
            Voice::Crash => "Crash",
            Voice::Perc => "Perc",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where a voice's encoded audio comes from.
#[derive(Clone, Debug)]
pub enum SampleSource {
    /// An encoded file on disk.
    Path(PathBuf),
    /// Encoded audio already in memory, with an optional format hint (file extension).
    Bytes {
        data: Vec<u8>,
        hint: Option<String>,
    },
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleSource::Path(path) => write!(f, "{}", path.display()),
            SampleSource::Bytes { data, .. } => write!(f, "<{} bytes>", data.len()),
        }
    }
}

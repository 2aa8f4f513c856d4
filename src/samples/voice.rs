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
use std::sync::Arc;

use tracing::debug;

use super::{SampleBank, Voice};
use crate::audio::{Bus, NodeHandle, PlaybackNode};
use crate::sequencer::pattern::clamp_cents;

/// Extra gain for the 808 voice, relative to the base voice gain.
pub const BOOST_808: f32 = 1.5;

/// Triggers drum samples on the shared bus.
#[derive(Clone)]
pub struct VoicePlayer {
    bank: Arc<SampleBank>,
    bus: Arc<dyn Bus>,
    /// Gain applied to every voice before any per-voice boost.
    base_gain: f32,
}

impl VoicePlayer {
    /// Creates a new voice player.
    pub fn new(bank: Arc<SampleBank>, bus: Arc<dyn Bus>, base_gain: f32) -> Self {
        Self {
            bank,
            bus,
            base_gain,
        }
    }

    /// The bus this player schedules on.
    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    /// The sample bank this player reads from.
    pub fn bank(&self) -> &Arc<SampleBank> {
        &self.bank
    }

    /// The gain stage for a voice.
    pub fn voice_gain(&self, voice_index: usize) -> f32 {
        if voice_index == Voice::Bass808.index() {
            self.base_gain * BOOST_808
        } else {
            self.base_gain
        }
    }

    /// Plays a voice at `time` (or now) detuned by `cents`.
    ///
    /// Never fails: an unknown voice, an unready bank or a voice without a sample
    /// is a silent no-op and returns `None`.
    pub fn trigger(&self, voice_index: usize, time: Option<f64>, cents: i16) -> Option<NodeHandle> {
        let Some(voice) = Voice::from_index(voice_index) else {
            debug!(voice_index, "Ignoring trigger for unknown voice");
            return None;
        };
        if !self.bank.is_ready() {
            debug!(voice = voice.name(), "Sample bank not ready, ignoring trigger");
            return None;
        }
        let Some(buffer) = self.bank.buffer(voice_index) else {
            debug!(voice = voice.name(), "No sample for voice, ignoring trigger");
            return None;
        };

        let start_time = time.unwrap_or_else(|| self.bus.now());
        let cents = clamp_cents(cents);
        let node = PlaybackNode {
            playback_rate: PlaybackNode::rate_for_cents(cents),
            gain: self.voice_gain(voice_index),
            ..PlaybackNode::new(buffer, start_time)
        };
        Some(self.bus.schedule(node))
    }
}

impl std::fmt::Debug for VoicePlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoicePlayer")
            .field("bank", &self.bank)
            .field("base_gain", &self.base_gain)
            .finish()
    }
}

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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::sequencer::{Tempo, DEFAULT_BPM};

const DEFAULT_LOOK_AHEAD: Duration = Duration::from_millis(100);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);
const DEFAULT_VOICE_GAIN: f32 = 0.8;

/// A YAML representation of the sequencer configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Sequencer {
    /// Starting tempo. Clamped to the supported range.
    bpm: Option<u32>,

    /// How far ahead of the clock steps are booked, e.g. "100ms".
    look_ahead: Option<String>,

    /// How often the scheduler runs, e.g. "25ms".
    poll_interval: Option<String>,

    /// Gain applied to every drum voice (default: 0.8)
    voice_gain: Option<f32>,
}

fn parse_duration(
    field: &'static str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::Duration {
                field,
                reason: e.to_string(),
            })?
            .into()),
        None => Ok(default),
    }
}

impl Sequencer {
    /// Returns the starting tempo (default: 120 BPM)
    pub fn tempo(&self) -> Tempo {
        Tempo::new(self.bpm.unwrap_or(DEFAULT_BPM))
    }

    /// Returns the look-ahead window (default: 100ms)
    pub fn look_ahead(&self) -> Result<Duration, ConfigError> {
        parse_duration("sequencer.look_ahead", &self.look_ahead, DEFAULT_LOOK_AHEAD)
    }

    /// Returns the scheduling interval (default: 25ms)
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(
            "sequencer.poll_interval",
            &self.poll_interval,
            DEFAULT_POLL_INTERVAL,
        )
    }

    /// Returns the base voice gain (default: 0.8)
    pub fn voice_gain(&self) -> f32 {
        self.voice_gain.unwrap_or(DEFAULT_VOICE_GAIN)
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let look_ahead = self.look_ahead()?;
        let poll_interval = self.poll_interval()?;
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "sequencer.poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if look_ahead < poll_interval {
            return Err(ConfigError::Invalid {
                field: "sequencer.look_ahead",
                reason: format!(
                    "{}ms is shorter than the poll interval ({}ms)",
                    look_ahead.as_millis(),
                    poll_interval.as_millis()
                ),
            });
        }
        let gain = self.voice_gain();
        if !gain.is_finite() || gain < 0.0 {
            return Err(ConfigError::Invalid {
                field: "sequencer.voice_gain",
                reason: format!("{gain} is not a valid gain"),
            });
        }
        Ok(())
    }
}

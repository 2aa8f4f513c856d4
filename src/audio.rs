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
use std::{error::Error, fmt};

use crate::config;

pub mod buffer;
pub mod clock;
pub mod cpal;
pub mod decode;
pub mod mixer;
pub mod mock;

pub use buffer::SampleBuffer;
pub use clock::{Bus, Clock, NodeHandle, PlaybackNode};
pub use decode::{decode_bytes, decode_file, DecodeError};
pub use mixer::AudioMixer;

/// A running audio output. The mixer it exposes is both the shared bus and the
/// audio clock for everything that plays through it.
pub trait Output: fmt::Display + Send + Sync {
    /// The mixer feeding this output.
    fn mixer(&self) -> &AudioMixer;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<cpal::Device>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Opens the output described by the config. Device names starting with `mock`
/// open a mock output that keeps time without a sound card.
pub fn open_output(config: &config::Audio) -> Result<Box<dyn Output>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Output::start(
            device,
            config.channels(),
            config.sample_rate(),
        )));
    }

    Ok(Box::new(cpal::Output::start(config)?))
}

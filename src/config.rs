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
use std::path::{Path, PathBuf};

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use tracing::warn;

use crate::samples::{SampleSource, NUM_VOICES};
use crate::sequencer::presets::{self, Preset};

mod audio;
mod error;
mod sequencer;

pub use self::audio::Audio;
pub use self::error::ConfigError;
pub use self::sequencer::Sequencer;

/// Prefix for environment overrides, e.g. `STEPDECK_SEQUENCER__BPM=140`.
pub const ENV_PREFIX: &str = "STEPDECK";

/// The deck configuration file.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Deck {
    #[serde(default)]
    audio: Audio,

    #[serde(default)]
    sequencer: Sequencer,

    /// One encoded sample per voice, in voice order. Relative paths are
    /// resolved against the config file's directory.
    #[serde(default)]
    samples: Vec<PathBuf>,

    /// Optional YAML file of user presets.
    presets_file: Option<PathBuf>,

    /// Where exports are written (default: the config file's directory).
    output_dir: Option<PathBuf>,

    #[serde(skip)]
    base_dir: PathBuf,
}

impl Deck {
    /// Parse a deck configuration from a YAML file, with environment overrides.
    pub fn deserialize(path: &Path) -> Result<Deck, ConfigError> {
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::build(Config::builder().add_source(File::from(path)), base_dir)
    }

    fn build(builder: ConfigBuilder<DefaultState>, base_dir: PathBuf) -> Result<Deck, ConfigError> {
        let mut deck = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize::<Deck>()?;
        deck.base_dir = base_dir;
        deck.validate()?;
        Ok(deck)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.audio.validate()?;
        self.sequencer.validate()?;
        if self.samples.len() > NUM_VOICES {
            return Err(ConfigError::Invalid {
                field: "samples",
                reason: format!(
                    "{} samples given, at most {} voices",
                    self.samples.len(),
                    NUM_VOICES
                ),
            });
        }
        if self.samples.len() < NUM_VOICES {
            warn!(
                samples = self.samples.len(),
                voices = NUM_VOICES,
                "Fewer samples than voices, the rest will be silent"
            );
        }
        Ok(())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Sample paths in voice order, resolved against the config file's directory.
    pub fn sample_paths(&self) -> Vec<PathBuf> {
        self.samples.iter().map(|path| self.resolve(path)).collect()
    }

    /// Sample sources for the bank, in voice order.
    pub fn sample_sources(&self) -> Vec<SampleSource> {
        self.sample_paths()
            .into_iter()
            .map(SampleSource::Path)
            .collect()
    }

    /// The built-in presets followed by any from the presets file.
    pub fn presets(&self) -> Result<Vec<Preset>, ConfigError> {
        let mut all = presets::builtin();
        if let Some(file) = &self.presets_file {
            all.extend(presets::load_file(self.resolve(file))?);
        }
        Ok(all)
    }

    /// Directory exports are written to.
    pub fn output_dir(&self) -> PathBuf {
        match &self.output_dir {
            Some(dir) => self.resolve(dir),
            None => self.base_dir.clone(),
        }
    }
}

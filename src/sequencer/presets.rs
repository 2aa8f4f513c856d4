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

//! Named loops (a pattern plus a tempo) that load wholesale into the current slot.
//!
//! User presets live in a YAML file:
//!
//! ```yaml
//! presets:
//!   - name: Half Time
//!     bpm: 85
//!     tracks:
//!       - "x.......|........"   # 808
//!       - "x.......|..x....."   # kick
//!       - "........|x......."   # snare
//!     pitches:
//!       - { track: 0, step: 0, cents: -500 }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::pattern::{Pattern, PatternParseError};
use super::Tempo;

/// A named pattern and tempo.
#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    pub name: String,
    pub tempo: Tempo,
    pub pattern: Pattern,
}

/// Error types for preset loading.
#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid preset file: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Preset {name}: {source}")]
    Pattern {
        name: String,
        source: PatternParseError,
    },
}

#[derive(Deserialize)]
struct PresetFile {
    presets: Vec<PresetDefinition>,
}

#[derive(Deserialize)]
struct PresetDefinition {
    name: String,
    bpm: Tempo,
    tracks: Vec<String>,
    #[serde(default)]
    pitches: Vec<PitchDefinition>,
}

#[derive(Deserialize)]
struct PitchDefinition {
    track: usize,
    step: usize,
    cents: i16,
}

impl PresetDefinition {
    fn into_preset(self) -> Result<Preset, PresetError> {
        let pattern = Pattern::from_rows(&self.tracks).map_err(|source| PresetError::Pattern {
            name: self.name.clone(),
            source,
        })?;
        let pattern = self
            .pitches
            .iter()
            .fold(pattern, |p, pitch| p.with_pitch(pitch.track, pitch.step, pitch.cents));
        Ok(Preset {
            name: self.name,
            tempo: self.bpm,
            pattern,
        })
    }
}

fn builtin_preset(name: &str, bpm: u32, rows: &[&str]) -> Preset {
    Preset {
        name: name.to_string(),
        tempo: Tempo::new(bpm),
        // Built-in rows are well formed; a typo shows up as an empty pattern in the tests.
        pattern: Pattern::from_rows(rows).unwrap_or_default(),
    }
}

/// The loops that ship with the sequencer.
pub fn builtin() -> Vec<Preset> {
    let mut trap = builtin_preset(
        "Trap",
        140,
        &[
            "x.........x.....",
            "x.....x.........",
            "........x.......",
            "........x.......",
            "x.xxx.x.x.xxx.x.",
            "...............x",
            "................",
            "................",
        ],
    );
    // Second 808 hit slides down a fourth.
    trap.pattern = trap.pattern.with_pitch(0, 10, -500);

    vec![
        builtin_preset(
            "Four On The Floor",
            124,
            &[
                "................",
                "x...x...x...x...",
                "................",
                "....x.......x...",
                "..x...x...x...x.",
                "................",
                "x...............",
                "................",
            ],
        ),
        builtin_preset(
            "Boom Bap",
            90,
            &[
                "................",
                "x.......x.x.....",
                "....x.......x...",
                "................",
                "x.x.x.x.x.x.x.x.",
                "................",
                "................",
                ".......x........",
            ],
        ),
        trap,
        builtin_preset(
            "Breakbeat",
            170,
            &[
                "................",
                "x.........x.....",
                "....x..x.x..x..x",
                "................",
                "x.x.x.x.x.x.x.x.",
                "..............x.",
                "x...............",
                "................",
            ],
        ),
    ]
}

/// Parses a YAML preset file.
pub fn parse(yaml: &str) -> Result<Vec<Preset>, PresetError> {
    let file: PresetFile = serde_yml::from_str(yaml)?;
    file.presets
        .into_iter()
        .map(PresetDefinition::into_preset)
        .collect()
}

/// Loads user presets from a YAML file.
pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Vec<Preset>, PresetError> {
    let path = path.as_ref();
    let presets = parse(&fs::read_to_string(path)?)?;
    info!(path = ?path, count = presets.len(), "Loaded presets");
    Ok(presets)
}

/// Finds a preset by name, ignoring case.
pub fn find<'a>(presets: &'a [Preset], name: &str) -> Option<&'a Preset> {
    presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

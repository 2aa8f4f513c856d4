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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use super::{SampleSource, Voice, NUM_VOICES};
use crate::audio::{decode_bytes, decode_file, DecodeError, SampleBuffer};

/// Decoded drum samples, one slot per voice.
///
/// A slot whose source failed to decode stays empty and the voice is silent.
pub struct SampleBank {
    /// Rate every sample is converted to on load.
    target_sample_rate: u32,
    buffers: RwLock<[Option<Arc<SampleBuffer>>; NUM_VOICES]>,
    ready: AtomicBool,
    /// Serializes loads so a second caller sees the first one's result.
    load_lock: tokio::sync::Mutex<()>,
}

impl SampleBank {
    /// Creates an empty bank that converts samples to the given rate.
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate,
            buffers: RwLock::new(Default::default()),
            ready: AtomicBool::new(false),
            load_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a ready bank from already decoded buffers. Missing slots are silent.
    pub fn with_buffers(target_sample_rate: u32, buffers: Vec<Option<SampleBuffer>>) -> Self {
        let bank = Self::new(target_sample_rate);
        bank.store(
            buffers
                .into_iter()
                .map(|b| b.map(|b| Arc::new(b.resample_linear(target_sample_rate))))
                .collect(),
        );
        bank
    }

    /// Returns the rate samples are converted to.
    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Decodes the given sources, in voice order. Only the first call does any work.
    ///
    /// Per-source failures are logged and leave that voice silent; they never fail the load.
    pub async fn load(&self, sources: Vec<SampleSource>) {
        let _guard = self.load_lock.lock().await;
        if self.is_ready() {
            return;
        }

        if sources.len() > NUM_VOICES {
            warn!(
                sources = sources.len(),
                voices = NUM_VOICES,
                "More sample sources than voices, ignoring the rest"
            );
        }

        let target_sample_rate = self.target_sample_rate;
        let decoded = tokio::task::spawn_blocking(move || {
            sources
                .into_iter()
                .take(NUM_VOICES)
                .enumerate()
                .map(|(index, source)| decode_source(index, &source, target_sample_rate))
                .collect::<Vec<_>>()
        })
        .await;

        match decoded {
            Ok(buffers) => self.store(buffers),
            Err(e) => {
                error!(error = %e, "Sample decode task failed, all voices are silent");
                self.ready.store(true, Ordering::Release);
            }
        }

        info!(
            loaded = self.loaded_count(),
            voices = NUM_VOICES,
            sample_rate = self.target_sample_rate,
            "Sample bank ready"
        );
    }

    /// Installs buffers already converted to the target rate.
    fn store(&self, buffers: Vec<Option<Arc<SampleBuffer>>>) {
        let mut slots = self.buffers.write();
        for (slot, buffer) in slots.iter_mut().zip(buffers) {
            *slot = buffer;
        }
        drop(slots);
        self.ready.store(true, Ordering::Release);
    }

    /// True once the decode pass has completed, whether or not every sample loaded.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Returns the buffer for a voice index, if it loaded.
    pub fn buffer(&self, voice_index: usize) -> Option<Arc<SampleBuffer>> {
        self.buffers.read().get(voice_index).cloned().flatten()
    }

    /// Number of voices with a decoded sample.
    pub fn loaded_count(&self) -> usize {
        self.buffers.read().iter().filter(|b| b.is_some()).count()
    }
}

impl std::fmt::Debug for SampleBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBank")
            .field("target_sample_rate", &self.target_sample_rate)
            .field("ready", &self.is_ready())
            .field("loaded", &self.loaded_count())
            .finish()
    }
}

/// Decodes one source and converts it to the target rate. Failures are logged here and
/// become a silent voice.
fn decode_source(
    index: usize,
    source: &SampleSource,
    target_sample_rate: u32,
) -> Option<Arc<SampleBuffer>> {
    let voice = Voice::from_index(index).map(Voice::name).unwrap_or("?");
    let result: Result<SampleBuffer, DecodeError> = match source {
        SampleSource::Path(path) => decode_file(path),
        SampleSource::Bytes { data, hint } => decode_bytes(data.clone(), hint.as_deref()),
    };

    match result {
        Ok(buffer) => {
            info!(
                voice,
                source = %source,
                channels = buffer.channel_count(),
                original_rate = buffer.sample_rate(),
                target_rate = target_sample_rate,
                duration_ms = buffer.duration().as_millis(),
                "Loaded sample"
            );
            Some(Arc::new(buffer.resample_linear(target_sample_rate)))
        }
        Err(e) => {
            error!(
                voice,
                source = %source,
                error = %e,
                "Failed to load sample, voice will be silent"
            );
            None
        }
    }
}

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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{info, span, Level};

use crate::audio::mixer::AudioMixer;

/// A mock output. Mixes in real time and throws the audio away.
pub struct Output {
    name: String,
    mixer: AudioMixer,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Starts a mock output with the given name and format.
    pub fn start(name: &str, num_channels: u16, sample_rate: u32) -> Output {
        let mixer = AudioMixer::new(num_channels, sample_rate);
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let mixer = mixer.clone();
            let running = running.clone();
            let name = name.to_string();
            thread::spawn(move || {
                let span = span!(Level::INFO, "mock output");
                let _enter = span.enter();
                info!(device = %name, sample_rate, "Mock output started.");

                let started = Instant::now();
                let mut scratch = Vec::new();
                while running.load(Ordering::Relaxed) {
                    // Keep the mixer clock level with wall-clock time.
                    let target = (started.elapsed().as_secs_f64() * sample_rate as f64) as u64;
                    let behind = target.saturating_sub(mixer.current_sample()) as usize;
                    if behind > 0 {
                        scratch.resize(behind * num_channels as usize, 0.0);
                        mixer.process_into_output(&mut scratch, behind);
                    }
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };

        Output {
            name: name.to_string(),
            mixer,
            running,
            thread: Some(thread),
        }
    }
}

impl super::Output for Output {
    fn mixer(&self) -> &AudioMixer {
        &self.mixer
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.mixer.stop_all();
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

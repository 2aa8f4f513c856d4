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
    error::Error,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::audio::{Bus, Clock, NodeHandle, PlaybackNode};

/// Test signal generators.
pub mod audio_test_utils {
    use std::f32::consts::PI;

    /// Generate a sine wave.
    pub fn sine(frequency: f32, amplitude: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
            .collect()
    }
}

/// Writes planar i16 samples as a 16-bit WAV file with hound.
pub fn write_wav(
    path: &Path,
    samples: Vec<Vec<i16>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let num_channels = samples.len();
    assert!(num_channels <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::create(
        path,
        WavSpec {
            channels: num_channels as u16,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    let frames = samples.iter().map(|c| c.len()).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in &samples {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0))?;
        }
    }
    writer.finalize()?;

    Ok(())
}

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// A bus that records every scheduled node instead of playing it.
#[derive(Default)]
pub struct RecordingBus {
    pub clock: ManualClock,
    nodes: Mutex<Vec<(PlaybackNode, NodeHandle)>>,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every node scheduled so far, in scheduling order.
    pub fn nodes(&self) -> Vec<(PlaybackNode, NodeHandle)> {
        self.nodes.lock().clone()
    }

    /// Start times of every node scheduled so far.
    pub fn start_times(&self) -> Vec<f64> {
        self.nodes.lock().iter().map(|(n, _)| n.start_time).collect()
    }

    pub fn clear(&self) {
        self.nodes.lock().clear();
    }
}

impl Clock for RecordingBus {
    fn now(&self) -> f64 {
        self.clock.now()
    }
}

impl Bus for RecordingBus {
    fn schedule(&self, node: PlaybackNode) -> NodeHandle {
        let handle = NodeHandle::new();
        self.nodes.lock().push((node, handle.clone()));
        handle
    }
}

/// Asserts that two times agree to within a microsecond.
pub fn assert_time_eq(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// Wait for the given async predicate to return true or fail.
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = Instant::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(3);

    loop {
        if start.elapsed() > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

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

//! Offline bounce of one bar to a buffer.

use std::sync::Arc;

use tracing::{info, span, Level};

use crate::audio::{AudioMixer, Bus, PlaybackNode, SampleBuffer};
use crate::samples::{SampleBank, VoicePlayer};
use crate::sequencer::{step_time, Pattern, ScheduledEvent, Tempo, NUM_STEPS};

/// Error types for offline rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Invalid channel count {0}")]
    InvalidChannels(u16),

    #[error("Invalid sample rate {0}")]
    InvalidSampleRate(u32),

    #[error("Drums-only and melody-only are mutually exclusive")]
    ConflictingOptions,

    #[error("Render target has no frames")]
    Empty,

    #[error("Render task failed: {0}")]
    Task(String),
}

/// What to include in a render.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub drums_only: bool,
    pub melody_only: bool,
}

/// Books every hit of one pass through `pattern`, starting at `origin`.
pub fn book_pattern(
    player: &VoicePlayer,
    pattern: &Pattern,
    tempo: Tempo,
    origin: f64,
) -> Vec<ScheduledEvent> {
    let mut events = Vec::new();
    for step in 0..NUM_STEPS {
        let time = step_time(origin, step as u64, tempo);
        for (voice, cents) in pattern.hits_at(step) {
            player.trigger(voice, Some(time), cents);
            events.push(ScheduledEvent::Hit { voice, time, cents });
        }
    }
    events
}

/// Renders patterns to audio without a sound card.
#[derive(Clone, Debug)]
pub struct OfflineRenderer {
    bank: Arc<SampleBank>,
    num_channels: u16,
    sample_rate: u32,
    voice_gain: f32,
}

impl OfflineRenderer {
    pub fn new(
        bank: Arc<SampleBank>,
        num_channels: u16,
        sample_rate: u32,
        voice_gain: f32,
    ) -> Self {
        Self {
            bank,
            num_channels,
            sample_rate,
            voice_gain,
        }
    }

    /// Renders one bar of `pattern` at `tempo`, with the melody starting at 0.
    pub fn render(
        &self,
        pattern: &Pattern,
        tempo: Tempo,
        melody: Option<Arc<SampleBuffer>>,
        options: RenderOptions,
    ) -> Result<SampleBuffer, RenderError> {
        let span = span!(Level::INFO, "render");
        let _enter = span.enter();

        if self.num_channels == 0 {
            return Err(RenderError::InvalidChannels(self.num_channels));
        }
        if self.sample_rate == 0 {
            return Err(RenderError::InvalidSampleRate(self.sample_rate));
        }
        if options.drums_only && options.melody_only {
            return Err(RenderError::ConflictingOptions);
        }

        let frames = (tempo.seconds_per_bar() * self.sample_rate as f64).round() as usize;
        if frames == 0 {
            return Err(RenderError::Empty);
        }

        let mixer = Arc::new(AudioMixer::new(self.num_channels, self.sample_rate));
        let mut hits = 0;
        if !options.melody_only {
            let player = VoicePlayer::new(self.bank.clone(), mixer.clone(), self.voice_gain);
            hits = book_pattern(&player, pattern, tempo, 0.0).len();
        }
        let melody = melody.filter(|_| !options.drums_only);
        let with_melody = melody.is_some();
        if let Some(melody) = melody {
            mixer.schedule(PlaybackNode::new(melody, 0.0));
        }

        let buffer = mixer.render(frames);
        info!(
            bpm = tempo.bpm(),
            hits,
            melody = with_melody,
            frames,
            peak = buffer.peak(),
            "Rendered pattern"
        );
        Ok(buffer)
    }

    /// [`OfflineRenderer::render`] on the blocking thread pool.
    pub async fn render_async(
        &self,
        pattern: Pattern,
        tempo: Tempo,
        melody: Option<Arc<SampleBuffer>>,
        options: RenderOptions,
    ) -> Result<SampleBuffer, RenderError> {
        let renderer = self.clone();
        tokio::task::spawn_blocking(move || renderer.render(&pattern, tempo, melody, options))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::samples::NUM_VOICES;
    use crate::sequencer::StepScheduler;
    use crate::testutil::RecordingBus;

    const RATE: u32 = 1000;

    /// A bank where every voice is a single-frame click.
    fn click_bank() -> Arc<SampleBank> {
        Arc::new(SampleBank::with_buffers(
            RATE,
            (0..NUM_VOICES)
                .map(|_| Some(SampleBuffer::from_planar(vec![vec![1.0]], RATE)))
                .collect(),
        ))
    }

    fn nonzero_frames(buffer: &SampleBuffer) -> Vec<usize> {
        buffer
            .channel(0)
            .iter()
            .enumerate()
            .filter(|(_, s)| **s != 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    fn quarters() -> Pattern {
        Pattern::from_rows(&["................", "x...x...x...x..."]).unwrap()
    }

    #[test]
    fn test_render_places_hits_on_steps() {
        let renderer = OfflineRenderer::new(click_bank(), 1, RATE, 0.5);
        let buffer = renderer
            .render(&quarters(), Tempo::new(120), None, RenderOptions::default())
            .unwrap();

        // One bar at 120 BPM is 2 seconds.
        assert_eq!(buffer.frame_count(), 2000);
        assert_eq!(nonzero_frames(&buffer), vec![0, 500, 1000, 1500]);
        assert_eq!(buffer.channel(0)[500], 0.5);
    }

    #[test]
    fn test_render_matches_live_scheduler_times() {
        for bpm in [60, 97, 140, 200] {
            let tempo = Tempo::new(bpm);
            let mut pattern = Pattern::empty();
            for step in 0..NUM_STEPS {
                pattern = pattern.with_toggled(step % NUM_VOICES, step);
            }

            let offline = book_pattern(
                &VoicePlayer::new(click_bank(), RecordingBus::new(), 1.0),
                &pattern,
                tempo,
                0.0,
            );

            let bus = RecordingBus::new();
            let mut live = StepScheduler::new(
                VoicePlayer::new(click_bank(), bus.clone(), 1.0),
                tempo,
                Duration::ZERO,
            );
            for step in 0..NUM_STEPS {
                live.toggle_step(step % NUM_VOICES, step);
            }
            live.start();
            bus.clock.set(tempo.seconds_per_bar() - 1e-9);
            let live_events = live.tick();

            assert_eq!(offline.len(), NUM_STEPS);
            assert_eq!(live_events, offline);
        }
    }

    #[test]
    fn test_808_is_boosted_in_render() {
        let renderer = OfflineRenderer::new(click_bank(), 1, RATE, 0.4);
        let pattern = Pattern::empty().with_toggled(0, 0).with_toggled(1, 8);
        let buffer = renderer
            .render(&pattern, Tempo::new(120), None, RenderOptions::default())
            .unwrap();
        assert!((buffer.channel(0)[0] - 0.6).abs() < 1e-6);
        assert!((buffer.channel(0)[1000] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_melody_and_drum_options() {
        let renderer = OfflineRenderer::new(click_bank(), 2, RATE, 1.0);
        let melody = Arc::new(SampleBuffer::from_planar(vec![vec![0.0, 0.0, 0.25]], RATE));
        let pattern = quarters();
        let tempo = Tempo::new(120);

        let both = renderer
            .render(&pattern, tempo, Some(melody.clone()), RenderOptions::default())
            .unwrap();
        assert_eq!(nonzero_frames(&both), vec![0, 2, 500, 1000, 1500]);
        assert_eq!(both.channel(1)[2], 0.25);

        let drums = renderer
            .render(
                &pattern,
                tempo,
                Some(melody.clone()),
                RenderOptions {
                    drums_only: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(nonzero_frames(&drums), vec![0, 500, 1000, 1500]);

        let melody_only = renderer
            .render(
                &pattern,
                tempo,
                Some(melody),
                RenderOptions {
                    melody_only: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(nonzero_frames(&melody_only), vec![2]);
    }

    #[test]
    fn test_melody_is_truncated_to_one_bar() {
        let renderer = OfflineRenderer::new(click_bank(), 1, RATE, 1.0);
        let melody = Arc::new(SampleBuffer::from_planar(vec![vec![0.1; 5000]], RATE));
        let buffer = renderer
            .render(&Pattern::empty(), Tempo::new(60), Some(melody), RenderOptions::default())
            .unwrap();
        assert_eq!(buffer.frame_count(), 4000);
        assert!(buffer.channel(0).iter().all(|s| (*s - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_render_errors() {
        let pattern = quarters();
        let tempo = Tempo::new(120);
        assert!(matches!(
            OfflineRenderer::new(click_bank(), 0, RATE, 1.0).render(
                &pattern,
                tempo,
                None,
                Default::default()
            ),
            Err(RenderError::InvalidChannels(0))
        ));
        assert!(matches!(
            OfflineRenderer::new(click_bank(), 2, 0, 1.0).render(
                &pattern,
                tempo,
                None,
                Default::default()
            ),
            Err(RenderError::InvalidSampleRate(0))
        ));
        assert!(matches!(
            OfflineRenderer::new(click_bank(), 2, RATE, 1.0).render(
                &pattern,
                tempo,
                None,
                RenderOptions {
                    drums_only: true,
                    melody_only: true
                }
            ),
            Err(RenderError::ConflictingOptions)
        ));
    }

    #[tokio::test]
    async fn test_render_async() {
        let renderer = OfflineRenderer::new(click_bank(), 1, RATE, 1.0);
        let buffer = renderer
            .render_async(quarters(), Tempo::new(120), None, RenderOptions::default())
            .await
            .unwrap();
        assert_eq!(nonzero_frames(&buffer), vec![0, 500, 1000, 1500]);
    }
}

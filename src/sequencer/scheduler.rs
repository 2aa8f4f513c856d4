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

//! Look-ahead step scheduling against the audio clock.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::pattern::{Pattern, PatternBank};
use super::presets::Preset;
use super::{step_time, Tempo, NUM_STEPS};
use crate::audio::{NodeHandle, PlaybackNode, SampleBuffer};
use crate::samples::VoicePlayer;

/// Transport state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Stopped,
    Running,
}

/// A playback request issued by a scheduling pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScheduledEvent {
    /// A drum hit.
    Hit { voice: usize, time: f64, cents: i16 },
    /// The melody overlay, at the top of a bar.
    Melody { time: f64 },
}

impl ScheduledEvent {
    /// Clock time of the event in seconds.
    pub fn time(&self) -> f64 {
        match self {
            ScheduledEvent::Hit { time, .. } => *time,
            ScheduledEvent::Melody { time } => *time,
        }
    }
}

/// A point-in-time view of the scheduler.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub state: State,
    pub step: usize,
    pub tempo: Tempo,
    pub pattern_index: usize,
    pub pattern: Arc<Pattern>,
    pub next_note_time: f64,
    pub has_melody: bool,
}

/// The drum sequencer's scheduler.
pub struct StepScheduler {
    player: VoicePlayer,
    look_ahead: f64,
    state: State,
    /// Step that will be booked next.
    step: usize,
    next_note_time: f64,
    /// Time of the step at which the current tempo took effect.
    anchor_time: f64,
    anchor_tempo: Tempo,
    steps_since_anchor: u64,
    /// Tempo requested by the user; adopted at the next step boundary.
    tempo: Tempo,
    patterns: PatternBank,
    melody: Option<Arc<SampleBuffer>>,
    /// Melody nodes that may still be sounding.
    melody_nodes: Vec<NodeHandle>,
}

impl StepScheduler {
    /// Creates a stopped scheduler.
    pub fn new(player: VoicePlayer, tempo: Tempo, look_ahead: Duration) -> Self {
        Self {
            player,
            look_ahead: look_ahead.as_secs_f64(),
            state: State::Stopped,
            step: 0,
            next_note_time: 0.0,
            anchor_time: 0.0,
            anchor_tempo: tempo,
            steps_since_anchor: 0,
            tempo,
            patterns: PatternBank::new(),
            melody: None,
            melody_nodes: Vec::new(),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// The step the next booking will use.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn next_note_time(&self) -> f64 {
        self.next_note_time
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn patterns(&self) -> &PatternBank {
        &self.patterns
    }

    pub fn current_pattern(&self) -> Arc<Pattern> {
        self.patterns.current()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            step: self.step,
            tempo: self.tempo,
            pattern_index: self.patterns.current_index(),
            pattern: self.patterns.current(),
            next_note_time: self.next_note_time,
            has_melody: self.melody.is_some(),
        }
    }

    /// Starts from step 0 at the current clock time.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Sequencer already running");
            return;
        }

        let now = self.player.bus().now();
        self.state = State::Running;
        self.step = 0;
        self.next_note_time = now;
        self.anchor_time = now;
        self.anchor_tempo = self.tempo;
        self.steps_since_anchor = 0;
        info!(bpm = self.tempo.bpm(), at = now, "Sequencer started");
    }

    /// Stops and rewinds to step 0. The melody is cut; drum hits already booked
    /// still play.
    pub fn stop(&mut self) {
        for handle in self.melody_nodes.drain(..) {
            handle.cancel();
        }
        self.step = 0;
        if self.is_running() {
            self.state = State::Stopped;
            info!("Sequencer stopped");
        }
    }

    /// Books every step that falls inside the look-ahead window and returns what
    /// was requested. Does nothing while stopped.
    pub fn tick(&mut self) -> Vec<ScheduledEvent> {
        let mut events = Vec::new();
        if !self.is_running() {
            return events;
        }

        let horizon = self.player.bus().now() + self.look_ahead;
        while self.next_note_time < horizon {
            self.schedule_step(&mut events);
            self.advance();
        }

        self.melody_nodes.retain(|handle| !handle.is_finished());
        events
    }

    fn schedule_step(&mut self, events: &mut Vec<ScheduledEvent>) {
        let time = self.next_note_time;
        let pattern = self.patterns.current();
        for (voice, cents) in pattern.hits_at(self.step) {
            self.player.trigger(voice, Some(time), cents);
            events.push(ScheduledEvent::Hit { voice, time, cents });
        }

        if self.step == 0 {
            if let Some(melody) = &self.melody {
                let node = PlaybackNode::new(melody.clone(), time);
                self.melody_nodes.push(self.player.bus().schedule(node));
                events.push(ScheduledEvent::Melody { time });
            }
        }
    }

    fn advance(&mut self) {
        if self.tempo != self.anchor_tempo {
            self.anchor_time = self.next_note_time;
            self.anchor_tempo = self.tempo;
            self.steps_since_anchor = 0;
        }
        self.steps_since_anchor += 1;
        self.next_note_time =
            step_time(self.anchor_time, self.steps_since_anchor, self.anchor_tempo);
        self.step = (self.step + 1) % NUM_STEPS;
    }

    /// Sets the tempo (clamped). Steps already booked keep their times.
    pub fn set_tempo(&mut self, bpm: u32) -> Tempo {
        self.tempo = Tempo::new(bpm);
        debug!(requested = bpm, bpm = self.tempo.bpm(), "Tempo set");
        self.tempo
    }

    pub fn toggle_step(&mut self, track: usize, step: usize) {
        self.patterns.update(|p| p.with_toggled(track, step));
    }

    pub fn set_pitch(&mut self, track: usize, step: usize, cents: i16) {
        self.patterns.update(|p| p.with_pitch(track, step, cents));
    }

    pub fn clear_step(&mut self, track: usize, step: usize) {
        self.patterns.update(|p| p.with_cleared(track, step));
    }

    /// Empties the current pattern.
    pub fn clear_pattern(&mut self) {
        self.patterns.replace_current(Pattern::empty());
    }

    /// Switches the current pattern slot. Unknown slots are ignored.
    pub fn select_pattern(&mut self, index: usize) -> bool {
        self.patterns.select(index)
    }

    /// Overwrites the current slot with the preset's pattern and adopts its tempo.
    pub fn load_preset(&mut self, preset: &Preset) {
        self.patterns.replace_current(preset.pattern);
        self.tempo = preset.tempo;
        info!(
            preset = preset.name,
            bpm = preset.tempo.bpm(),
            slot = self.patterns.current_index(),
            "Loaded preset"
        );
    }

    /// Sets (or removes) the buffer played at the top of every bar.
    pub fn set_melody(&mut self, melody: Option<Arc<SampleBuffer>>) {
        match &melody {
            Some(buffer) => info!(
                duration_ms = buffer.duration().as_millis(),
                "Melody overlay set"
            ),
            None => info!("Melody overlay removed"),
        }
        self.melody = melody;
    }
}

impl std::fmt::Debug for StepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepScheduler")
            .field("state", &self.state)
            .field("step", &self.step)
            .field("tempo", &self.tempo)
            .field("next_note_time", &self.next_note_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Clock;
    use crate::samples::{SampleBank, NUM_VOICES};
    use crate::sequencer::presets;
    use crate::testutil::{assert_time_eq, RecordingBus};

    const LOOK_AHEAD: Duration = Duration::from_millis(100);
    const POLL: f64 = 0.025;

    fn scheduler(bus: &Arc<RecordingBus>, bpm: u32) -> StepScheduler {
        let bank = Arc::new(SampleBank::with_buffers(
            44100,
            (0..NUM_VOICES)
                .map(|_| Some(SampleBuffer::silent(1, 100, 44100)))
                .collect(),
        ));
        let player = VoicePlayer::new(bank, bus.clone(), 1.0);
        StepScheduler::new(player, Tempo::new(bpm), LOOK_AHEAD)
    }

    /// Polls like the transport does until the clock reaches `until`.
    fn run_until(
        scheduler: &mut StepScheduler,
        bus: &RecordingBus,
        until: f64,
    ) -> Vec<ScheduledEvent> {
        let mut events = scheduler.tick();
        while bus.now() < until {
            bus.clock.advance(POLL);
            events.extend(scheduler.tick());
        }
        events
    }

    fn hit_times(events: &[ScheduledEvent], track: usize) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                ScheduledEvent::Hit { voice, time, .. } if *voice == track => Some(*time),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_books_first_step_at_now() {
        let bus = RecordingBus::new();
        bus.clock.set(3.0);
        let mut s = scheduler(&bus, 120);
        s.toggle_step(1, 0);
        s.start();

        assert!(s.is_running());
        assert_eq!(s.step(), 0);
        assert_eq!(s.next_note_time(), 3.0);

        let events = s.tick();
        assert_eq!(
            events,
            vec![ScheduledEvent::Hit {
                voice: 1,
                time: 3.0,
                cents: 0
            }]
        );
        assert_eq!(bus.start_times(), vec![3.0]);
        assert_eq!(s.step(), 1);
    }

    #[test]
    fn test_live_times_follow_tempo_formula() {
        for bpm in [60, 75, 90, 120, 140, 173, 200] {
            let bus = RecordingBus::new();
            let t0 = 0.37;
            bus.clock.set(t0);
            let mut s = scheduler(&bus, bpm);
            for step in 0..NUM_STEPS {
                s.toggle_step(1, step);
            }
            s.start();

            let tempo = Tempo::new(bpm);
            let events = run_until(&mut s, &bus, t0 + 2.0 * tempo.seconds_per_bar());
            let times = hit_times(&events, 1);
            assert!(times.len() >= 32, "only {} hits at {} BPM", times.len(), bpm);

            for (i, time) in times.iter().enumerate() {
                assert_eq!(*time, step_time(t0, i as u64, tempo));
                assert_time_eq(*time, t0 + i as f64 * (60.0 / bpm as f64) / 4.0);
            }
        }
    }

    #[test]
    fn test_sixteen_advances_wrap_to_start() {
        let bus = RecordingBus::new();
        let mut s = StepScheduler::new(
            VoicePlayer::new(Arc::new(SampleBank::new(44100)), bus.clone(), 1.0),
            Tempo::new(120),
            Duration::ZERO,
        );
        s.start();

        // Just short of the 17th step: exactly 16 steps booked.
        bus.clock.set(16.0 * 0.125 - 1e-9);
        s.tick();
        assert_eq!(s.step(), 0);
        assert_eq!(s.next_note_time(), 2.0);
    }

    #[test]
    fn test_kick_on_quarters_at_140() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 140);
        s.load_preset(&Preset {
            name: "quarters".to_string(),
            tempo: Tempo::new(140),
            pattern: Pattern::from_rows(&["................", "x...x...x...x..."]).unwrap(),
        });
        s.start();

        let events = run_until(&mut s, &bus, 1.5);
        let times = hit_times(&events, 1);
        let expected: Vec<f64> = [0u64, 4, 8, 12]
            .iter()
            .map(|i| *i as f64 * 60.0 / 140.0 / 4.0)
            .collect();
        assert_eq!(times.len(), 4);
        for (time, expected) in times.iter().zip(&expected) {
            assert_time_eq(*time, *expected);
        }
        assert_time_eq(times[1], 0.428571);
    }

    #[test]
    fn test_repeated_ticks_do_not_double_book() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.toggle_step(2, 0);
        s.start();

        assert_eq!(s.tick().len(), 1);
        assert!(s.tick().is_empty());
        assert!(s.tick().is_empty());
        assert_eq!(bus.nodes().len(), 1);
    }

    #[test]
    fn test_step_times_strictly_increase() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 200);
        for step in 0..NUM_STEPS {
            s.toggle_step(1, step);
        }
        s.start();

        let mut last = s.next_note_time();
        let mut times = Vec::new();
        for _ in 0..200 {
            bus.clock.advance(POLL);
            times.extend(s.tick().iter().map(ScheduledEvent::time));
            assert!(s.next_note_time() >= last);
            last = s.next_note_time();
        }
        assert!(times.len() > 16);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_hits_within_a_step_go_in_track_order() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.toggle_step(6, 0);
        s.toggle_step(0, 0);
        s.toggle_step(3, 0);
        s.start();

        let voices: Vec<usize> = s
            .tick()
            .iter()
            .filter_map(|e| match e {
                ScheduledEvent::Hit { voice, .. } => Some(*voice),
                _ => None,
            })
            .collect();
        assert_eq!(voices, vec![0, 3, 6]);
    }

    #[test]
    fn test_pitch_reaches_the_bus() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.set_pitch(4, 0, 1200);
        s.start();
        s.tick();
        assert!((bus.nodes()[0].0.playback_rate - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tempo_change_applies_from_next_step() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        for step in 0..NUM_STEPS {
            s.toggle_step(1, step);
        }
        s.start();
        // Books step 0 at 0.0; step 1 is already due at 0.125.
        s.tick();
        assert_eq!(s.next_note_time(), 0.125);

        s.set_tempo(60);
        let events = run_until(&mut s, &bus, 1.0);
        let times = hit_times(&events, 1);
        // Step 1 keeps its time, then steps are 0.25s apart.
        assert_eq!(times[0], 0.125);
        assert_eq!(times[1], 0.375);
        assert_eq!(times[2], 0.625);
    }

    #[test]
    fn test_tempo_is_clamped() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        assert_eq!(s.set_tempo(20).bpm(), 60);
        assert_eq!(s.set_tempo(900).bpm(), 200);
    }

    #[test]
    fn test_edits_apply_on_next_pass_only() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.start();
        // Step 0 is booked (empty) before the edit lands.
        assert!(s.tick().is_empty());
        s.toggle_step(1, 0);
        s.toggle_step(1, 1);

        bus.clock.advance(0.05);
        let events = s.tick();
        assert_eq!(hit_times(&events, 1), vec![0.125]);
    }

    #[test]
    fn test_stop_resets_and_silences() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.toggle_step(1, 0);
        s.start();
        run_until(&mut s, &bus, 0.5);
        assert!(s.step() > 0);

        s.stop();
        assert_eq!(s.state(), State::Stopped);
        assert_eq!(s.step(), 0);

        bus.clear();
        bus.clock.advance(5.0);
        assert!(s.tick().is_empty());
        assert!(bus.nodes().is_empty());
    }

    #[test]
    fn test_melody_on_every_bar_and_cut_on_stop() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        let melody = Arc::new(SampleBuffer::silent(2, 44100 * 3, 44100));
        s.set_melody(Some(melody.clone()));
        s.start();

        let events = run_until(&mut s, &bus, 4.0);
        let melody_times: Vec<f64> = events
            .iter()
            .filter(|e| matches!(e, ScheduledEvent::Melody { .. }))
            .map(ScheduledEvent::time)
            .collect();
        assert_eq!(melody_times, vec![0.0, 2.0, 4.0]);

        let melody_nodes: Vec<(PlaybackNode, NodeHandle)> = bus
            .nodes()
            .into_iter()
            .filter(|(node, _)| Arc::ptr_eq(&node.buffer, &melody))
            .collect();
        assert_eq!(melody_nodes.len(), 3);
        assert!(melody_nodes
            .iter()
            .all(|(node, _)| node.gain == 1.0 && node.playback_rate == 1.0 && node.offset == 0.0));
        let melody_handles: Vec<NodeHandle> =
            melody_nodes.into_iter().map(|(_, handle)| handle).collect();

        s.stop();
        assert!(melody_handles.iter().all(NodeHandle::is_cancelled));
    }

    #[test]
    fn test_drum_hits_not_retracted_on_stop() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.toggle_step(1, 0);
        s.start();
        s.tick();
        s.stop();
        assert!(!bus.nodes()[0].1.is_cancelled());
    }

    #[test]
    fn test_select_and_preset() {
        let bus = RecordingBus::new();
        let mut s = scheduler(&bus, 120);
        s.toggle_step(0, 0);
        assert!(s.select_pattern(1));
        assert_eq!(s.current_pattern().active_count(), 0);
        assert!(!s.select_pattern(9));

        let presets = presets::builtin();
        let boom_bap = presets::find(&presets, "Boom Bap").unwrap();
        s.load_preset(boom_bap);
        assert_eq!(s.tempo().bpm(), 90);
        assert_eq!(*s.current_pattern(), boom_bap.pattern);
        assert_eq!(s.patterns().get(0).unwrap().active_count(), 1);

        s.clear_pattern();
        let snapshot = s.snapshot();
        assert_eq!(snapshot.pattern_index, 1);
        assert_eq!(snapshot.pattern.active_count(), 0);
        assert_eq!(snapshot.state, State::Stopped);
    }

    #[test]
    fn test_silent_voices_still_advance() {
        let bus = RecordingBus::new();
        let bank = Arc::new(SampleBank::with_buffers(44100, vec![]));
        let mut s = StepScheduler::new(
            VoicePlayer::new(bank, bus.clone(), 1.0),
            Tempo::new(120),
            LOOK_AHEAD,
        );
        s.toggle_step(1, 0);
        s.start();
        let events = s.tick();
        assert_eq!(events.len(), 1);
        assert!(bus.nodes().is_empty());
    }
}

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
use std::time::Duration;

use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, span, trace, Instrument, Level};

use super::presets::Preset;
use super::scheduler::{Snapshot, StepScheduler};
use crate::audio::SampleBuffer;

/// Commands accepted by the transport task.
#[derive(Debug)]
pub enum Command {
    Start,
    /// Stops playback; the sender is signalled once no further pass will run.
    Stop(oneshot::Sender<()>),
    SetTempo(u32),
    ToggleStep { track: usize, step: usize },
    SetPitch { track: usize, step: usize, cents: i16 },
    ClearStep { track: usize, step: usize },
    ClearPattern,
    SelectPattern(usize),
    LoadPreset(Preset),
    SetMelody(Option<Arc<SampleBuffer>>),
    Snapshot(oneshot::Sender<Snapshot>),
    Shutdown,
}

/// Error types for the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport task is not running")]
    Closed,
}

/// Sends commands to a running transport. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TransportHandle {
    tx: mpsc::Sender<Command>,
}

/// A scheduler running on its own task.
pub struct Transport {
    handle: TransportHandle,
    join: JoinHandle<StepScheduler>,
}

impl Transport {
    /// Moves the scheduler onto a new task that polls it every `poll_interval`.
    /// Polls never overlap: a late poll is delayed, not doubled up.
    pub fn spawn(scheduler: StepScheduler, poll_interval: Duration) -> Transport {
        let (tx, rx) = mpsc::channel(64);
        let span = span!(Level::INFO, "transport");
        let join = tokio::spawn(run(scheduler, poll_interval, rx).instrument(span));
        Transport {
            handle: TransportHandle { tx },
            join,
        }
    }

    pub fn handle(&self) -> TransportHandle {
        self.handle.clone()
    }

    /// Stops the task and hands back the scheduler.
    pub async fn shutdown(self) -> Result<StepScheduler, TransportError> {
        // The task may already be gone; joining tells us either way.
        let _ = self.handle.tx.send(Command::Shutdown).await;
        self.join.await.map_err(|_| TransportError::Closed)
    }
}

async fn run(
    mut scheduler: StepScheduler,
    poll_interval: Duration,
    mut rx: mpsc::Receiver<Command>,
) -> StepScheduler {
    let mut interval = time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(poll_ms = poll_interval.as_millis(), "Transport running");

    loop {
        select! {
            _ = interval.tick() => {
                let events = scheduler.tick();
                if !events.is_empty() {
                    trace!(count = events.len(), next_step = scheduler.step(), "Booked events");
                }
            }
            command = rx.recv() => {
                match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => apply(&mut scheduler, command),
                }
            }
        }
    }

    scheduler.stop();
    info!("Transport shut down");
    scheduler
}

fn apply(scheduler: &mut StepScheduler, command: Command) {
    debug!(command = ?command, "Transport command");
    match command {
        Command::Start => {
            scheduler.start();
            // Book the first steps now rather than at the next poll.
            scheduler.tick();
        }
        Command::Stop(ack) => {
            scheduler.stop();
            let _ = ack.send(());
        }
        Command::SetTempo(bpm) => {
            scheduler.set_tempo(bpm);
        }
        Command::ToggleStep { track, step } => scheduler.toggle_step(track, step),
        Command::SetPitch { track, step, cents } => scheduler.set_pitch(track, step, cents),
        Command::ClearStep { track, step } => scheduler.clear_step(track, step),
        Command::ClearPattern => scheduler.clear_pattern(),
        Command::SelectPattern(index) => {
            scheduler.select_pattern(index);
        }
        Command::LoadPreset(preset) => scheduler.load_preset(&preset),
        Command::SetMelody(melody) => scheduler.set_melody(melody),
        Command::Snapshot(reply) => {
            let _ = reply.send(scheduler.snapshot());
        }
        // Handled by the run loop.
        Command::Shutdown => {}
    }
}

impl TransportHandle {
    async fn send(&self, command: Command) -> Result<(), TransportError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn start(&self) -> Result<(), TransportError> {
        self.send(Command::Start).await
    }

    /// Stops playback. Once this returns no further scheduling pass runs until the
    /// next start.
    pub async fn stop(&self) -> Result<(), TransportError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Command::Stop(ack_tx)).await?;
        ack_rx.await.map_err(|_| TransportError::Closed)
    }

    pub async fn set_tempo(&self, bpm: u32) -> Result<(), TransportError> {
        self.send(Command::SetTempo(bpm)).await
    }

    pub async fn toggle_step(&self, track: usize, step: usize) -> Result<(), TransportError> {
        self.send(Command::ToggleStep { track, step }).await
    }

    pub async fn set_pitch(
        &self,
        track: usize,
        step: usize,
        cents: i16,
    ) -> Result<(), TransportError> {
        self.send(Command::SetPitch { track, step, cents }).await
    }

    pub async fn clear_step(&self, track: usize, step: usize) -> Result<(), TransportError> {
        self.send(Command::ClearStep { track, step }).await
    }

    pub async fn clear_pattern(&self) -> Result<(), TransportError> {
        self.send(Command::ClearPattern).await
    }

    pub async fn select_pattern(&self, index: usize) -> Result<(), TransportError> {
        self.send(Command::SelectPattern(index)).await
    }

    pub async fn load_preset(&self, preset: Preset) -> Result<(), TransportError> {
        self.send(Command::LoadPreset(preset)).await
    }

    pub async fn set_melody(
        &self,
        melody: Option<Arc<SampleBuffer>>,
    ) -> Result<(), TransportError> {
        self.send(Command::SetMelody(melody)).await
    }

    /// Current scheduler state, as of the last applied command.
    pub async fn snapshot(&self) -> Result<Snapshot, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| TransportError::Closed)
    }
}

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
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::buffer::SampleBuffer;

/// Global atomic counter for generating unique node IDs.
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Returns the next unique node ID.
pub fn next_node_id() -> u64 {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// An audio clock measured in seconds.
pub trait Clock: Send + Sync {
    /// The current time on the clock, in seconds.
    fn now(&self) -> f64;
}

/// A one-shot playback request for the shared output bus.
#[derive(Clone, Debug)]
pub struct PlaybackNode {
    /// The audio to play. Read-only for the lifetime of the node.
    pub buffer: Arc<SampleBuffer>,
    /// Absolute clock time at which playback starts, in seconds.
    pub start_time: f64,
    /// Offset into the buffer at which playback starts, in seconds.
    pub offset: f64,
    /// Playback rate multiplier (1.0 = original pitch).
    pub playback_rate: f64,
    /// Linear gain.
    pub gain: f32,
}

impl PlaybackNode {
    /// A node that plays the whole buffer at original pitch and unity gain.
    pub fn new(buffer: Arc<SampleBuffer>, start_time: f64) -> Self {
        Self {
            buffer,
            start_time,
            offset: 0.0,
            playback_rate: 1.0,
            gain: 1.0,
        }
    }

    /// Converts a detune in cents to a playback rate.
    pub fn rate_for_cents(cents: i16) -> f64 {
        2f64.powf(cents as f64 / 1200.0)
    }
}

/// Handle to a node scheduled on the bus.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl NodeHandle {
    /// Creates a new handle with a fresh ID.
    pub fn new() -> Self {
        Self {
            id: next_node_id(),
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the node ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the node. Frames already mixed are not retracted.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns true if the node has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Marks the node as having played to the end.
    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }

    /// Returns true once the node has stopped, either by finishing or cancellation.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed) || self.is_cancelled()
    }
}

impl Default for NodeHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared, additive-only output bus.
pub trait Bus: Clock {
    /// Schedules a one-shot node. Never fails: a node that cannot be played is dropped.
    fn schedule(&self, node: PlaybackNode) -> NodeHandle;
}

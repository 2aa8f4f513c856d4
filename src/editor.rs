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

//! Recorded-audio editor.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::audio::{decode_bytes, Bus, DecodeError, NodeHandle, PlaybackNode, SampleBuffer};
use crate::wav::{self, WavError};

/// Error types for editor operations.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("Failed to decode audio: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to encode WAV: {0}")]
    Wav(#[from] WavError),

    #[error("No audio loaded")]
    NoBuffer,

    #[error("Decode task failed: {0}")]
    Task(String),
}

/// What the editor currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorStatus {
    /// Nothing loaded (or everything was cut away).
    Empty,
    /// A decode is in progress.
    Loading,
    /// A buffer is loaded.
    Ready,
    /// The last load failed to decode.
    Failed,
}

/// A time range in seconds. The ends may be in either order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Selection {
    pub start: f64,
    pub end: f64,
}

impl Selection {
    /// The range as (earlier, later).
    pub fn normalized(&self) -> (f64, f64) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The range as frame indices `[a, b)` of a buffer, rounded to the nearest
    /// frame and clamped to its length.
    pub fn frames(&self, buffer: &SampleBuffer) -> (usize, usize) {
        let (min, max) = self.normalized();
        let rate = buffer.sample_rate() as f64;
        let len = buffer.frame_count();
        let to_frame = |seconds: f64| ((seconds * rate).round().max(0.0) as usize).min(len);
        (to_frame(min), to_frame(max))
    }
}

struct Playing {
    /// Clock time playback (re)started.
    started_at: f64,
    /// Buffer position at `started_at`, in seconds.
    from: f64,
    handle: NodeHandle,
}

/// Holds one recorded buffer and edits it.
pub struct BufferEditor {
    bus: Arc<dyn Bus>,
    buffer: Option<Arc<SampleBuffer>>,
    status: EditorStatus,
    selection: Option<Selection>,
    /// Paused/stopped position in seconds.
    offset: f64,
    playing: Option<Playing>,
}

impl BufferEditor {
    /// Creates an empty editor that plays through the given bus.
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self {
            bus,
            buffer: None,
            status: EditorStatus::Empty,
            selection: None,
            offset: 0.0,
            playing: None,
        }
    }

    /// Decodes encoded audio and makes it the current buffer.
    ///
    /// Playback stops and the selection is cleared first. On failure the editor
    /// holds no buffer.
    pub async fn load(
        &mut self,
        bytes: Vec<u8>,
        extension_hint: Option<&str>,
    ) -> Result<(), EditorError> {
        self.stop();
        self.selection = None;
        self.buffer = None;
        self.status = EditorStatus::Loading;

        let hint = extension_hint.map(str::to_string);
        let decoded = tokio::task::spawn_blocking(move || decode_bytes(bytes, hint.as_deref()))
            .await
            .map_err(|e| EditorError::Task(e.to_string()));

        match decoded.and_then(|result| result.map_err(EditorError::from)) {
            Ok(buffer) => {
                self.set_buffer(Some(buffer));
                Ok(())
            }
            Err(e) => {
                self.status = EditorStatus::Failed;
                Err(e)
            }
        }
    }

    /// Makes an already decoded buffer the current one.
    pub fn load_buffer(&mut self, buffer: SampleBuffer) {
        self.stop();
        self.set_buffer(Some(buffer));
    }

    fn set_buffer(&mut self, buffer: Option<SampleBuffer>) {
        self.selection = None;
        self.buffer = buffer.filter(|b| !b.is_empty()).map(Arc::new);
        self.status = match &self.buffer {
            Some(buffer) => {
                info!(
                    channels = buffer.channel_count(),
                    sample_rate = buffer.sample_rate(),
                    duration_ms = buffer.duration().as_millis(),
                    "Editor buffer loaded"
                );
                EditorStatus::Ready
            }
            None => EditorStatus::Empty,
        };
    }

    pub fn status(&self) -> EditorStatus {
        self.status
    }

    pub fn buffer(&self) -> Option<&Arc<SampleBuffer>> {
        self.buffer.as_ref()
    }

    /// Length of the current buffer in seconds (0 with nothing loaded).
    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|b| b.duration_secs()).unwrap_or(0.0)
    }

    /// Stores a selection as given. No clamping or ordering is applied.
    pub fn set_selection(&mut self, start: f64, end: f64) {
        self.selection = Some(Selection { start, end });
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// The selection as frame indices of the current buffer, for drawing.
    pub fn selection_frames(&self) -> Option<(usize, usize)> {
        let buffer = self.buffer.as_ref()?;
        self.selection.map(|s| s.frames(buffer))
    }

    /// Removes the selected range and joins what is left, per channel, with no
    /// cross-fade. Returns false (and changes nothing) without a non-empty selection.
    ///
    /// Cutting everything leaves the editor empty. Playback stops.
    pub fn cut(&mut self) -> bool {
        let (Some(buffer), Some(selection)) = (self.buffer.clone(), self.selection) else {
            debug!("Nothing to cut");
            return false;
        };
        if selection.is_empty() {
            debug!("Selection is empty, nothing to cut");
            return false;
        }

        let (a, b) = selection.frames(&buffer);
        if a == b {
            debug!(frame = a, "Selection covers no frames, nothing to cut");
            return false;
        }

        self.stop();
        let edited = buffer.remove_range(a, b);
        info!(
            from_frame = a,
            to_frame = b,
            removed = b - a,
            remaining = edited.frame_count(),
            "Cut selection"
        );
        self.set_buffer(Some(edited));
        true
    }

    pub fn is_playing(&self) -> bool {
        self.playing.is_some()
    }

    /// Plays from the current position. Playback that reached the end restarts from
    /// the top. Returns false with nothing loaded.
    pub fn play(&mut self) -> bool {
        let Some(buffer) = self.buffer.clone() else {
            return false;
        };
        if self.is_playing() {
            return true;
        }
        if self.offset >= buffer.duration_secs() {
            self.offset = 0.0;
        }

        let now = self.bus.now();
        let node = PlaybackNode {
            offset: self.offset,
            ..PlaybackNode::new(buffer, now)
        };
        let handle = self.bus.schedule(node);
        self.playing = Some(Playing {
            started_at: now,
            from: self.offset,
            handle,
        });
        true
    }

    /// Pauses, keeping the position.
    pub fn pause(&mut self) {
        let position = self.current_position();
        if let Some(playing) = self.playing.take() {
            playing.handle.cancel();
            self.offset = position;
        }
    }

    /// Stops and rewinds to the start.
    pub fn stop(&mut self) {
        if let Some(playing) = self.playing.take() {
            playing.handle.cancel();
        }
        self.offset = 0.0;
    }

    /// Moves to the start, continuing to play if playing.
    pub fn rewind(&mut self) {
        let was_playing = self.is_playing();
        self.stop();
        if was_playing {
            self.play();
        }
    }

    fn current_position(&self) -> f64 {
        let position = match &self.playing {
            Some(playing) => playing.from + (self.bus.now() - playing.started_at),
            None => self.offset,
        };
        position.clamp(0.0, self.duration())
    }

    /// Current position in seconds, clamped to the duration. Reaching the end while
    /// playing stops playback (the next call reports the start).
    pub fn position(&mut self) -> f64 {
        let position = self.current_position();
        if self.is_playing() && position >= self.duration() {
            debug!("Playback reached the end");
            self.stop();
        }
        position
    }

    /// Encodes the current buffer as a 16-bit WAV file image.
    pub fn export_wav(&self) -> Result<Vec<u8>, EditorError> {
        let buffer = self.buffer.as_ref().ok_or(EditorError::NoBuffer)?;
        Ok(wav::encode(buffer)?)
    }

    /// Writes the current buffer to a WAV file.
    pub fn write_wav<P: AsRef<Path>>(&self, path: P) -> Result<(), EditorError> {
        let buffer = self.buffer.as_ref().ok_or(EditorError::NoBuffer)?;
        Ok(wav::write_file(path, buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::testutil::{assert_time_eq, RecordingBus};

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| (i % 1000) as f32 / 1000.0).collect()
    }

    fn editor_with(buffer: SampleBuffer) -> (BufferEditor, Arc<RecordingBus>) {
        let bus = RecordingBus::new();
        let mut editor = BufferEditor::new(bus.clone());
        editor.load_buffer(buffer);
        (editor, bus)
    }

    #[test]
    fn test_cut_without_selection_is_noop() {
        let original = SampleBuffer::from_planar(vec![ramp(1000)], 1000);
        let (mut editor, _) = editor_with(original.clone());

        assert!(!editor.cut());
        assert_eq!(**editor.buffer().unwrap(), original);

        editor.set_selection(0.3, 0.3);
        assert!(!editor.cut());
        assert_eq!(**editor.buffer().unwrap(), original);
    }

    #[test]
    fn test_cut_removes_range_per_channel() {
        let left = ramp(1000);
        let right: Vec<f32> = ramp(1000).iter().map(|s| -s).collect();
        let original = SampleBuffer::from_planar(vec![left, right], 1000);
        let (mut editor, _) = editor_with(original.clone());

        editor.set_selection(0.25, 0.6);
        assert_eq!(editor.selection_frames(), Some((250, 600)));
        assert!(editor.cut());

        let cut = editor.buffer().unwrap();
        assert_eq!(cut.frame_count(), 1000 - 350);
        assert_eq!(cut.sample_rate(), 1000);
        for ch in 0..2 {
            let mut expected = original.channel(ch)[..250].to_vec();
            expected.extend_from_slice(&original.channel(ch)[600..]);
            assert_eq!(cut.channel(ch), expected.as_slice());
        }
        assert_eq!(editor.selection(), None);
    }

    #[test]
    fn test_reversed_selection_cut() {
        let original = SampleBuffer::from_planar(vec![ramp(88200)], 44100);
        let (mut editor, _) = editor_with(original.clone());

        editor.set_selection(1.0, 0.5);
        assert_eq!(editor.selection(), Some(Selection { start: 1.0, end: 0.5 }));
        assert!(editor.cut());

        let cut = editor.buffer().unwrap();
        assert_eq!(cut.frame_count(), 66150);
        assert_eq!(cut.duration_secs(), 1.5);
        assert_eq!(&cut.channel(0)[..22050], &original.channel(0)[..22050]);
        assert_eq!(&cut.channel(0)[22050..], &original.channel(0)[44100..]);
    }

    #[test]
    fn test_selection_is_clamped_to_buffer() {
        let (mut editor, _) = editor_with(SampleBuffer::from_planar(vec![ramp(100)], 100));
        editor.set_selection(-1.0, 0.5);
        assert_eq!(editor.selection_frames(), Some((0, 50)));
        editor.set_selection(0.9, 7.0);
        assert!(editor.cut());
        assert_eq!(editor.buffer().unwrap().frame_count(), 90);
    }

    #[test]
    fn test_cut_everything_empties_editor() {
        let (mut editor, _) = editor_with(SampleBuffer::from_planar(vec![ramp(100)], 100));
        editor.set_selection(0.0, 1.0);
        assert!(editor.cut());
        assert!(editor.buffer().is_none());
        assert_eq!(editor.status(), EditorStatus::Empty);
        assert!(!editor.play());
        assert!(matches!(editor.export_wav(), Err(EditorError::NoBuffer)));
    }

    #[tokio::test]
    async fn test_load_replaces_buffer_and_clears_selection() {
        let bus = RecordingBus::new();
        let mut editor = BufferEditor::new(bus.clone());
        editor.load_buffer(SampleBuffer::from_planar(vec![ramp(100)], 100));
        editor.set_selection(0.1, 0.2);
        assert!(editor.play());

        let replacement = SampleBuffer::from_planar(vec![vec![0.25; 4410]], 44100);
        let bytes = wav::encode(&replacement).unwrap();
        editor.load(bytes, Some("wav")).await.unwrap();

        assert_eq!(editor.status(), EditorStatus::Ready);
        assert_eq!(editor.selection(), None);
        assert!(!editor.is_playing());
        assert!(bus.nodes()[0].1.is_cancelled());
        assert_eq!(editor.buffer().unwrap().frame_count(), 4410);
        assert_time_eq(editor.duration(), 0.1);
    }

    #[tokio::test]
    async fn test_load_failure() {
        let (mut editor, _) = editor_with(SampleBuffer::from_planar(vec![ramp(100)], 100));
        let result = editor.load(b"not audio at all".to_vec(), None).await;

        assert!(matches!(result, Err(EditorError::Decode(_))));
        assert_eq!(editor.status(), EditorStatus::Failed);
        assert!(editor.buffer().is_none());
    }

    #[test]
    fn test_play_pause_resume() {
        let (mut editor, bus) = editor_with(SampleBuffer::from_planar(vec![ramp(2000)], 1000));
        bus.clock.set(10.0);

        assert!(editor.play());
        bus.clock.advance(0.5);
        assert_time_eq(editor.position(), 0.5);

        editor.pause();
        assert!(!editor.is_playing());
        bus.clock.advance(3.0);
        assert_time_eq(editor.position(), 0.5);

        assert!(editor.play());
        let nodes = bus.nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].1.is_cancelled());
        assert_eq!(nodes[1].0.offset, 0.5);
        assert_eq!(nodes[1].0.start_time, 13.5);

        bus.clock.advance(0.25);
        assert_time_eq(editor.position(), 0.75);
    }

    #[test]
    fn test_playback_auto_stops_at_end() {
        let (mut editor, bus) = editor_with(SampleBuffer::from_planar(vec![ramp(1000)], 1000));
        editor.play();
        bus.clock.advance(5.0);

        assert_time_eq(editor.position(), 1.0);
        assert!(!editor.is_playing());
        assert_eq!(editor.position(), 0.0);
    }

    #[test]
    fn test_stop_and_rewind() {
        let (mut editor, bus) = editor_with(SampleBuffer::from_planar(vec![ramp(2000)], 1000));
        editor.play();
        bus.clock.advance(1.0);
        editor.rewind();
        assert!(editor.is_playing());
        assert_time_eq(editor.position(), 0.0);
        assert_eq!(bus.nodes()[1].0.offset, 0.0);

        bus.clock.advance(0.4);
        editor.stop();
        assert!(!editor.is_playing());
        assert_eq!(editor.position(), 0.0);
        assert!(bus.nodes().iter().all(|(_, h)| h.is_cancelled()));
    }

    #[test]
    fn test_export_wav() {
        let original = SampleBuffer::from_planar(vec![vec![0.5; 100], vec![-0.5; 100]], 22050);
        let (editor, _) = editor_with(original);
        let bytes = editor.export_wav().unwrap();

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 22050);
        assert_eq!(reader.len(), 200);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take-edit.wav");
        editor.write_wav(&path).unwrap();
        assert!(path.exists());
    }
}

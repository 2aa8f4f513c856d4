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
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{NUM_STEPS, NUM_TRACKS};

pub const MIN_CENTS: i16 = -2400;
pub const MAX_CENTS: i16 = 2400;

/// Number of pattern slots in a bank.
pub const NUM_PATTERNS: usize = 4;

/// Clamps a pitch offset to two octaves either way.
pub fn clamp_cents(cents: i16) -> i16 {
    cents.clamp(MIN_CENTS, MAX_CENTS)
}

/// Error parsing a pattern from its text form.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PatternParseError {
    #[error("Expected at most 8 tracks, got {0}")]
    TooManyTracks(usize),

    #[error("Track {track} has {len} steps, expected 16")]
    WrongLength { track: usize, len: usize },

    #[error("Track {track} step {step}: unexpected character {ch:?}")]
    BadCell { track: usize, step: usize, ch: char },
}

/// An 8 x 16 drum grid. Each cell is empty or holds a pitch offset in cents.
///
/// Patterns are values: every edit returns a new pattern and leaves the original
/// untouched, so a snapshot handed to the scheduler never changes under it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Pattern {
    cells: [[Option<i16>; NUM_STEPS]; NUM_TRACKS],
}

impl Pattern {
    /// A pattern with no active cells.
    pub fn empty() -> Pattern {
        Pattern::default()
    }

    /// Parses one row per track, `x` (or `X`) for a hit and `.`/`-` for a rest.
    /// Whitespace and `|` bar markers are ignored. Missing tracks are empty.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Result<Pattern, PatternParseError> {
        if rows.len() > NUM_TRACKS {
            return Err(PatternParseError::TooManyTracks(rows.len()));
        }

        let mut pattern = Pattern::empty();
        for (track, row) in rows.iter().enumerate() {
            let cells: Vec<char> = row
                .as_ref()
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '|')
                .collect();
            if cells.len() != NUM_STEPS {
                return Err(PatternParseError::WrongLength {
                    track,
                    len: cells.len(),
                });
            }
            for (step, ch) in cells.into_iter().enumerate() {
                pattern.cells[track][step] = match ch {
                    'x' | 'X' => Some(0),
                    '.' | '-' => None,
                    ch => return Err(PatternParseError::BadCell { track, step, ch }),
                };
            }
        }
        Ok(pattern)
    }

    fn in_range(track: usize, step: usize) -> bool {
        track < NUM_TRACKS && step < NUM_STEPS
    }

    /// Returns the cell at (track, step). Out-of-range cells read as empty.
    pub fn cell(&self, track: usize, step: usize) -> Option<i16> {
        if !Self::in_range(track, step) {
            return None;
        }
        self.cells[track][step]
    }

    /// True if the cell at (track, step) holds a hit.
    pub fn is_active(&self, track: usize, step: usize) -> bool {
        self.cell(track, step).is_some()
    }

    /// Active cells of a step as (track, cents), in track order.
    pub fn hits_at(&self, step: usize) -> impl Iterator<Item = (usize, i16)> + '_ {
        (0..NUM_TRACKS).filter_map(move |track| self.cell(track, step).map(|c| (track, c)))
    }

    /// Number of active cells.
    pub fn active_count(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }

    fn with_cell(&self, track: usize, step: usize, cell: Option<i16>) -> Pattern {
        if !Self::in_range(track, step) {
            debug!(track, step, "Ignoring edit outside the pattern grid");
            return *self;
        }
        let mut next = *self;
        next.cells[track][step] = cell.map(clamp_cents);
        next
    }

    /// Toggles a cell: an empty cell becomes a hit at original pitch, a hit is cleared.
    pub fn with_toggled(&self, track: usize, step: usize) -> Pattern {
        let cell = match self.cell(track, step) {
            Some(_) => None,
            None => Some(0),
        };
        self.with_cell(track, step, cell)
    }

    /// Sets the pitch of a cell, making it a hit if it was empty.
    pub fn with_pitch(&self, track: usize, step: usize, cents: i16) -> Pattern {
        self.with_cell(track, step, Some(cents))
    }

    /// Clears a single cell.
    pub fn with_cleared(&self, track: usize, step: usize) -> Pattern {
        self.with_cell(track, step, None)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (track, row) in self.cells.iter().enumerate() {
            if track > 0 {
                writeln!(f)?;
            }
            for (step, cell) in row.iter().enumerate() {
                if step > 0 && step % 4 == 0 {
                    write!(f, "|")?;
                }
                write!(f, "{}", if cell.is_some() { 'x' } else { '.' })?;
            }
        }
        Ok(())
    }
}

/// Four independent pattern slots, one of which is current.
#[derive(Clone, Debug, Default)]
pub struct PatternBank {
    patterns: [Arc<Pattern>; NUM_PATTERNS],
    current: usize,
}

impl PatternBank {
    pub fn new() -> PatternBank {
        PatternBank::default()
    }

    /// Snapshot of the current pattern.
    pub fn current(&self) -> Arc<Pattern> {
        self.patterns[self.current].clone()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Snapshot of the pattern in a slot.
    pub fn get(&self, index: usize) -> Option<Arc<Pattern>> {
        self.patterns.get(index).cloned()
    }

    /// Makes a slot current. Returns false (and changes nothing) for an unknown slot.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= NUM_PATTERNS {
            debug!(index, "Ignoring unknown pattern slot");
            return false;
        }
        self.current = index;
        true
    }

    /// Replaces the current pattern with the result of `edit`.
    pub fn update<F>(&mut self, edit: F)
    where
        F: FnOnce(&Pattern) -> Pattern,
    {
        let next = edit(&self.patterns[self.current]);
        self.patterns[self.current] = Arc::new(next);
    }

    /// Overwrites the current pattern.
    pub fn replace_current(&mut self, pattern: Pattern) {
        self.patterns[self.current] = Arc::new(pattern);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edits_return_new_values() {
        let empty = Pattern::empty();
        let one = empty.with_toggled(1, 4);
        assert_eq!(empty.active_count(), 0);
        assert_eq!(one.cell(1, 4), Some(0));
        assert_eq!(one.with_toggled(1, 4), empty);
    }

    #[test]
    fn test_pitch_is_clamped_and_activates() {
        let p = Pattern::empty().with_pitch(0, 0, 5000).with_pitch(0, 1, -5000);
        assert_eq!(p.cell(0, 0), Some(2400));
        assert_eq!(p.cell(0, 1), Some(-2400));
        assert_eq!(p.with_cleared(0, 0).cell(0, 0), None);
    }

    #[test]
    fn test_out_of_range_edits_are_ignored() {
        let p = Pattern::empty().with_toggled(0, 0);
        assert_eq!(p.with_toggled(8, 0), p);
        assert_eq!(p.with_pitch(0, 16, 100), p);
        assert_eq!(p.with_cleared(99, 99), p);
        assert_eq!(p.cell(8, 0), None);
    }

    #[test]
    fn test_hits_at_in_track_order() {
        let p = Pattern::empty()
            .with_pitch(5, 3, 100)
            .with_toggled(0, 3)
            .with_toggled(2, 4);
        let hits: Vec<_> = p.hits_at(3).collect();
        assert_eq!(hits, vec![(0, 0), (5, 100)]);
    }

    #[test]
    fn test_from_rows_and_display() {
        let p = Pattern::from_rows(&["x...|x...|x...|x...", "....x.......x..."]).unwrap();
        assert!(p.is_active(0, 0));
        assert!(p.is_active(0, 12));
        assert!(p.is_active(1, 4));
        assert_eq!(p.active_count(), 6);

        let text = p.to_string();
        assert_eq!(text.lines().count(), NUM_TRACKS);
        assert_eq!(text.lines().next(), Some("x...|x...|x...|x..."));
        let reparsed = Pattern::from_rows(&text.lines().collect::<Vec<_>>()).unwrap();
        assert_eq!(reparsed, p);
    }

    #[test]
    fn test_from_rows_errors() {
        assert_eq!(
            Pattern::from_rows(&["x..."]),
            Err(PatternParseError::WrongLength { track: 0, len: 4 })
        );
        assert_eq!(
            Pattern::from_rows(&["x..o............"]),
            Err(PatternParseError::BadCell {
                track: 0,
                step: 3,
                ch: 'o'
            })
        );
        let rows = vec!["................"; 9];
        assert_eq!(
            Pattern::from_rows(&rows),
            Err(PatternParseError::TooManyTracks(9))
        );
    }

    #[test]
    fn test_bank_slots_are_independent() {
        let mut bank = PatternBank::new();
        bank.update(|p| p.with_toggled(0, 0));
        let first = bank.current();

        assert!(bank.select(2));
        assert_eq!(bank.current().active_count(), 0);
        bank.update(|p| p.with_toggled(3, 3));

        assert!(!bank.select(4));
        assert_eq!(bank.current_index(), 2);
        assert_eq!(bank.get(0), Some(first.clone()));
        assert!(first.is_active(0, 0));
        assert!(!first.is_active(3, 3));
    }

    #[test]
    fn test_snapshot_unaffected_by_later_edits() {
        let mut bank = PatternBank::new();
        let before = bank.current();
        bank.update(|p| p.with_toggled(0, 0));
        assert_eq!(before.active_count(), 0);
        assert_eq!(bank.current().active_count(), 1);
    }
}

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

//! The note table: names in scientific pitch notation mapped to equal
//! temperament frequencies.

use std::fmt;

use crate::error::AudioError;

/// Names of the twelve semitones within an octave, sharp spelling.
const SEMITONE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Octave range the game uses. Anything outside is not in the table.
const MIN_OCTAVE: i32 = 1;
const MAX_OCTAVE: i32 = 7;

/// A note from the known table, e.g. "C4" or "F#3".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Note {
    /// Canonical (sharp-spelled) name, e.g. "A#3".
    name: String,
    /// MIDI note number; C4 = 60.
    midi: u8,
}

impl Note {
    /// Parses a note name. Accepts sharps ('#') and flats ('b'); flats are
    /// canonicalized to the sharp spelling of the same pitch.
    pub fn parse(name: &str) -> Result<Note, AudioError> {
        let invalid = || AudioError::InvalidNote(name.to_string());

        let mut chars = name.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let mut semitone: i32 = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest: String = chars.collect();
        let octave_str = if let Some(stripped) = rest.strip_prefix('#') {
            semitone += 1;
            stripped
        } else if let Some(stripped) = rest.strip_prefix('b') {
            semitone -= 1;
            stripped
        } else {
            rest.as_str()
        };

        let octave: i32 = octave_str.parse().map_err(|_| invalid())?;

        // Flats/sharps may cross an octave boundary (Cb4, B#3).
        let mut octave = octave;
        if semitone < 0 {
            semitone += 12;
            octave -= 1;
        } else if semitone >= 12 {
            semitone -= 12;
            octave += 1;
        }

        if !(MIN_OCTAVE..=MAX_OCTAVE).contains(&octave) {
            return Err(invalid());
        }

        let midi = ((octave + 1) * 12 + semitone) as u8;
        Ok(Note {
            name: format!("{}{}", SEMITONE_NAMES[semitone as usize], octave),
            midi,
        })
    }

    /// The canonical name of this note.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Equal temperament frequency, A4 = 440 Hz.
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.midi as f64 - 69.0) / 12.0)
    }

    /// Frequency after transposing by the given number of semitones.
    pub fn transposed_frequency(&self, semitones: i32) -> f64 {
        440.0 * 2f64.powf((self.midi as f64 + semitones as f64 - 69.0) / 12.0)
    }

    /// A filesystem-safe stem for resource locators: "C#4" becomes "Cs4".
    pub fn file_stem(&self) -> String {
        self.name.replace('#', "s")
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Parses a whole sequence of note names, failing on the first unknown name.
pub fn parse_sequence(names: &[&str]) -> Result<Vec<Note>, AudioError> {
    names.iter().map(|name| Note::parse(name)).collect()
}

/// The guessable range of the game: every semitone from C3 through B5.
/// This is the set preloading works through.
pub fn playable_range() -> Vec<Note> {
    let mut notes = Vec::with_capacity(36);
    for octave in 3..=5 {
        for name in SEMITONE_NAMES {
            notes.push(Note::parse(&format!("{}{}", name, octave)).expect("table note is valid"));
        }
    }
    notes
}

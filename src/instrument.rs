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

//! The static per-instrument parameter table: synthesis parameters and the
//! sample directory each instrument's resources live under.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// The instruments the game can voice notes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Instrument {
    Piano,
    MusicBox,
    Marimba,
    SynthLead,
}

/// Oscillator waveform kinds for the synthesis path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

/// Static synthesis and resource parameters for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentDescriptor {
    /// Oscillator waveform.
    pub waveform: Waveform,
    /// Linear attack time in seconds.
    pub attack: f32,
    /// Sustain level, 0.0..=1.0.
    pub sustain: f32,
    /// Exponential release time in seconds.
    pub release: f32,
    /// Low-pass filter cutoff in Hz.
    pub cutoff_hz: f32,
    /// Transposition applied to the note's fundamental, in semitones.
    pub transpose: i32,
    /// Directory name under the sample library root.
    sample_dir: &'static str,
}

const PIANO: InstrumentDescriptor = InstrumentDescriptor {
    waveform: Waveform::Triangle,
    attack: 0.005,
    sustain: 0.25,
    release: 0.9,
    cutoff_hz: 5200.0,
    transpose: 0,
    sample_dir: "piano",
};

const MUSIC_BOX: InstrumentDescriptor = InstrumentDescriptor {
    waveform: Waveform::Sine,
    attack: 0.002,
    sustain: 0.12,
    release: 1.4,
    cutoff_hz: 8000.0,
    transpose: 12,
    sample_dir: "music-box",
};

const MARIMBA: InstrumentDescriptor = InstrumentDescriptor {
    waveform: Waveform::Sine,
    attack: 0.004,
    sustain: 0.08,
    release: 0.5,
    cutoff_hz: 3500.0,
    transpose: 0,
    sample_dir: "marimba",
};

const SYNTH_LEAD: InstrumentDescriptor = InstrumentDescriptor {
    waveform: Waveform::Sawtooth,
    attack: 0.02,
    sustain: 0.6,
    release: 0.35,
    cutoff_hz: 2400.0,
    transpose: -12,
    sample_dir: "synth-lead",
};

impl Instrument {
    /// All known instruments.
    pub const ALL: [Instrument; 4] = [
        Instrument::Piano,
        Instrument::MusicBox,
        Instrument::Marimba,
        Instrument::SynthLead,
    ];

    /// Looks up the static descriptor for this instrument.
    pub fn descriptor(&self) -> &'static InstrumentDescriptor {
        match self {
            Instrument::Piano => &PIANO,
            Instrument::MusicBox => &MUSIC_BOX,
            Instrument::Marimba => &MARIMBA,
            Instrument::SynthLead => &SYNTH_LEAD,
        }
    }

    /// Directory name for this instrument's samples under the library root.
    pub fn sample_dir(&self) -> &'static str {
        self.descriptor().sample_dir
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sample_dir())
    }
}

impl FromStr for Instrument {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Instrument, AudioError> {
        Instrument::ALL
            .into_iter()
            .find(|instrument| instrument.sample_dir() == s)
            .ok_or_else(|| AudioError::Config(format!("unknown instrument: {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_lookup() {
        let desc = Instrument::Piano.descriptor();
        assert_eq!(desc.waveform, Waveform::Triangle);
        assert!(desc.sustain > 0.0 && desc.sustain <= 1.0);
    }

    #[test]
    fn test_round_trip_names() {
        for instrument in Instrument::ALL {
            let parsed: Instrument = instrument.to_string().parse().unwrap();
            assert_eq!(parsed, instrument);
        }
        assert!("theremin".parse::<Instrument>().is_err());
    }

    #[test]
    fn test_descriptors_are_sane() {
        for instrument in Instrument::ALL {
            let desc = instrument.descriptor();
            assert!(desc.attack >= 0.0);
            assert!(desc.release > 0.0);
            assert!((0.0..=1.0).contains(&desc.sustain));
            assert!(desc.cutoff_hz > 0.0);
        }
    }
}

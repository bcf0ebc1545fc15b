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

//! The synthesis path: renders a complete note from an instrument
//! descriptor. Oscillator at the (transposed) fundamental, one-pole
//! low-pass at the descriptor's cutoff, and an attack/decay/release
//! amplitude envelope.

use crate::instrument::{InstrumentDescriptor, Waveform};
use crate::theory::Note;

/// Fixed decay time from the attack peak down to the sustain level.
const DECAY_SECS: f32 = 0.1;

/// Headroom so several simultaneous voices do not clip.
const MASTER_GAIN: f32 = 0.35;

/// Renders the full mono buffer for one note at the given sample rate.
pub fn render_note(descriptor: &InstrumentDescriptor, note: &Note, sample_rate: u32) -> Vec<f32> {
    let freq = note.transposed_frequency(descriptor.transpose) as f32;
    let total_secs = descriptor.attack + DECAY_SECS + descriptor.release;
    let num_samples = (sample_rate as f32 * total_secs).ceil() as usize;

    // One-pole low-pass coefficient for the descriptor's cutoff.
    let alpha = 1.0
        - (-2.0 * std::f32::consts::PI * descriptor.cutoff_hz / sample_rate as f32).exp();
    let alpha = alpha.clamp(0.0, 1.0);

    let mut output = Vec::with_capacity(num_samples);
    let mut phase: f32 = 0.0;
    let phase_inc = freq / sample_rate as f32;
    let mut filtered: f32 = 0.0;

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;

        let raw = match descriptor.waveform {
            Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        };

        filtered += alpha * (raw - filtered);
        output.push(filtered * envelope(descriptor, t) * MASTER_GAIN);

        phase += phase_inc;
        if phase >= 1.0 {
            phase -= 1.0;
        }
    }

    output
}

/// Amplitude at time `t`: linear ramp to the peak during the attack,
/// exponential decay to the sustain level, then exponential release to
/// near-silence.
fn envelope(descriptor: &InstrumentDescriptor, t: f32) -> f32 {
    let attack = descriptor.attack;
    let sustain = descriptor.sustain;

    if t < 0.0 {
        return 0.0;
    }
    if t < attack {
        if attack <= 0.0 {
            return 1.0;
        }
        return t / attack;
    }

    let t = t - attack;
    if t < DECAY_SECS {
        let decayed = (-5.0 * t / DECAY_SECS).exp();
        return sustain + (1.0 - sustain) * decayed;
    }

    let t = t - DECAY_SECS;
    if descriptor.release <= 0.0 {
        return 0.0;
    }
    sustain * (-6.9 * t / descriptor.release).exp()
}

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
// Core voice mixing logic shared by the CPAL and mock output paths.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AudioError;
use crate::instrument::Instrument;

/// Identifies a sounding voice: retriggering the same key restarts the
/// existing voice instead of stacking another copy on top of it.
pub type VoiceKey = (Instrument, String);

/// One sounding note: shared sample data plus a playback cursor.
pub struct Voice {
    key: VoiceKey,
    /// Mono samples at the output rate.
    data: Arc<Vec<f32>>,
    /// Next sample to play.
    position: usize,
    gain: f32,
}

impl Voice {
    /// Creates a voice at the start of its data.
    pub fn new(key: VoiceKey, data: Arc<Vec<f32>>, gain: f32) -> Voice {
        Voice {
            key,
            data,
            position: 0,
            gain,
        }
    }

    /// Returns this voice's key.
    pub fn key(&self) -> &VoiceKey {
        &self.key
    }

    /// Samples remaining until this voice finishes.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }
}

/// Additive mono mixer. New voices arrive over a channel so trigger paths
/// never contend with the output callback for the voice list lock.
pub struct Mixer {
    incoming_tx: crossbeam_channel::Sender<Voice>,
    incoming_rx: crossbeam_channel::Receiver<Voice>,
    voices: Mutex<Vec<Voice>>,
    sample_rate: u32,
}

impl Mixer {
    /// Creates a mixer at the given output rate.
    pub fn new(sample_rate: u32) -> Mixer {
        let (incoming_tx, incoming_rx) = crossbeam_channel::unbounded();
        Mixer {
            incoming_tx,
            incoming_rx,
            voices: Mutex::new(Vec::new()),
            sample_rate,
        }
    }

    /// Queues a voice for playback. The next processed block picks it up.
    pub fn trigger(&self, voice: Voice) -> Result<(), AudioError> {
        self.incoming_tx
            .send(voice)
            .map_err(|e| AudioError::Device(format!("mixer channel closed: {}", e)))
    }

    /// Mixes the next block of mono frames into `out`. Finished voices are
    /// dropped; a retriggered key restarts at position zero.
    pub fn process_into(&self, out: &mut [f32]) {
        out.fill(0.0);

        let mut voices = self.voices.lock();
        while let Ok(new) = self.incoming_rx.try_recv() {
            match voices.iter_mut().find(|voice| voice.key == new.key) {
                Some(existing) => *existing = new,
                None => voices.push(new),
            }
        }

        voices.retain_mut(|voice| {
            let n = voice.remaining().min(out.len());
            if n == 0 {
                return false;
            }
            let segment = &voice.data[voice.position..voice.position + n];
            for (out_sample, sample) in out[..n].iter_mut().zip(segment) {
                *out_sample += sample * voice.gain;
            }
            voice.position += n;
            voice.remaining() > 0
        });
    }

    /// Drops every queued and sounding voice.
    pub fn silence(&self) {
        while self.incoming_rx.try_recv().is_ok() {}
        self.voices.lock().clear();
    }

    /// Voices currently sounding (not counting queued ones).
    pub fn active_voices(&self) -> usize {
        self.voices.lock().len()
    }

    /// The mixer's output rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(note: &str, data: Vec<f32>) -> Voice {
        Voice::new(
            (Instrument::Piano, note.to_string()),
            Arc::new(data),
            1.0,
        )
    }

    #[test]
    fn test_basic_mixing() {
        let mixer = Mixer::new(44100);
        mixer.trigger(voice("C4", vec![0.5, 0.8])).unwrap();

        let mut out = vec![0.0f32; 4];
        mixer.process_into(&mut out);
        assert_eq!(out, vec![0.5, 0.8, 0.0, 0.0]);
        // The voice is finished and removed.
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_voices_sum() {
        let mixer = Mixer::new(44100);
        mixer.trigger(voice("C4", vec![0.5, 0.3])).unwrap();
        mixer.trigger(voice("E4", vec![0.2, 0.1])).unwrap();

        let mut out = vec![0.0f32; 2];
        mixer.process_into(&mut out);
        assert!((out[0] - 0.7).abs() < 1e-6);
        assert!((out[1] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_retrigger_resets_position() {
        let mixer = Mixer::new(44100);
        let data = Arc::new(vec![0.9, 0.1, 0.1, 0.1]);
        mixer
            .trigger(Voice::new(
                (Instrument::Piano, "C4".to_string()),
                data.clone(),
                1.0,
            ))
            .unwrap();

        let mut out = vec![0.0f32; 2];
        mixer.process_into(&mut out);
        assert!((out[0] - 0.9).abs() < 1e-6);

        // Retrigger the same key mid-playback: playback restarts from the
        // first sample, with only one voice sounding.
        mixer
            .trigger(Voice::new(
                (Instrument::Piano, "C4".to_string()),
                data.clone(),
                1.0,
            ))
            .unwrap();
        mixer.process_into(&mut out);
        assert!((out[0] - 0.9).abs() < 1e-6);
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_voice_spans_blocks() {
        let mixer = Mixer::new(44100);
        mixer.trigger(voice("C4", vec![0.1, 0.2, 0.3])).unwrap();

        let mut out = vec![0.0f32; 2];
        mixer.process_into(&mut out);
        assert_eq!(out, vec![0.1, 0.2]);
        assert_eq!(mixer.active_voices(), 1);

        mixer.process_into(&mut out);
        assert_eq!(out, vec![0.3, 0.0]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_silence() {
        let mixer = Mixer::new(44100);
        mixer.trigger(voice("C4", vec![0.5; 1024])).unwrap();
        let mut out = vec![0.0f32; 16];
        mixer.process_into(&mut out);
        assert_eq!(mixer.active_voices(), 1);

        mixer.silence();
        assert_eq!(mixer.active_voices(), 0);
        mixer.process_into(&mut out);
        assert!(out.iter().all(|sample| *sample == 0.0));
    }
}

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
use std::{
    fmt,
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::mixer::{Voice, VoiceKey};
use crate::error::AudioError;

const MOCK_SAMPLE_RATE: u32 = 44100;

/// One recorded trigger.
#[derive(Clone)]
pub struct TriggeredVoice {
    /// The voice key that was triggered.
    pub key: VoiceKey,
    /// When the trigger arrived.
    pub at: Instant,
    /// Length of the voice's sample data.
    pub samples: usize,
}

/// A mock device. Doesn't actually produce sound; records every trigger so
/// tests can assert on what would have played.
#[derive(Clone)]
pub struct Device {
    name: String,
    triggered: Arc<Mutex<Vec<TriggeredVoice>>>,
}

impl Device {
    /// Gets the given mock device. A name containing "synth-only" reports
    /// no sample playback capability.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            triggered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns every recorded trigger in arrival order.
    pub fn triggered(&self) -> Vec<TriggeredVoice> {
        self.triggered.lock().clone()
    }

    /// Returns just the triggered keys, in arrival order.
    pub fn triggered_keys(&self) -> Vec<VoiceKey> {
        self.triggered
            .lock()
            .iter()
            .map(|voice| voice.key.clone())
            .collect()
    }

    /// Returns the number of recorded triggers.
    pub fn trigger_count(&self) -> usize {
        self.triggered.lock().len()
    }

    /// Forgets all recorded triggers.
    pub fn reset(&self) {
        self.triggered.lock().clear();
    }
}

impl crate::audio::Device for Device {
    fn trigger(&self, voice: Voice) -> Result<(), AudioError> {
        debug!(device = self.name, key = ?voice.key(), "Trigger (mock)");
        self.triggered.lock().push(TriggeredVoice {
            key: voice.key().clone(),
            at: Instant::now(),
            samples: voice.remaining(),
        });
        Ok(())
    }

    fn silence(&self) {}

    fn sample_rate(&self) -> u32 {
        MOCK_SAMPLE_RATE
    }

    fn supports_sample_playback(&self) -> bool {
        !self.name.contains("synth-only")
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Device>, AudioError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

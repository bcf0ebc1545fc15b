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
use std::{fmt, sync::Arc};

use crate::error::AudioError;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod synth;

pub use mixer::{Voice, VoiceKey};

pub trait Device: fmt::Display + Send + Sync {
    /// Starts the given voice. Retriggering a key that is still sounding
    /// restarts it from the beginning instead of layering a second voice.
    fn trigger(&self, voice: Voice) -> Result<(), AudioError>;

    /// Stops every sounding voice.
    fn silence(&self);

    /// The output sample rate notes should be rendered or resampled to.
    fn sample_rate(&self) -> u32;

    /// Whether this device can play preloaded samples.
    fn supports_sample_playback(&self) -> bool;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Device>, AudioError>;
}

/// Gets an output device. Names starting with "mock" select the mock
/// device; no name selects the platform default output.
pub fn get_device(name: Option<&str>) -> Result<Arc<dyn Device>, AudioError> {
    if let Some(name) = name {
        if name.starts_with("mock") {
            return Ok(Arc::new(mock::Device::get(name)));
        }
    }

    Ok(Arc::new(cpal::Device::open(name)?))
}

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

//! Audio trigger and playback engine for a melody guessing game.
//!
//! The game layer talks to [`engine::Engine`]: playback locks debounce
//! rapid taps, an exclusive operation queue serializes loader work, a
//! gesture gate defers sound until the first user interaction, a bounded
//! per-instrument cache holds decoded note samples, and a cancellable
//! sequencer schedules melodies, hints and snippets. Notes are voiced
//! either by synthesis or from preloaded samples, chosen once at startup.

pub mod audio;
pub mod backend;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod exclusive;
pub mod gesture;
pub mod instrument;
pub mod samples;
pub mod sequencer;
pub mod theory;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::AudioError;
pub use instrument::Instrument;
pub use sequencer::PlaybackState;
pub use theory::Note;

/// Initializes tracing with an env-filtered subscriber. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

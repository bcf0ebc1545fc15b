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
use std::path::PathBuf;

/// Typed error for the audio engine so callers can distinguish e.g. an
/// explicit queue clear from a failed resource load without string matching.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// A queued operation was discarded by an explicit clear of the
    /// exclusive operation queue. Callers submitting work during teardown
    /// must tolerate this.
    #[error("operation discarded: queue was cleared")]
    QueueCleared,

    /// The resource loader rejected or returned unusable data.
    #[error("failed to load {}: {reason}", path.display())]
    LoadFailed { path: PathBuf, reason: String },

    /// The requested playback path is unavailable on this platform.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A note id outside the known note table.
    #[error("unknown note: {0:?}")]
    InvalidNote(String),

    /// Output device failure.
    #[error("audio device error: {0}")]
    Device(String),

    /// Config load/parse error.
    #[error("config error: {0}")]
    Config(String),
}

impl AudioError {
    /// Shorthand for a load failure on the given path.
    pub fn load_failed(path: impl Into<PathBuf>, reason: impl ToString) -> AudioError {
        AudioError::LoadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

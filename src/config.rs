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
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use crate::error::AudioError;

const DEFAULT_OPERATION_GAP: Duration = Duration::from_millis(50);
const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);
const DEFAULT_HAPTIC_DEBOUNCE: Duration = Duration::from_millis(75);
const DEFAULT_MAX_CACHED_NOTES: usize = 72;
const DEFAULT_PRELOAD_BATCH_SIZE: usize = 8;
const DEFAULT_PRELOAD_BATCH_DELAY: Duration = Duration::from_millis(120);
const DEFAULT_MELODY_TEMPO: Duration = Duration::from_millis(400);
const DEFAULT_HINT_TEMPO: Duration = Duration::from_millis(600);
const DEFAULT_SNIPPET_TEMPO: Duration = Duration::from_millis(300);
const DEFAULT_TRAILING_MARGIN: Duration = Duration::from_millis(150);
const DEFAULT_SAMPLE_EXTENSION: &str = "wav";

/// A YAML representation of the engine configuration.
#[derive(Deserialize, Clone, Default)]
pub struct EngineConfig {
    /// The audio output device. Names starting with "mock" select the mock
    /// device. When unset, the default output device is used.
    device: Option<String>,

    /// Minimum gap between the completion of one exclusive audio operation
    /// and the start of the next.
    operation_gap: Option<String>,

    /// Default debounce window for playback locks.
    debounce_window: Option<String>,

    /// Debounce window for the haptic hook.
    haptic_debounce: Option<String>,

    /// Cache and preload tuning.
    #[serde(default)]
    cache: CacheConfig,

    /// Sequence playback tuning.
    #[serde(default)]
    playback: PlaybackConfig,

    /// The sample library. When unset, only the synthesis path is available.
    samples: Option<SampleLibraryConfig>,
}

/// Cache and preload tuning knobs.
#[derive(Deserialize, Clone, Default)]
pub struct CacheConfig {
    /// Total cached notes across all instruments before inactive
    /// instruments are evicted.
    max_cached_notes: Option<usize>,

    /// Notes loaded concurrently per preload chunk.
    preload_batch_size: Option<usize>,

    /// Pause between preload chunks.
    preload_batch_delay: Option<String>,
}

/// Sequence playback tuning knobs.
#[derive(Deserialize, Clone, Default)]
pub struct PlaybackConfig {
    /// Time between successive melody notes.
    melody_tempo: Option<String>,

    /// Time between successive hint notes.
    hint_tempo: Option<String>,

    /// Time between successive snippet notes.
    snippet_tempo: Option<String>,

    /// Extra time after the last note before a session counts as complete.
    trailing_margin: Option<String>,
}

/// Where note samples live on disk. The locator template is
/// `{library}/{instrument}/{note}.{extension}`.
#[derive(Deserialize, Clone)]
pub struct SampleLibraryConfig {
    /// Root directory of the sample library.
    library: PathBuf,

    /// File extension of the note samples (default: "wav").
    extension: Option<String>,
}

fn parse_duration(value: &Option<String>, default: Duration) -> Result<Duration, AudioError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| AudioError::Config(format!("bad duration {:?}: {}", value, e)))?
            .into()),
        None => Ok(default),
    }
}

impl EngineConfig {
    /// Parses an engine configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<EngineConfig, AudioError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| AudioError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yml::from_str(&contents)
            .map_err(|e| AudioError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Returns the configured output device name, if any.
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the minimum gap between exclusive operations.
    pub fn operation_gap(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.operation_gap, DEFAULT_OPERATION_GAP)
    }

    /// Returns the default debounce window for playback locks.
    pub fn debounce_window(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.debounce_window, DEFAULT_DEBOUNCE_WINDOW)
    }

    /// Returns the debounce window for the haptic hook.
    pub fn haptic_debounce(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.haptic_debounce, DEFAULT_HAPTIC_DEBOUNCE)
    }

    /// Returns the sample library configuration, if any.
    pub fn samples(&self) -> Option<&SampleLibraryConfig> {
        self.samples.as_ref()
    }

    /// Returns the cache tuning.
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Returns the playback tuning.
    pub fn playback(&self) -> &PlaybackConfig {
        &self.playback
    }
}

impl CacheConfig {
    /// Returns the total cached note bound.
    pub fn max_cached_notes(&self) -> usize {
        self.max_cached_notes.unwrap_or(DEFAULT_MAX_CACHED_NOTES)
    }

    /// Returns the preload chunk size. Always at least 1.
    pub fn preload_batch_size(&self) -> usize {
        self.preload_batch_size
            .unwrap_or(DEFAULT_PRELOAD_BATCH_SIZE)
            .max(1)
    }

    /// Returns the pause between preload chunks.
    pub fn preload_batch_delay(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.preload_batch_delay, DEFAULT_PRELOAD_BATCH_DELAY)
    }
}

impl PlaybackConfig {
    /// Returns the melody tempo.
    pub fn melody_tempo(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.melody_tempo, DEFAULT_MELODY_TEMPO)
    }

    /// Returns the hint tempo.
    pub fn hint_tempo(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.hint_tempo, DEFAULT_HINT_TEMPO)
    }

    /// Returns the snippet tempo.
    pub fn snippet_tempo(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.snippet_tempo, DEFAULT_SNIPPET_TEMPO)
    }

    /// Returns the trailing completion margin.
    pub fn trailing_margin(&self) -> Result<Duration, AudioError> {
        parse_duration(&self.trailing_margin, DEFAULT_TRAILING_MARGIN)
    }
}

impl SampleLibraryConfig {
    /// Creates a sample library configuration rooted at the given directory.
    pub fn new(library: impl Into<PathBuf>) -> SampleLibraryConfig {
        SampleLibraryConfig {
            library: library.into(),
            extension: None,
        }
    }

    /// Returns the library root.
    pub fn library(&self) -> &Path {
        &self.library
    }

    /// Returns the sample file extension.
    pub fn extension(&self) -> &str {
        self.extension.as_deref().unwrap_or(DEFAULT_SAMPLE_EXTENSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.operation_gap().unwrap(), Duration::from_millis(50));
        assert_eq!(
            config.debounce_window().unwrap(),
            Duration::from_millis(150)
        );
        assert_eq!(config.cache().max_cached_notes(), 72);
        assert_eq!(config.cache().preload_batch_size(), 8);
        assert_eq!(
            config.playback().melody_tempo().unwrap(),
            Duration::from_millis(400)
        );
        assert!(config.samples().is_none());
        assert!(config.device().is_none());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
device: mock-output
operation_gap: 80ms
debounce_window: 200ms
cache:
  max_cached_notes: 24
  preload_batch_size: 4
  preload_batch_delay: 50ms
playback:
  melody_tempo: 350ms
  hint_tempo: 700ms
samples:
  library: /var/lib/notequest/samples
  extension: ogg
"#;
        let config: EngineConfig = serde_yml::from_str(yaml).unwrap();
        assert_eq!(config.device(), Some("mock-output"));
        assert_eq!(config.operation_gap().unwrap(), Duration::from_millis(80));
        assert_eq!(config.cache().max_cached_notes(), 24);
        assert_eq!(config.cache().preload_batch_size(), 4);
        assert_eq!(
            config.playback().hint_tempo().unwrap(),
            Duration::from_millis(700)
        );
        // Unset fields fall back to defaults.
        assert_eq!(
            config.playback().snippet_tempo().unwrap(),
            Duration::from_millis(300)
        );
        let samples = config.samples().unwrap();
        assert_eq!(samples.extension(), "ogg");
        assert!(samples.library().ends_with("samples"));
    }

    #[test]
    fn test_bad_duration_is_config_error() {
        let yaml = "operation_gap: not-a-duration";
        let config: EngineConfig = serde_yml::from_str(yaml).unwrap();
        assert!(matches!(config.operation_gap(), Err(AudioError::Config(_))));
    }
}

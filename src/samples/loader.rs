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

//! Note sample loading.
//!
//! Samples are decoded entirely into memory so a resident note can be
//! retriggered with zero latency.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use crate::config::SampleLibraryConfig;
use crate::error::AudioError;
use crate::instrument::Instrument;
use crate::theory::Note;

/// A decoded note ready for playback. The sample data is stored in an Arc
/// so the mixer can hold a voice on it while the cache keeps its own
/// reference.
#[derive(Clone)]
pub struct LoadedNote {
    /// Mono f32 samples at the target rate.
    data: Arc<Vec<f32>>,
    /// Sample rate of the audio data.
    sample_rate: u32,
}

impl LoadedNote {
    /// Wraps already-decoded samples.
    pub fn from_samples(data: Vec<f32>, sample_rate: u32) -> LoadedNote {
        LoadedNote {
            data: Arc::new(data),
            sample_rate,
        }
    }

    /// Returns a shared handle to the sample data.
    pub fn data(&self) -> Arc<Vec<f32>> {
        self.data.clone()
    }

    /// Returns the sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the playback duration.
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.data.len() as f64 / self.sample_rate as f64)
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Resolves the on-disk location of a note resource from the locator
/// template `{library}/{instrument}/{note}.{extension}`.
#[derive(Clone)]
pub struct SampleLocator {
    library: PathBuf,
    extension: String,
}

impl SampleLocator {
    /// Creates a locator from the sample library configuration.
    pub fn new(config: &SampleLibraryConfig) -> SampleLocator {
        SampleLocator {
            library: config.library().to_path_buf(),
            extension: config.extension().to_string(),
        }
    }

    /// The path the given instrument/note resource should live at.
    pub fn path_for(&self, instrument: Instrument, note: &Note) -> PathBuf {
        self.library
            .join(instrument.sample_dir())
            .join(format!("{}.{}", note.file_stem(), self.extension))
    }
}

/// Loads one note resource. Implementations may block; the cache runs them
/// on a blocking task.
pub trait NoteLoader: Send + Sync {
    /// Loads and decodes the resource at the given path.
    fn load(&self, path: &Path) -> Result<LoadedNote, AudioError>;
}

/// Decodes note files with symphonia (wav, ogg, flac, mp3, ...), downmixes
/// to mono, and resamples to the target rate with linear interpolation.
pub struct FileNoteLoader {
    /// Target sample rate, matching the output device.
    target_sample_rate: u32,
}

impl FileNoteLoader {
    /// Creates a loader targeting the given sample rate.
    pub fn new(target_sample_rate: u32) -> FileNoteLoader {
        FileNoteLoader { target_sample_rate }
    }

    /// Decodes the whole file into interleaved f32 samples.
    fn decode(&self, path: &Path) -> Result<(Vec<f32>, u16, u32), AudioError> {
        let file =
            File::open(path).map_err(|e| AudioError::load_failed(path, e))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| AudioError::load_failed(path, e))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::load_failed(path, "no audio track"))?;
        let track_id = track.id;

        let mut decoder = get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::load_failed(path, e))?;

        let mut samples: Vec<f32> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut channels: u16 = 0;
        let mut sample_rate: u32 = 0;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AudioError::load_failed(path, e)),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt packet is recoverable; skip it.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(AudioError::load_failed(path, e)),
            };

            if sample_buf.is_none() {
                let spec = *decoded.spec();
                channels = spec.channels.count() as u16;
                sample_rate = spec.rate;
                sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
            }
            if let Some(buf) = sample_buf.as_mut() {
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
        }

        if samples.is_empty() || channels == 0 || sample_rate == 0 {
            return Err(AudioError::load_failed(path, "no audio data"));
        }

        Ok((samples, channels, sample_rate))
    }
}

impl NoteLoader for FileNoteLoader {
    fn load(&self, path: &Path) -> Result<LoadedNote, AudioError> {
        let (interleaved, channels, source_rate) = self.decode(path)?;

        let mono = downmix_to_mono(&interleaved, channels);
        let resampled = if source_rate != self.target_sample_rate {
            resample_linear(&mono, source_rate, self.target_sample_rate)
        } else {
            mono
        };

        let loaded = LoadedNote::from_samples(resampled, self.target_sample_rate);
        debug!(
            path = ?path,
            source_rate,
            target_rate = self.target_sample_rate,
            duration_ms = loaded.duration().as_millis(),
            memory_kb = loaded.memory_size() / 1024,
            "Note sample loaded"
        );
        Ok(loaded)
    }
}

/// Averages interleaved channels into a mono buffer.
fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resamples mono audio using linear interpolation. For short one-shot
/// notes this is sufficient quality.
fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let target_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for target_index in 0..target_len {
        let source_pos = target_index as f64 / ratio;
        let source_index = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        let s0 = samples.get(source_index).copied().unwrap_or(0.0);
        let s1 = samples.get(source_index + 1).copied().unwrap_or(s0);

        output.push(s0 + (s1 - s0) * frac);
    }

    output
}

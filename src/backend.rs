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

//! The note trigger backends. Exactly one is selected at startup: the
//! synthesis path computes every note, the sample path plays preloaded
//! resources and quietly skips notes that are not resident yet.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{Device, Voice};
use crate::error::AudioError;
use crate::exclusive::ExclusiveQueue;
use crate::instrument::Instrument;
use crate::samples::NoteCache;
use crate::theory::Note;

/// Sounds a single note. Triggers are fire-and-forget: they never block
/// the caller and never fail it.
pub trait NoteBackend: Send + Sync {
    /// Triggers the note on the given instrument.
    fn trigger_note(&self, instrument: Instrument, note: &Note);

    /// Name for logs.
    fn name(&self) -> &'static str;
}

/// Synthesis path: renders the note from the instrument descriptor on
/// every trigger. Needs no cached resources.
pub struct SynthBackend {
    device: Arc<dyn Device>,
}

impl SynthBackend {
    /// Creates a synthesis backend over the given device.
    pub fn new(device: Arc<dyn Device>) -> SynthBackend {
        SynthBackend { device }
    }
}

impl NoteBackend for SynthBackend {
    fn trigger_note(&self, instrument: Instrument, note: &Note) {
        let descriptor = instrument.descriptor();
        let data = crate::audio::synth::render_note(descriptor, note, self.device.sample_rate());
        let voice = Voice::new(
            (instrument, note.name().to_string()),
            Arc::new(data),
            1.0,
        );
        if let Err(e) = self.device.trigger(voice) {
            warn!(error = %e, note = note.name(), "Failed to trigger synthesized note");
        }
    }

    fn name(&self) -> &'static str {
        "synth"
    }
}

/// Sample path: plays the cached resource for the note. A note that is
/// still loading (or failed to load) is skipped silently; the miss kicks
/// off a background load through the exclusive queue so a later trigger
/// finds it resident.
pub struct SamplerBackend {
    device: Arc<dyn Device>,
    cache: Arc<NoteCache>,
    queue: Arc<ExclusiveQueue>,
    runtime: tokio::runtime::Handle,
}

impl SamplerBackend {
    /// Creates a sample backend. Must be called within a tokio runtime,
    /// which background loads are spawned onto.
    pub fn new(
        device: Arc<dyn Device>,
        cache: Arc<NoteCache>,
        queue: Arc<ExclusiveQueue>,
    ) -> SamplerBackend {
        SamplerBackend {
            device,
            cache,
            queue,
            runtime: tokio::runtime::Handle::current(),
        }
    }
}

impl NoteBackend for SamplerBackend {
    fn trigger_note(&self, instrument: Instrument, note: &Note) {
        if let Some(loaded) = self.cache.get_cached(instrument, note) {
            let voice = Voice::new(
                (instrument, note.name().to_string()),
                loaded.data(),
                1.0,
            );
            if let Err(e) = self.device.trigger(voice) {
                warn!(error = %e, note = note.name(), "Failed to trigger sampled note");
            }
            return;
        }

        debug!(
            instrument = %instrument,
            note = note.name(),
            "Note not resident; loading in background"
        );
        let cache = self.cache.clone();
        let queue = self.queue.clone();
        let note = note.clone();
        self.runtime.spawn(async move {
            let result = queue
                .run(|| async {
                    cache.get_or_load(instrument, &note).await;
                    Ok::<_, AudioError>(())
                })
                .await;
            if let Err(AudioError::QueueCleared) = result {
                debug!(note = note.name(), "Background load discarded by clear");
            }
        });
    }

    fn name(&self) -> &'static str {
        "sampler"
    }
}

/// The capability decision, made once at startup: the sample path needs a
/// configured sample library and a device able to play it back; everything
/// else gets the synthesis path.
pub fn select(
    device: Arc<dyn Device>,
    cache: Option<Arc<NoteCache>>,
    queue: Arc<ExclusiveQueue>,
) -> Arc<dyn NoteBackend> {
    let backend: Arc<dyn NoteBackend> = match cache {
        Some(cache) if device.supports_sample_playback() => {
            Arc::new(SamplerBackend::new(device, cache, queue))
        }
        Some(_) => {
            warn!("Device cannot play samples; falling back to synthesis");
            Arc::new(SynthBackend::new(device))
        }
        None => Arc::new(SynthBackend::new(device)),
    };
    info!(backend = backend.name(), "Note backend selected");
    backend
}

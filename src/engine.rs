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

//! The engine facade the game layer talks to. Owns the device, the
//! exclusive operation queue, the playback locks, the gesture gate, the
//! note cache and the sequence scheduler, and wires them together.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, span, warn, Level, Span};

use crate::audio::{self, Device};
use crate::backend::{self, NoteBackend};
use crate::config::EngineConfig;
use crate::debounce::DebounceGate;
use crate::error::AudioError;
use crate::exclusive::ExclusiveQueue;
use crate::gesture::GestureGate;
use crate::instrument::Instrument;
use crate::samples::{FileNoteLoader, NoteCache, SampleLocator};
use crate::sequencer::{PlaybackState, Sequencer, TriggerFn};
use crate::theory::{self, Note};

/// Reserved lock key for haptic throttling.
const HAPTIC_LOCK_KEY: &str = "__haptic";

/// External haptic hook, invoked on note triggers.
pub type HapticFn = Arc<dyn Fn() + Send + Sync>;

/// The audio engine. Create one per process, inside a tokio runtime, and
/// drop it (after [`Engine::teardown`]) on shutdown.
pub struct Engine {
    device: Arc<dyn Device>,
    queue: Arc<ExclusiveQueue>,
    locks: Arc<DebounceGate>,
    gesture: Arc<GestureGate>,
    cache: Option<Arc<NoteCache>>,
    sequencer: Sequencer,
    trigger: TriggerFn,
    active_instrument: Arc<RwLock<Instrument>>,
    debounce_window: Duration,
    preload_batch_size: usize,
    preload_batch_delay: Duration,
    max_cached_notes: usize,
    melody_tempo: Duration,
    hint_tempo: Duration,
    snippet_tempo: Duration,
    span: Span,
}

impl Engine {
    /// Creates an engine from the given configuration.
    pub fn new(config: &EngineConfig) -> Result<Engine, AudioError> {
        Engine::build(config, None)
    }

    /// Creates an engine that invokes the given haptic hook on note
    /// triggers, throttled by the configured haptic debounce window.
    pub fn with_haptics(
        config: &EngineConfig,
        haptic: impl Fn() + Send + Sync + 'static,
    ) -> Result<Engine, AudioError> {
        Engine::build(config, Some(Arc::new(haptic)))
    }

    fn build(config: &EngineConfig, haptics: Option<HapticFn>) -> Result<Engine, AudioError> {
        let device = audio::get_device(config.device())?;
        let queue = Arc::new(ExclusiveQueue::new(config.operation_gap()?));
        let locks = Arc::new(DebounceGate::new());
        let gesture = Arc::new(GestureGate::new());
        let active_instrument = Arc::new(RwLock::new(Instrument::Piano));

        let cache = config.samples().map(|samples| {
            let loader = Arc::new(FileNoteLoader::new(device.sample_rate()));
            Arc::new(NoteCache::new(loader, SampleLocator::new(samples)))
        });
        let note_backend = backend::select(device.clone(), cache.clone(), queue.clone());

        let trigger: TriggerFn = {
            let gesture = gesture.clone();
            let active = active_instrument.clone();
            let note_backend: Arc<dyn NoteBackend> = note_backend.clone();
            let locks = locks.clone();
            let haptic_window = config.haptic_debounce()?;
            Arc::new(move |note: &Note| {
                if !gesture.is_unlocked() {
                    debug!(note = note.name(), "Trigger before unlock gesture; skipping");
                    return;
                }
                if let Some(haptic) = &haptics {
                    if locks.try_acquire(HAPTIC_LOCK_KEY, haptic_window) {
                        haptic();
                    }
                }
                let instrument = *active.read();
                note_backend.trigger_note(instrument, note);
            })
        };

        let sequencer = Sequencer::new(trigger.clone(), config.playback().trailing_margin()?);

        let engine = Engine {
            device,
            queue,
            locks,
            gesture,
            cache,
            sequencer,
            trigger,
            active_instrument,
            debounce_window: config.debounce_window()?,
            preload_batch_size: config.cache().preload_batch_size(),
            preload_batch_delay: config.cache().preload_batch_delay()?,
            max_cached_notes: config.cache().max_cached_notes(),
            melody_tempo: config.playback().melody_tempo()?,
            hint_tempo: config.playback().hint_tempo()?,
            snippet_tempo: config.playback().snippet_tempo()?,
            span: span!(Level::INFO, "audio engine"),
        };

        info!(device = %engine.device, "Audio engine initialized");
        Ok(engine)
    }

    /// Acquires the playback lock for the given id, subject to the
    /// configured debounce window.
    pub fn try_acquire_playback_lock(&self, id: &str) -> bool {
        self.locks.try_acquire(id, self.debounce_window)
    }

    /// Releases the playback lock for the given id.
    pub fn release_playback_lock(&self, id: &str) {
        self.locks.release(id);
    }

    /// Clears every playback lock.
    pub fn clear_all_playback_locks(&self) {
        self.locks.clear_all();
    }

    /// Runs the given operation exclusively: FIFO with every other
    /// exclusive operation, separated by the configured minimum gap.
    pub async fn with_exclusive_audio_op<T, F, Fut>(&self, op: F) -> Result<T, AudioError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AudioError>>,
    {
        self.queue.run(op).await
    }

    /// Records the first user gesture, unlocking deferred playback.
    pub fn mark_gesture_received(&self) {
        self.gesture.mark_unlocked();
    }

    /// Runs the callback once playback is unlocked (immediately if it
    /// already is).
    pub fn on_unlock<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.gesture.on_unlock(callback);
    }

    /// Whether the unlock gesture has been observed.
    pub fn is_unlocked(&self) -> bool {
        self.gesture.is_unlocked()
    }

    /// Triggers a single note on the active instrument. Unknown note names
    /// and pre-gesture triggers are logged no-ops.
    pub fn trigger_note(&self, note: &str) {
        match Note::parse(note) {
            Ok(note) => (self.trigger)(&note),
            Err(e) => warn!(error = %e, "Ignoring trigger for unknown note"),
        }
    }

    /// Plays a full melody. `tempo` overrides the configured melody tempo.
    pub fn play_melody(&self, notes: &[&str], tempo: Option<Duration>) {
        let _enter = self.span.enter();
        let notes = self.parse_known(notes);
        self.sequencer
            .play_sequence(notes, tempo.unwrap_or(self.melody_tempo));
    }

    /// Plays the first `count` notes of the melody at the hint tempo.
    pub fn play_hint(&self, notes: &[&str], count: usize) {
        let _enter = self.span.enter();
        let notes = self.parse_known(notes);
        self.sequencer.play_hint(&notes, count, self.hint_tempo);
    }

    /// Plays the notes at the snippet tempo and runs `on_complete` when
    /// the snippet finishes (not when it is cancelled).
    pub fn play_snippet(&self, notes: &[&str], on_complete: impl FnOnce() + Send + 'static) {
        let _enter = self.span.enter();
        let notes = self.parse_known(notes);
        self.sequencer
            .play_snippet(notes, self.snippet_tempo, Box::new(on_complete));
    }

    /// Stops the current sequence, if any.
    pub fn stop_playback(&self) {
        self.sequencer.stop();
    }

    /// Returns the current playback snapshot.
    pub fn playback_state(&self) -> PlaybackState {
        self.sequencer.state()
    }

    /// Preloads the playable range for the given instrument in throttled
    /// batches, serialized through the exclusive queue, then evicts
    /// inactive instruments if the cache bound is exceeded. Returns the
    /// number of notes newly loaded.
    pub async fn preload_instrument(&self, instrument: Instrument) -> usize {
        let _enter = self.span.enter();
        let Some(cache) = self.cache.clone() else {
            debug!("No sample library configured; preload skipped");
            return 0;
        };

        let notes = theory::playable_range();
        let batch_size = self.preload_batch_size;
        let delay = self.preload_batch_delay;
        let loaded = {
            let cache = cache.clone();
            match self
                .queue
                .run(|| async move {
                    Ok::<_, AudioError>(
                        cache
                            .preload_batch(instrument, &notes, batch_size, delay)
                            .await,
                    )
                })
                .await
            {
                Ok(loaded) => loaded,
                Err(e) => {
                    debug!(error = %e, "Preload discarded");
                    return 0;
                }
            }
        };

        cache.evict_inactive(*self.active_instrument.read(), self.max_cached_notes);
        loaded
    }

    /// Sets the active instrument. Its cache namespace is exempt from
    /// eviction.
    pub fn set_active_instrument(&self, instrument: Instrument) {
        *self.active_instrument.write() = instrument;
        info!(instrument = %instrument, "Active instrument set");
    }

    /// Returns the active instrument.
    pub fn active_instrument(&self) -> Instrument {
        *self.active_instrument.read()
    }

    /// The number of exclusive operations running or waiting.
    pub fn pending_operations(&self) -> usize {
        self.queue.depth()
    }

    /// Total notes currently cached across all instruments.
    pub fn cached_notes(&self) -> usize {
        self.cache
            .as_ref()
            .map(|cache| cache.total_cached())
            .unwrap_or(0)
    }

    /// Memory held by cached notes, in bytes.
    pub fn cache_memory_usage(&self) -> usize {
        self.cache
            .as_ref()
            .map(|cache| cache.memory_usage())
            .unwrap_or(0)
    }

    /// Tears the engine down: stops playback, rejects queued operations,
    /// clears locks, unloads caches and silences the device. Callers with
    /// queued exclusive operations observe `QueueCleared`.
    pub fn teardown(&self) {
        let _enter = self.span.enter();
        self.sequencer.stop();
        self.queue.clear();
        self.locks.clear_all();
        if let Some(cache) = &self.cache {
            cache.unload_all();
        }
        self.device.silence();
        info!("Audio engine torn down");
    }

    fn parse_known(&self, notes: &[&str]) -> Vec<Note> {
        notes
            .iter()
            .filter_map(|name| match Note::parse(name) {
                Ok(note) => Some(note),
                Err(e) => {
                    warn!(error = %e, "Skipping unknown note in sequence");
                    None
                }
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn mock_device(&self) -> Arc<audio::mock::Device> {
        self.device.to_mock().expect("engine must use a mock device")
    }
}

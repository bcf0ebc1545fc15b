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

//! The bounded multi-instrument note cache.
//!
//! Each instrument owns its own namespace of loaded notes. Loads are
//! deduplicated through a pending set, and eviction removes whole inactive
//! namespaces rather than individual notes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::loader::{LoadedNote, NoteLoader, SampleLocator};
use crate::instrument::Instrument;
use crate::theory::Note;

struct CacheInner {
    /// Loaded notes, namespaced by instrument.
    instruments: HashMap<Instrument, HashMap<String, LoadedNote>>,
    /// In-flight loads. At most one load per (instrument, note) pair.
    pending: HashSet<(Instrument, String)>,
}

/// Process-wide note cache. All mutation happens behind one short-lived
/// lock; the pending set is what prevents duplicate loader invocations.
pub struct NoteCache {
    loader: Arc<dyn NoteLoader>,
    locator: SampleLocator,
    inner: Mutex<CacheInner>,
}

impl NoteCache {
    /// Creates an empty cache over the given loader and locator.
    pub fn new(loader: Arc<dyn NoteLoader>, locator: SampleLocator) -> NoteCache {
        NoteCache {
            loader,
            locator,
            inner: Mutex::new(CacheInner {
                instruments: HashMap::new(),
                pending: HashSet::new(),
            }),
        }
    }

    /// Returns the cached note without triggering a load.
    pub fn get_cached(&self, instrument: Instrument, note: &Note) -> Option<LoadedNote> {
        self.inner
            .lock()
            .instruments
            .get(&instrument)
            .and_then(|notes| notes.get(note.name()))
            .cloned()
    }

    /// Whether a load for the given pair is currently in flight.
    pub fn is_pending(&self, instrument: Instrument, note: &Note) -> bool {
        self.inner
            .lock()
            .pending
            .contains(&(instrument, note.name().to_string()))
    }

    /// Returns the cached note, or loads it. While a load for the same
    /// pair is already in flight this returns `None` ("not ready yet")
    /// rather than starting a duplicate load. Load failures are logged
    /// here and also surface as `None`; they are never raised.
    pub async fn get_or_load(&self, instrument: Instrument, note: &Note) -> Option<LoadedNote> {
        let key = (instrument, note.name().to_string());
        {
            let mut inner = self.inner.lock();
            if let Some(loaded) = inner
                .instruments
                .get(&instrument)
                .and_then(|notes| notes.get(note.name()))
            {
                return Some(loaded.clone());
            }
            if inner.pending.contains(&key) {
                debug!(
                    instrument = %instrument,
                    note = note.name(),
                    "Load already in flight"
                );
                return None;
            }
            inner.pending.insert(key.clone());
        }

        let path = self.locator.path_for(instrument, note);
        let loader = self.loader.clone();
        let load_path = path.clone();
        let result = tokio::task::spawn_blocking(move || loader.load(&load_path)).await;

        let mut inner = self.inner.lock();
        inner.pending.remove(&key);
        match result {
            Ok(Ok(loaded)) => {
                inner
                    .instruments
                    .entry(instrument)
                    .or_default()
                    .insert(note.name().to_string(), loaded.clone());
                debug!(
                    instrument = %instrument,
                    note = note.name(),
                    memory_kb = loaded.memory_size() / 1024,
                    "Note cached"
                );
                Some(loaded)
            }
            Ok(Err(e)) => {
                warn!(error = %e, path = ?path, "Failed to load note");
                None
            }
            Err(e) => {
                warn!(error = %e, path = ?path, "Note load task failed");
                None
            }
        }
    }

    /// Loads the given notes in chunks of `batch_size`, waiting `delay`
    /// between chunks so a big preload cannot saturate I/O. Already-cached
    /// notes are skipped. Returns the number of notes newly loaded.
    pub async fn preload_batch(
        self: Arc<Self>,
        instrument: Instrument,
        notes: &[Note],
        batch_size: usize,
        delay: Duration,
    ) -> usize {
        let chunks: Vec<Vec<Note>> = notes
            .chunks(batch_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect();
        let total_chunks = chunks.len();
        let mut loaded = 0usize;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let mut joins = Vec::new();
            for note in chunk {
                if self.get_cached(instrument, &note).is_some() {
                    continue;
                }
                let cache = self.clone();
                joins.push(tokio::spawn(async move {
                    cache.get_or_load(instrument, &note).await.is_some()
                }));
            }
            for join in joins {
                if join.await.unwrap_or(false) {
                    loaded += 1;
                }
            }
            if index + 1 < total_chunks && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            instrument = %instrument,
            loaded,
            total_cached = self.total_cached(),
            memory_kb = self.memory_usage() / 1024,
            "Preload finished"
        );
        loaded
    }

    /// If the total cached note count exceeds `max_total`, unloads every
    /// namespace except the active instrument's. The active instrument is
    /// never evicted.
    pub fn evict_inactive(&self, active: Instrument, max_total: usize) {
        let mut inner = self.inner.lock();
        let total: usize = inner.instruments.values().map(|notes| notes.len()).sum();
        if total <= max_total {
            return;
        }

        let mut evicted = 0usize;
        inner.instruments.retain(|instrument, notes| {
            if *instrument == active {
                return true;
            }
            evicted += notes.len();
            false
        });
        info!(
            evicted,
            active = %active,
            "Evicted inactive instrument caches"
        );
    }

    /// Releases every cached note across every instrument.
    pub fn unload_all(&self) {
        let mut inner = self.inner.lock();
        let total: usize = inner.instruments.values().map(|notes| notes.len()).sum();
        inner.instruments.clear();
        if total > 0 {
            info!(unloaded = total, "Unloaded all cached notes");
        }
    }

    /// Total cached notes across all instruments.
    pub fn total_cached(&self) -> usize {
        self.inner
            .lock()
            .instruments
            .values()
            .map(|notes| notes.len())
            .sum()
    }

    /// Cached notes for one instrument.
    pub fn cached_for(&self, instrument: Instrument) -> usize {
        self.inner
            .lock()
            .instruments
            .get(&instrument)
            .map(|notes| notes.len())
            .unwrap_or(0)
    }

    /// Total memory held by cached notes, in bytes.
    pub fn memory_usage(&self) -> usize {
        self.inner
            .lock()
            .instruments
            .values()
            .flat_map(|notes| notes.values())
            .map(|loaded| loaded.memory_size())
            .sum()
    }
}

impl std::fmt::Debug for NoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteCache")
            .field("total_cached", &self.total_cached())
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}

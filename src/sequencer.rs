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

//! The note sequence scheduler: melodies, hints and snippets are batches of
//! note triggers spread over time, owned by a cancellable session.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::theory::Note;

/// Fires one scheduled step. Invoked while the session lock is held, so it
/// must not call back into the sequencer.
pub type TriggerFn = Arc<dyn Fn(&Note) + Send + Sync>;

/// Invoked once when a session runs to completion. Runs outside the
/// session lock and may start a new sequence.
pub type CompletionFn = Box<dyn FnOnce() + Send>;

/// Read-only snapshot of the current playback session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    /// Whether a session is currently scheduled.
    pub is_playing: bool,
    /// Index of the most recently fired step.
    pub current_index: usize,
    /// Number of steps in the session.
    pub total_steps: usize,
    /// Fraction of steps fired, 1.0 once complete.
    pub progress: f32,
}

impl PlaybackState {
    fn idle() -> PlaybackState {
        PlaybackState {
            is_playing: false,
            current_index: 0,
            total_steps: 0,
            progress: 0.0,
        }
    }
}

/// A scheduled step. Cancellation is synchronous: once `cancel` returns
/// the step will not fire.
struct Timer {
    handle: JoinHandle<()>,
}

impl Timer {
    fn cancel(&self) {
        self.handle.abort();
    }
}

/// One scheduled run of a note sequence, owning the timers that produce it.
struct Session {
    id: u64,
    timers: Vec<Timer>,
    completion: Option<CompletionFn>,
}

struct SequencerInner {
    session: Option<Session>,
    next_id: u64,
    state: PlaybackState,
}

/// Schedules note sequences over time. Starting a new sequence from any
/// state first cancels the previous session in full; no stale step can
/// fire after a new sequence starts or after [`Sequencer::stop`] returns.
pub struct Sequencer {
    trigger: TriggerFn,
    trailing_margin: Duration,
    inner: Arc<Mutex<SequencerInner>>,
}

impl Sequencer {
    /// Creates a sequencer firing steps through the given trigger.
    pub fn new(trigger: TriggerFn, trailing_margin: Duration) -> Sequencer {
        Sequencer {
            trigger,
            trailing_margin,
            inner: Arc::new(Mutex::new(SequencerInner {
                session: None,
                next_id: 1,
                state: PlaybackState::idle(),
            })),
        }
    }

    /// Plays the full sequence, one note per tempo step.
    pub fn play_sequence(&self, notes: Vec<Note>, tempo: Duration) {
        self.start(notes, tempo, None);
    }

    /// Plays the first `count` notes of the sequence (a partial reveal).
    pub fn play_hint(&self, notes: &[Note], count: usize, tempo: Duration) {
        let prefix: Vec<Note> = notes.iter().take(count.min(notes.len())).cloned().collect();
        self.start(prefix, tempo, None);
    }

    /// Plays the full sequence and runs `on_complete` when it finishes.
    /// The callback is dropped without running if the session is cancelled
    /// or superseded.
    pub fn play_snippet(&self, notes: Vec<Note>, tempo: Duration, on_complete: CompletionFn) {
        self.start(notes, tempo, Some(on_complete));
    }

    /// Cancels the current session. Every not-yet-fired timer is cancelled
    /// before this returns; no further steps fire for that session.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        Self::cancel_locked(&mut inner);
    }

    /// Returns the current playback snapshot.
    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    fn start(&self, notes: Vec<Note>, tempo: Duration, completion: Option<CompletionFn>) {
        let mut inner = self.inner.lock();
        Self::cancel_locked(&mut inner);

        let id = inner.next_id;
        inner.next_id += 1;
        let total = notes.len();
        inner.state = PlaybackState {
            is_playing: true,
            current_index: 0,
            total_steps: total,
            progress: 0.0,
        };

        let mut timers = Vec::with_capacity(total + 1);
        for (index, note) in notes.into_iter().enumerate() {
            let delay = tempo * index as u32;
            let shared = self.inner.clone();
            let trigger = self.trigger.clone();
            timers.push(Timer {
                handle: tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut inner = shared.lock();
                    if inner.session.as_ref().map(|session| session.id) != Some(id) {
                        return;
                    }
                    inner.state.current_index = index;
                    inner.state.progress = (index + 1) as f32 / total as f32;
                    // Fired under the lock: stop() can then guarantee that
                    // no step lands after it returns.
                    trigger(&note);
                }),
            });
        }

        // One trailing timer marks the session complete.
        let done_after = tempo * total as u32 + self.trailing_margin;
        let shared = self.inner.clone();
        timers.push(Timer {
            handle: tokio::spawn(async move {
                tokio::time::sleep(done_after).await;
                let completion = {
                    let mut inner = shared.lock();
                    if inner.session.as_ref().map(|session| session.id) != Some(id) {
                        return;
                    }
                    inner.state.is_playing = false;
                    inner.state.progress = 1.0;
                    let completion = inner
                        .session
                        .as_mut()
                        .and_then(|session| session.completion.take());
                    inner.session = None;
                    debug!(session = id, "Playback session completed");
                    completion
                };
                if let Some(complete) = completion {
                    complete();
                }
            }),
        });

        info!(session = id, steps = total, tempo_ms = tempo.as_millis(), "Sequence scheduled");
        inner.session = Some(Session {
            id,
            timers,
            completion,
        });
    }

    fn cancel_locked(inner: &mut SequencerInner) {
        if let Some(session) = inner.session.take() {
            for timer in &session.timers {
                timer.cancel();
            }
            inner.state.is_playing = false;
            debug!(
                session = session.id,
                timers = session.timers.len(),
                "Playback session cancelled"
            );
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        Self::cancel_locked(&mut inner);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::testutil::eventually_async;
    use crate::theory::parse_sequence;

    use super::*;

    /// A sequencer recording every fired note name.
    fn recording_sequencer(margin: Duration) -> (Sequencer, Arc<Mutex<Vec<String>>>) {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();
        let trigger: TriggerFn = Arc::new(move |note: &Note| {
            sink.lock().push(note.name().to_string());
        });
        (Sequencer::new(trigger, margin), fired)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sequence_fires_in_order() {
        let (sequencer, fired) = recording_sequencer(Duration::from_millis(30));
        let notes = parse_sequence(&["C4", "E4", "G4"]).unwrap();

        sequencer.play_sequence(notes, Duration::from_millis(40));
        assert!(sequencer.state().is_playing);
        assert_eq!(sequencer.state().total_steps, 3);

        {
            let sequencer = &sequencer;
            eventually_async(
                || async move { !sequencer.state().is_playing },
                "sequence never completed",
            )
            .await;
        }

        assert_eq!(*fired.lock(), vec!["C4", "E4", "G4"]);
        let state = sequencer.state();
        assert_eq!(state.progress, 1.0);
        assert_eq!(state.current_index, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_cancels_remaining_steps() {
        let (sequencer, fired) = recording_sequencer(Duration::from_millis(30));
        let notes = parse_sequence(&["C4", "E4", "G4"]).unwrap();

        // Steps land at 0ms, 150ms, 300ms. Stopping around 225ms must let
        // exactly the first two through.
        sequencer.play_sequence(notes, Duration::from_millis(150));
        tokio::time::sleep(Duration::from_millis(225)).await;
        sequencer.stop();

        let after_stop = fired.lock().clone();
        assert_eq!(after_stop, vec!["C4", "E4"]);
        assert!(!sequencer.state().is_playing);

        // Long after the third step's scheduled time: still nothing more.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*fired.lock(), after_stop);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_sequence_supersedes_old() {
        let (sequencer, fired) = recording_sequencer(Duration::from_millis(30));

        sequencer.play_sequence(
            parse_sequence(&["C4", "E4", "G4"]).unwrap(),
            Duration::from_millis(150),
        );
        tokio::time::sleep(Duration::from_millis(60)).await;
        // Supersede before the old session's second step.
        sequencer.play_sequence(
            parse_sequence(&["A4", "B4"]).unwrap(),
            Duration::from_millis(40),
        );

        {
            let sequencer = &sequencer;
            eventually_async(
                || async move { !sequencer.state().is_playing },
                "second sequence never completed",
            )
            .await;
        }

        assert_eq!(*fired.lock(), vec!["C4", "A4", "B4"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_hint_plays_prefix_only() {
        let (sequencer, fired) = recording_sequencer(Duration::from_millis(30));
        let notes = parse_sequence(&["C4", "D4", "E4", "F4", "G4"]).unwrap();

        sequencer.play_hint(&notes, 2, Duration::from_millis(30));
        {
            let sequencer = &sequencer;
            eventually_async(
                || async move { !sequencer.state().is_playing },
                "hint never completed",
            )
            .await;
        }
        assert_eq!(*fired.lock(), vec!["C4", "D4"]);

        // A count beyond the sequence length is clamped.
        fired.lock().clear();
        sequencer.play_hint(&notes[..2], 10, Duration::from_millis(30));
        {
            let sequencer = &sequencer;
            eventually_async(
                || async move { !sequencer.state().is_playing },
                "clamped hint never completed",
            )
            .await;
        }
        assert_eq!(*fired.lock(), vec!["C4", "D4"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_snippet_completion_callback() {
        let (sequencer, _fired) = recording_sequencer(Duration::from_millis(30));
        let completed = Arc::new(AtomicBool::new(false));

        let flag = completed.clone();
        sequencer.play_snippet(
            parse_sequence(&["C4", "E4"]).unwrap(),
            Duration::from_millis(30),
            Box::new(move || {
                flag.store(true, Ordering::SeqCst);
            }),
        );

        {
            let completed = completed.clone();
            eventually_async(
                || {
                    let completed = completed.clone();
                    async move { completed.load(Ordering::SeqCst) }
                },
                "completion callback never ran",
            )
            .await;
        }
        let state = sequencer.state();
        assert!(!state.is_playing);
        assert_eq!(state.progress, 1.0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_snippet_drops_callback() {
        let (sequencer, _fired) = recording_sequencer(Duration::from_millis(30));
        let completed = Arc::new(AtomicBool::new(false));

        let flag = completed.clone();
        sequencer.play_snippet(
            parse_sequence(&["C4", "E4", "G4"]).unwrap(),
            Duration::from_millis(100),
            Box::new(move || {
                flag.store(true, Ordering::SeqCst);
            }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        sequencer.stop();

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_progress_snapshot_advances() {
        let (sequencer, _fired) = recording_sequencer(Duration::from_millis(30));
        sequencer.play_sequence(
            parse_sequence(&["C4", "D4", "E4", "F4"]).unwrap(),
            Duration::from_millis(60),
        );

        {
            let sequencer = &sequencer;
            eventually_async(
                || async move {
                    let state = sequencer.state();
                    state.is_playing && state.current_index >= 1 && state.progress >= 0.5
                },
                "progress never advanced mid-playback",
            )
            .await;
        }

        {
            let sequencer = &sequencer;
            eventually_async(
                || async move { !sequencer.state().is_playing },
                "sequence never completed",
            )
            .await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_sequence_completes() {
        let (sequencer, fired) = recording_sequencer(Duration::from_millis(20));
        sequencer.play_sequence(Vec::new(), Duration::from_millis(50));

        {
            let sequencer = &sequencer;
            eventually_async(
                || async move { !sequencer.state().is_playing },
                "empty sequence never completed",
            )
            .await;
        }
        assert!(fired.lock().is_empty());
        assert_eq!(sequencer.state().progress, 1.0);
    }
}

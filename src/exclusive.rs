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

//! The exclusive operation queue: at most one audio operation in flight,
//! FIFO hand-off, and a minimum gap between the completion of one operation
//! and the start of the next.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::AudioError;

/// Outcome delivered to a queued waiter.
enum Grant {
    /// The waiter owns the queue and may start its operation.
    Start,
    /// The queue was cleared before the waiter started.
    Cleared,
}

struct QueueInner {
    /// Whether an operation currently owns the queue.
    busy: bool,
    /// Waiters in submission order.
    waiters: VecDeque<oneshot::Sender<Grant>>,
    /// Completion time of the last operation that settled successfully.
    last_done: Option<Instant>,
}

/// Serializes audio operations. Queued-but-not-started operations can be
/// rejected wholesale with [`ExclusiveQueue::clear`]; an operation that is
/// already running is never affected by a clear.
pub struct ExclusiveQueue {
    inner: Mutex<QueueInner>,
    min_gap: Duration,
}

/// Ownership of the queue while an operation runs. Hands the queue to the
/// next waiter when dropped, so a cancelled caller cannot wedge the queue.
struct Slot<'a> {
    queue: &'a ExclusiveQueue,
    succeeded: bool,
    released: bool,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.queue.release(self.succeeded);
        }
    }
}

impl ExclusiveQueue {
    /// Creates a queue with the given minimum inter-operation gap.
    pub fn new(min_gap: Duration) -> ExclusiveQueue {
        ExclusiveQueue {
            inner: Mutex::new(QueueInner {
                busy: false,
                waiters: VecDeque::new(),
                last_done: None,
            }),
            min_gap,
        }
    }

    /// Runs the given operation once every previously submitted operation
    /// has settled. Returns the operation's own result, or
    /// [`AudioError::QueueCleared`] if the queue was cleared while this
    /// operation was still waiting its turn.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, AudioError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AudioError>>,
    {
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.busy {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                Some(rx)
            } else {
                inner.busy = true;
                None
            }
        };

        if let Some(rx) = waiter {
            match rx.await {
                Ok(Grant::Start) => {}
                Ok(Grant::Cleared) | Err(_) => return Err(AudioError::QueueCleared),
            }
        }

        let mut slot = Slot {
            queue: self,
            succeeded: false,
            released: false,
        };

        // Hold off until the minimum gap since the last successful
        // completion has elapsed.
        let ready_at = self.inner.lock().last_done.map(|done| done + self.min_gap);
        if let Some(ready_at) = ready_at {
            let now = Instant::now();
            if ready_at > now {
                tokio::time::sleep(ready_at - now).await;
            }
        }

        let result = op().await;

        slot.succeeded = result.is_ok();
        slot.released = true;
        self.release(slot.succeeded);

        result
    }

    /// Rejects every queued-but-not-started operation with
    /// [`AudioError::QueueCleared`]. The operation currently running, if
    /// any, is unaffected.
    pub fn clear(&self) {
        let cleared: Vec<_> = self.inner.lock().waiters.drain(..).collect();
        let count = cleared.len();
        for waiter in cleared {
            let _ = waiter.send(Grant::Cleared);
        }
        if count > 0 {
            debug!(cleared = count, "Cleared queued audio operations");
        }
    }

    /// The number of operations currently owning or waiting for the queue.
    pub fn depth(&self) -> usize {
        let inner = self.inner.lock();
        inner.waiters.len() + usize::from(inner.busy)
    }

    /// Records the completion and hands the queue to the next live waiter.
    /// The queue re-arms after both success and failure.
    fn release(&self, succeeded: bool) {
        let mut inner = self.inner.lock();
        if succeeded {
            inner.last_done = Some(Instant::now());
        }
        loop {
            match inner.waiters.pop_front() {
                Some(next) => {
                    if next.send(Grant::Start).is_ok() {
                        break;
                    }
                    // That waiter gave up; fall through to the next one.
                }
                None => {
                    inner.busy = false;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::testutil::eventually_async;

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Event {
        Start(usize),
        End(usize),
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fifo_and_exclusion() {
        let queue = Arc::new(ExclusiveQueue::new(Duration::ZERO));
        let events = Arc::new(Mutex::new(Vec::new()));

        // The first operation holds the queue until every other operation
        // has been submitted, so the expected FIFO order is well defined.
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let mut joins = Vec::new();
        {
            let queue = queue.clone();
            let events = events.clone();
            joins.push(tokio::spawn(async move {
                queue
                    .run(|| async {
                        events.lock().push(Event::Start(0));
                        let _ = release_rx.await;
                        events.lock().push(Event::End(0));
                        Ok::<_, AudioError>(0)
                    })
                    .await
            }));
        }

        for i in 1..4 {
            // Confirm the previous submission joined before this one.
            let probe = queue.clone();
            eventually_async(
                || {
                    let queue = probe.clone();
                    async move { queue.depth() >= i }
                },
                "operation never joined the queue",
            )
            .await;

            let queue = queue.clone();
            let events = events.clone();
            joins.push(tokio::spawn(async move {
                queue
                    .run(|| async {
                        events.lock().push(Event::Start(i));
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        events.lock().push(Event::End(i));
                        Ok::<_, AudioError>(i)
                    })
                    .await
            }));
        }

        {
            let probe = queue.clone();
            eventually_async(
                || {
                    let queue = probe.clone();
                    async move { queue.depth() == 4 }
                },
                "operations never queued",
            )
            .await;
        }
        release_tx.send(()).unwrap();

        for (i, join) in joins.into_iter().enumerate() {
            assert_eq!(join.await.unwrap().unwrap(), i);
        }

        let events = events.lock();
        let expected: Vec<Event> = (0..4)
            .flat_map(|i| [Event::Start(i), Event::End(i)])
            .collect();
        assert_eq!(*events, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_minimum_gap() {
        let queue = ExclusiveQueue::new(Duration::from_millis(80));

        let first_end = queue
            .run(|| async { Ok::<_, AudioError>(Instant::now()) })
            .await
            .unwrap();
        let second_start = queue
            .run(|| async { Ok::<_, AudioError>(Instant::now()) })
            .await
            .unwrap();

        assert!(
            second_start.duration_since(first_end) >= Duration::from_millis(80),
            "gap was {:?}",
            second_start.duration_since(first_end)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_gap_after_failure() {
        let queue = ExclusiveQueue::new(Duration::from_millis(200));

        let failed_at = Instant::now();
        let result = queue
            .run(|| async { Err::<(), _>(AudioError::Device("broken".to_string())) })
            .await;
        assert!(matches!(result, Err(AudioError::Device(_))));

        // A failure does not arm the gap timer.
        let second_start = queue
            .run(|| async { Ok::<_, AudioError>(Instant::now()) })
            .await
            .unwrap();
        assert!(second_start.duration_since(failed_at) < Duration::from_millis(150));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_rejects_queued_only() {
        let queue = Arc::new(ExclusiveQueue::new(Duration::ZERO));

        let (release_tx, release_rx) = oneshot::channel::<()>();
        let running = {
            let queue = queue.clone();
            tokio::spawn(async move {
                queue
                    .run(|| async {
                        let _ = release_rx.await;
                        Ok::<_, AudioError>("ran")
                    })
                    .await
            })
        };

        {
            let queue = queue.clone();
            eventually_async(
                || {
                    let queue = queue.clone();
                    async move { queue.depth() == 1 }
                },
                "first operation never started",
            )
            .await;
        }

        let mut queued = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            queued.push(tokio::spawn(async move {
                queue.run(|| async { Ok::<_, AudioError>("queued") }).await
            }));
        }
        {
            let queue = queue.clone();
            eventually_async(
                || {
                    let queue = queue.clone();
                    async move { queue.depth() == 4 }
                },
                "operations never queued",
            )
            .await;
        }

        queue.clear();
        for join in queued {
            assert!(matches!(
                join.await.unwrap(),
                Err(AudioError::QueueCleared)
            ));
        }

        // The running operation is unaffected by the clear.
        release_tx.send(()).unwrap();
        assert_eq!(running.await.unwrap().unwrap(), "ran");

        // And a fresh submission afterward runs normally.
        let after = queue.run(|| async { Ok::<_, AudioError>(42) }).await;
        assert_eq!(after.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failure_does_not_stall_queue() {
        let queue = ExclusiveQueue::new(Duration::ZERO);

        let result = queue
            .run(|| async { Err::<(), _>(AudioError::Device("boom".to_string())) })
            .await;
        assert!(result.is_err());

        let ok = queue.run(|| async { Ok::<_, AudioError>("next") }).await;
        assert_eq!(ok.unwrap(), "next");
        assert_eq!(queue.depth(), 0);
    }
}

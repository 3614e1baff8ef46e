//! Bounded frame queue with drop-oldest backpressure.
//!
//! Sits between the capture callback and the consumer task. Under network
//! contention a stale frame is worse than a lost one, so when the queue is
//! full the oldest pending frame is discarded to admit the new one.
//!
//! ```text
//! capture thread ──enqueue()──► [ f(n-1) | f(n) ] ──dequeue().await──► consumer task
//!                                 ▲ oldest dropped on overflow
//! ```
//!
//! `enqueue` is synchronous and never blocks (a short `std::sync::Mutex`
//! critical section), so it can be called from a camera callback thread that
//! is not part of the tokio runtime. `dequeue` suspends the single consumer on
//! a `tokio::sync::Notify`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::frame::Frame;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2;

/// What happened to a frame passed to [`FrameQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Stored without evicting anything.
    Queued,
    /// Stored after evicting the oldest pending frame.
    DroppedOldest,
    /// Queue is closed; the frame was discarded.
    Closed,
}

#[derive(Debug)]
struct Inner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// Bounded single-consumer frame queue.
#[derive(Debug)]
pub struct FrameQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Create a queue with the default capacity of 2.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Nothing inside the critical sections can panic halfway through.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a frame without blocking, evicting the oldest one if full.
    pub fn enqueue(&self, frame: Frame) -> EnqueueOutcome {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return EnqueueOutcome::Closed;
            }

            let outcome = if inner.frames.len() >= self.capacity {
                inner.frames.pop_front();
                EnqueueOutcome::DroppedOldest
            } else {
                EnqueueOutcome::Queued
            };
            inner.frames.push_back(frame);
            outcome
        };

        if outcome == EnqueueOutcome::DroppedOldest {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        outcome
    }

    /// Wait for the next frame.
    ///
    /// Returns `None` once the queue is closed and every frame queued before
    /// the close has been handed out.
    pub async fn dequeue(&self) -> Option<Frame> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Take the next frame if one is ready.
    pub fn try_dequeue(&self) -> Option<Frame> {
        self.lock().frames.pop_front()
    }

    /// Close the queue and wake the consumer. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of frames currently waiting.
    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    /// Whether no frame is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of waiting frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total frames evicted by overflow since creation.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

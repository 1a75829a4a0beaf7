//! Bounded per-session sample queue.
//!
//! Single producer side (the control plane), single consumer (the session's
//! monitor loop). Enqueue never waits: when the queue is full the oldest
//! pending sample is evicted and the new one admitted, so a slow analysis
//! loop always works on the freshest frames.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use sentinel_oracle::Sample;
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

/// The queue was closed; the session is no longer accepting samples.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("sample queue closed")]
pub struct QueueClosed;

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted { depth: usize },
    /// Admitted, but `evicted` (the oldest pending sample) was discarded to make room
    Dropped { evicted: Uuid, depth: usize },
}

impl EnqueueOutcome {
    pub fn depth(&self) -> usize {
        match self {
            EnqueueOutcome::Accepted { depth } | EnqueueOutcome::Dropped { depth, .. } => *depth,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, EnqueueOutcome::Dropped { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnqueueOutcome::Accepted { .. } => "accepted",
            EnqueueOutcome::Dropped { .. } => "dropped",
        }
    }
}

#[derive(Debug)]
struct Inner {
    items: VecDeque<Sample>,
    closed: bool,
}

#[derive(Debug)]
pub struct SampleQueue {
    capacity: usize,
    inner: Mutex<Inner>,
    ready: Notify,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            ready: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, sample: Sample) -> Result<EnqueueOutcome, QueueClosed> {
        let outcome = {
            let mut inner = self.lock();
            if inner.closed {
                return Err(QueueClosed);
            }
            let evicted = if inner.items.len() >= self.capacity {
                inner.items.pop_front().map(|s| s.sample_id)
            } else {
                None
            };
            inner.items.push_back(sample);
            let depth = inner.items.len();
            match evicted {
                Some(evicted) => EnqueueOutcome::Dropped { evicted, depth },
                None => EnqueueOutcome::Accepted { depth },
            }
        };
        // one consumer: a stored permit covers a consumer that is not yet waiting
        self.ready.notify_one();
        Ok(outcome)
    }

    /// Next sample in arrival order, waiting if none is pending.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<Sample> {
        loop {
            {
                let mut inner = self.lock();
                if inner.closed {
                    return None;
                }
                if let Some(sample) = inner.items.pop_front() {
                    return Some(sample);
                }
            }
            self.ready.notified().await;
        }
    }

    /// Close the queue, discarding pending samples. Idempotent.
    ///
    /// Returns how many pending samples were discarded.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.lock();
            inner.closed = true;
            let n = inner.items.len();
            inner.items.clear();
            n
        };
        self.ready.notify_one();
        discarded
    }
}

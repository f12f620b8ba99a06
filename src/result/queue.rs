//! Bounded single-producer, single-consumer queue of row batches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_queue::ArrayQueue;
use parking_lot::{Condvar, Mutex};

use crate::protocol::types::RowBatch;

/// Outcome of [`BoundedResultQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The queue was closed or the producer was told to stop; the batch was
    /// dropped.
    Closed,
}

/// Fixed-capacity FIFO between the stream callback and a cursor.
///
/// The producer blocks while the queue is full, waking up every
/// `poll_interval` to re-check whether it should stop. Nothing is dropped
/// while the queue is open.
pub struct BoundedResultQueue {
    batches: ArrayQueue<RowBatch>,
    closed: AtomicBool,
    // Guards the condvars only; the batches live in the lock-free queue.
    lock: Mutex<()>,
    not_full: Condvar,
    not_empty: Condvar,
    poll_interval: Duration,
}

impl BoundedResultQueue {
    pub fn new(capacity: usize, poll_interval: Duration) -> Self {
        Self {
            batches: ArrayQueue::new(capacity.max(1)),
            closed: AtomicBool::new(false),
            lock: Mutex::new(()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            poll_interval,
        }
    }

    pub fn capacity(&self) -> usize {
        self.batches.capacity()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Enqueue `batch`, blocking while the queue is full.
    ///
    /// `stopped` is polled before every attempt; once it returns true, or the
    /// queue is closed, the batch is dropped and `Closed` is returned.
    pub fn push(&self, batch: RowBatch, stopped: impl Fn() -> bool) -> PushOutcome {
        let mut batch = batch;
        loop {
            if self.is_closed() || stopped() {
                return PushOutcome::Closed;
            }
            match self.batches.push(batch) {
                Ok(()) => {
                    let _guard = self.lock.lock();
                    self.not_empty.notify_one();
                    return PushOutcome::Queued;
                }
                Err(rejected) => {
                    batch = rejected;
                    let mut guard = self.lock.lock();
                    // Re-check under the lock so a pop between the failed push
                    // and this point is not missed.
                    if self.batches.is_full() && !self.is_closed() {
                        self.not_full.wait_for(&mut guard, self.poll_interval);
                    }
                }
            }
        }
    }

    /// Take the next batch, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Option<RowBatch> {
        if let Some(batch) = self.batches.pop() {
            self.notify_not_full();
            return Some(batch);
        }

        let mut guard = self.lock.lock();
        if self.batches.is_empty() && !self.is_closed() {
            self.not_empty.wait_for(&mut guard, timeout);
        }
        let batch = self.batches.pop();
        if batch.is_some() {
            self.not_full.notify_all();
        }
        drop(guard);
        batch
    }

    /// Take the next batch without waiting.
    pub fn try_pop(&self) -> Option<RowBatch> {
        let batch = self.batches.pop();
        if batch.is_some() {
            self.notify_not_full();
        }
        batch
    }

    /// Wait up to `timeout` for a batch to become available without taking
    /// it. Returns true if the queue is non-empty.
    pub fn wait_ready(&self, timeout: Duration) -> bool {
        if !self.batches.is_empty() {
            return true;
        }
        let mut guard = self.lock.lock();
        if self.batches.is_empty() && !self.is_closed() {
            self.not_empty.wait_for(&mut guard, timeout);
        }
        !self.batches.is_empty()
    }

    /// Close the queue and discard everything buffered. A blocked producer
    /// wakes up and observes the closed state.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.drain();
        self.wake_all();
    }

    /// Discard buffered batches. Returns the number of batches dropped.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.batches.pop().is_some() {
            dropped += 1;
        }
        if dropped > 0 {
            self.notify_not_full();
        }
        dropped
    }

    /// Wake every waiter so it re-checks its exit conditions.
    pub fn wake_all(&self) {
        let _guard = self.lock.lock();
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    fn notify_not_full(&self) {
        let _guard = self.lock.lock();
        self.not_full.notify_all();
    }
}

impl std::fmt::Debug for BoundedResultQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedResultQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

//! Bounded history of chart samples, shared between the sampler and late-joining viewers.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::types::HistoryPoint;

pub const DEFAULT_HISTORY_CAPACITY: usize = 3600;

fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    dq.push_back(v);
    truncate_front(dq, cap);
}

fn truncate_front<T>(dq: &mut VecDeque<T>, cap: usize) {
    if dq.len() > cap {
        let excess = dq.len() - cap;
        dq.drain(..excess);
    }
}

struct Ring {
    points: VecDeque<HistoryPoint>,
    cap: usize,
}

/// Fixed-capacity ring of [`HistoryPoint`]s. Oldest samples are evicted first.
pub struct HistoryBuffer {
    inner: Mutex<Ring>,
}

impl HistoryBuffer {
    pub fn new(cap: usize) -> Self {
        let cap = if cap == 0 { DEFAULT_HISTORY_CAPACITY } else { cap };
        Self {
            inner: Mutex::new(Ring {
                points: VecDeque::with_capacity(cap.min(4096)),
                cap,
            }),
        }
    }

    // A panic while holding the lock cannot leave the ring inconsistent, so recover it.
    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Change the bound, keeping the most recent samples. Zero keeps the current bound.
    pub fn set_capacity(&self, cap: usize) {
        if cap == 0 {
            return;
        }
        let mut ring = self.lock();
        ring.cap = cap;
        truncate_front(&mut ring.points, cap);
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap
    }

    pub fn append(&self, point: HistoryPoint) {
        let mut ring = self.lock();
        let cap = ring.cap;
        push_capped(&mut ring.points, point, cap);
    }

    /// Copy of the buffer in insertion order.
    pub fn snapshot(&self) -> Vec<HistoryPoint> {
        self.lock().points.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

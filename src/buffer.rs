use crate::error::{config_error, Result};

use num::complex::Complex64;
use parking_lot::{Mutex, MutexGuard};

use std::collections::vec_deque::{Drain, Iter, IterMut};
use std::collections::VecDeque;

/// Bounded FIFO of complex samples. Pushing into a full buffer drops the
/// oldest sample.
#[derive(Debug, Clone)]
pub struct IqData {
    capacity: usize,
    data: VecDeque<Complex64>,
}

impl IqData {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return config_error("sample buffer capacity must be non-zero");
        }
        Ok(Self {
            capacity,
            data: VecDeque::with_capacity(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() == self.capacity
    }

    /// Returns true if a sample had to be dropped to make room.
    pub fn push_back(&mut self, sample: Complex64) -> bool {
        let dropped = self.is_full();
        if dropped {
            self.data.pop_front();
        }
        self.data.push_back(sample);
        dropped
    }

    /// Push a batch, returning the number of dropped samples.
    pub fn extend<I: IntoIterator<Item = Complex64>>(&mut self, samples: I) -> usize {
        samples
            .into_iter()
            .filter(|&s| self.push_back(s))
            .count()
    }

    pub fn pop_front(&mut self) -> Option<Complex64> {
        self.data.pop_front()
    }

    /// Remove the `n` oldest samples (all of them if fewer are held).
    pub fn drain_front(&mut self, n: usize) -> Drain<'_, Complex64> {
        let n = n.min(self.data.len());
        self.data.drain(..n)
    }

    pub fn get(&self, index: usize) -> Option<Complex64> {
        self.data.get(index).copied()
    }

    pub fn iter(&self) -> Iter<'_, Complex64> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, Complex64> {
        self.data.iter_mut()
    }

    /// Copy of the held samples, oldest first.
    pub fn snapshot(&self) -> Vec<Complex64> {
        self.data.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// An `IqData` shared between the capture thread and the processing loop.
///
/// The lock is coarse grained: callers hold the guard for a whole batch so
/// that draining an interval is atomic with respect to the producer.
#[derive(Debug)]
pub struct SampleBuffer {
    inner: Mutex<IqData>,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            inner: Mutex::new(IqData::new(capacity)?),
        })
    }

    pub fn lock(&self) -> MutexGuard<'_, IqData> {
        self.inner.lock()
    }
}

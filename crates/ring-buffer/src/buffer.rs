//! Ring Buffer Implementation

use std::collections::vec_deque::{self, VecDeque};

use serde::{Deserialize, Serialize};

/// Default buffer capacity
pub const DEFAULT_CAPACITY: usize = 30;

/// Fixed-capacity buffer, oldest entries are overwritten when full
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingBuffer<T> {
    /// Stored entries, oldest at the front
    storage: VecDeque<T>,
    /// Capacity of the buffer
    capacity: usize,
    /// Total entries written (for statistics)
    total_written: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        }
    }

    /// Create a buffer with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Push an entry, returning the evicted oldest entry if the buffer was full
    pub fn push(&mut self, value: T) -> Option<T> {
        let evicted = if self.storage.len() == self.capacity {
            self.storage.pop_front()
        } else {
            None
        };
        self.storage.push_back(value);
        self.total_written += 1;
        evicted
    }

    /// Number of entries currently stored
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.storage.iter()
    }

    /// Most recent entry
    pub fn latest(&self) -> Option<&T> {
        self.storage.back()
    }

    /// Get total entries written (for statistics)
    pub fn total_written(&self) -> usize {
        self.total_written
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.storage.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Read the last N entries (most recent first)
    pub fn read_last(&self, count: usize) -> Vec<T> {
        self.storage.iter().rev().take(count).cloned().collect()
    }
}

impl<T: Copy + Into<f64>> RingBuffer<T> {
    /// Arithmetic mean of the stored entries, 0.0 when empty
    pub fn average(&self) -> f64 {
        if self.storage.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.storage.iter().map(|&v| v.into()).sum();
        sum / self.storage.len() as f64
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_and_read() {
        let mut buffer = RingBuffer::new(10);

        for i in 0..5u32 {
            buffer.push(i * 100);
        }

        assert_eq!(buffer.len(), 5);

        let values = buffer.read_last(3);
        assert_eq!(values, vec![400, 300, 200]); // Most recent first
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut buffer = RingBuffer::new(5);

        for i in 0..5u32 {
            assert_eq!(buffer.push(i), None);
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.push(5), Some(0));

        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.iter().next(), Some(&1));
        assert_eq!(buffer.latest(), Some(&5));
        assert_eq!(buffer.total_written(), 6);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = RingBuffer::new(0);
        buffer.push(1.0f64);
        buffer.push(2.0);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.read_last(5), vec![2.0]);
    }

    #[test]
    fn test_average_empty() {
        let buffer: RingBuffer<f32> = RingBuffer::new(4);
        assert_eq!(buffer.average(), 0.0);
    }

    #[test]
    fn test_clear_keeps_statistics() {
        let mut buffer = RingBuffer::new(3);
        buffer.push(1u32);
        buffer.push(2);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_written(), 2);
    }

    proptest! {
        #[test]
        fn prop_average_covers_last_window(
            values in proptest::collection::vec(0u32..10_000, 1..200),
            capacity in 1usize..50,
        ) {
            let mut buffer = RingBuffer::new(capacity);
            for &v in &values {
                buffer.push(v);
            }

            let window = &values[values.len().saturating_sub(capacity)..];
            let expected = window.iter().map(|&v| v as f64).sum::<f64>() / window.len() as f64;

            prop_assert_eq!(buffer.len(), window.len());
            prop_assert!((buffer.average() - expected).abs() < 1e-6);
        }
    }
}

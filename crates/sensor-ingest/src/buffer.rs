// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded FIFO for readings that could not be delivered yet.
//!
//! The buffer never holds more than `capacity` items. Pushing into a full
//! buffer evicts the single oldest item first, so under a long sink outage
//! the most recent `capacity` readings survive and older ones are lost.

use std::collections::VecDeque;

/// Fixed-capacity FIFO with oldest-first eviction.
///
/// Single owner only; the pipeline mutates it from one control flow.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    evicted: u64,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer.
    ///
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append `item`, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.evicted += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// The oldest item, left in place.
    pub fn peek_oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Remove and return the oldest item.
    pub fn pop_oldest(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Current number of buffered items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items evicted by overflow since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

// Copyright 2023 The tsbs-datalayers Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reusable per-worker batches and the pool that recycles them

use parking_lot::Mutex;

use crate::error::Result;
use crate::point::Point;

/// Something a batch can hold: a decoded point or an undecoded line.
pub trait Unit: Send + 'static {
    /// Name of the table the unit belongs to.
    fn measurement(&self) -> &str;

    /// Turn the unit into a point. `Ok(None)` means the unit carries no
    /// columns and is dropped without error.
    fn into_point(self) -> Result<Option<Point>>;
}

impl Unit for Point {
    fn measurement(&self) -> &str {
        &self.measurement
    }

    fn into_point(self) -> Result<Option<Point>> {
        Ok((!self.is_empty()).then_some(self))
    }
}

/// An ordered run of units owned by one worker at a time.
///
/// Clearing or draining keeps the allocated capacity.
#[derive(Debug)]
pub struct Batch<U> {
    units: Vec<U>,
}

impl<U> Batch<U> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, unit: U) {
        self.units.push(unit);
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.units.capacity()
    }

    pub fn units(&self) -> &[U] {
        &self.units
    }

    /// Take every unit out in arrival order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, U> {
        self.units.drain(..)
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }
}

/// Free list of batches shared by the producer and all workers.
pub struct BatchPool<U> {
    free: Mutex<Vec<Batch<U>>>,
    batch_capacity: usize,
    max_idle: usize,
}

impl<U> BatchPool<U> {
    /// `max_idle` bounds how many released batches are kept for reuse.
    pub fn new(batch_capacity: usize, max_idle: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(max_idle)),
            batch_capacity,
            max_idle,
        }
    }

    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    /// Hand out an empty batch, recycled when one is available.
    pub fn acquire(&self) -> Batch<U> {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| Batch::with_capacity(self.batch_capacity))
    }

    /// Return a batch for reuse. The batch is emptied first.
    pub fn release(&self, mut batch: Batch<U>) {
        batch.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_idle {
            free.push(batch);
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::point::FieldType;

    fn point(measurement: &str) -> Point {
        Point::new(measurement, 1).add_field("v", FieldType::Int64, Some("1"))
    }

    #[test]
    fn test_release_keeps_capacity() {
        let pool = BatchPool::<Point>::new(4, 2);
        let mut batch = pool.acquire();
        assert!(batch.capacity() >= 4);
        for _ in 0..10 {
            batch.push(point("cpu"));
        }
        let grown = batch.capacity();
        pool.release(batch);

        let batch = pool.acquire();
        assert_eq!(batch.len(), 0);
        assert!(batch.capacity() >= grown);
    }

    #[test]
    fn test_idle_batches_are_bounded() {
        let pool = BatchPool::<Point>::new(4, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_drain_preserves_arrival_order() {
        let mut batch = Batch::with_capacity(3);
        batch.push(point("a"));
        batch.push(point("b"));
        batch.push(point("c"));
        let names: Vec<_> = batch.drain().map(|p| p.measurement).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(batch.is_empty());
        assert!(batch.capacity() >= 3);
    }

    #[test]
    fn test_empty_point_unit_is_skipped() {
        assert!(Point::new("cpu", 1).into_point().unwrap().is_none());
        assert!(point("cpu").into_point().unwrap().is_some());
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(BatchPool::<Point>::new(8, 16));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let mut batch = pool.acquire();
                        assert!(batch.is_empty());
                        batch.push(point("cpu"));
                        pool.release(batch);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
        assert!(pool.idle() <= 16);
    }
}

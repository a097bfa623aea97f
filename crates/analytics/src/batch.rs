//! Impression batch accumulator.

use cap_core::ImpressionEvent;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use telemetry::metrics;

/// A batch of impressions awaiting flush.
#[derive(Debug)]
pub struct ImpressionBatch {
    pub events: Vec<ImpressionEvent>,
    pub created_at: Instant,
}

impl ImpressionBatch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

struct Buffer {
    events: Vec<ImpressionEvent>,
    started_at: Instant,
}

impl Buffer {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            started_at: Instant::now(),
        }
    }

    fn take(&mut self) -> ImpressionBatch {
        let created_at = self.started_at;
        self.started_at = Instant::now();
        ImpressionBatch {
            events: std::mem::take(&mut self.events),
            created_at,
        }
    }
}

/// Accumulates impressions into size/age-bounded batches.
pub struct BatchAccumulator {
    max_size: usize,
    max_age: Duration,
    buffer: Mutex<Buffer>,
}

impl BatchAccumulator {
    pub fn new(max_size: usize, max_age: Duration) -> Self {
        Self {
            max_size,
            max_age,
            buffer: Mutex::new(Buffer::new()),
        }
    }

    /// Add an impression. Returns a full batch when the size bound is hit.
    pub fn add(&self, event: ImpressionEvent) -> Option<ImpressionBatch> {
        let mut buffer = self.buffer.lock();
        buffer.events.push(event);
        metrics().pending_impressions.set(buffer.events.len() as u64);

        if buffer.events.len() >= self.max_size {
            let batch = buffer.take();
            metrics().pending_impressions.set(0);
            return Some(batch);
        }

        None
    }

    /// Take the buffer if it has exceeded its age bound.
    pub fn take_aged(&self) -> Option<ImpressionBatch> {
        let mut buffer = self.buffer.lock();
        if buffer.events.is_empty() || buffer.started_at.elapsed() < self.max_age {
            return None;
        }
        let batch = buffer.take();
        metrics().pending_impressions.set(0);
        Some(batch)
    }

    /// Take whatever is buffered, regardless of age.
    pub fn take_all(&self) -> Option<ImpressionBatch> {
        let mut buffer = self.buffer.lock();
        if buffer.events.is_empty() {
            return None;
        }
        let batch = buffer.take();
        metrics().pending_impressions.set(0);
        Some(batch)
    }

    /// Buffered row count.
    pub fn pending(&self) -> usize {
        self.buffer.lock().events.len()
    }
}

use std::time::{Duration, Instant};

use crate::circular_queue::CircularQueue;

/// Mean of the last `window` samples.
#[derive(Debug, Clone)]
pub struct RollingAvg {
    history: CircularQueue<f32>,
    sum: f32,
}

impl RollingAvg {
    pub fn new(window: usize) -> Self {
        Self {
            history: CircularQueue::with_capacity(window.max(1)),
            sum: 0.0,
        }
    }

    pub fn push(&mut self, sample: f32) {
        self.sum += sample;

        if let Some(evicted) = self.history.push(sample) {
            self.sum -= evicted;
        }
    }

    #[inline]
    pub fn mean(&self) -> Option<f32> {
        if self.history.is_empty() {
            None
        } else {
            Some(self.sum / self.history.len() as f32)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.sum = 0.0;
    }
}

/// Output rate over a sliding window of frame-to-frame intervals.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    intervals: RollingAvg,
    last: Option<Instant>,
}

impl FpsMeter {
    pub fn new(window: usize) -> Self {
        Self {
            intervals: RollingAvg::new(window),
            last: None,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last {
            self.intervals.push(now.saturating_duration_since(last).as_secs_f32());
        }

        self.last = Some(now);
    }

    /// `None` until two ticks were recorded
    pub fn fps(&self) -> Option<f32> {
        self.intervals
            .mean()
            .filter(|dt| *dt > 0.0)
            .map(|dt| 1.0 / dt)
    }

    #[inline]
    pub fn mean_interval(&self) -> Option<Duration> {
        self.intervals.mean().map(Duration::from_secs_f32)
    }
}

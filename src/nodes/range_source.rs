//! RangeSource: emits an arithmetic sequence, then ends the stream.

use crate::error::{FlowError, Result};
use crate::pipeline::{Node, Producer};
use std::time::Duration;

pub struct RangeSource {
    name: String,
    start: f64,
    end: f64,
    step: f64,
    index: u64,
    interval: Option<Duration>,
}

impl RangeSource {
    /// `start, start + step, ...` up to and including `end`.
    pub fn new(name: impl Into<String>, start: f64, end: f64, step: f64) -> Result<Self> {
        let name = name.into();
        if !(step.is_finite() && step > 0.0) {
            return Err(FlowError::node(name, format!("step must be positive, got {}", step)));
        }
        if !(start.is_finite() && end.is_finite()) {
            return Err(FlowError::node(name, "range bounds must be finite"));
        }
        Ok(Self {
            name,
            start,
            end,
            step,
            index: 0,
            interval: None,
        })
    }

    /// Sleep this long before every value after the first.
    pub fn with_interval(mut self, interval: Option<Duration>) -> Self {
        self.interval = interval;
        self
    }

    /// Values this source produces in total.
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            return 0;
        }
        // Tolerate float error on the last step
        ((self.end - self.start) / self.step + 1e-9).floor() as u64 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Node for RangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.index = 0;
        Ok(())
    }
}

impl Producer<f64> for RangeSource {
    fn next(&mut self) -> anyhow::Result<Option<f64>> {
        if self.index >= self.len() {
            return Ok(None);
        }
        if let Some(interval) = self.interval.filter(|_| self.index > 0) {
            std::thread::sleep(interval);
        }
        let value = self.start + self.index as f64 * self.step;
        self.index += 1;
        Ok(Some(value))
    }
}

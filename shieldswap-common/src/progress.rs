//! Progress events for long-running private operations.
//!
//! Progress is published on a channel the caller may drain or drop. Values
//! never decrease and `100` is only published by [`ProgressReporter::complete`].

use serde::Serialize;
use tokio::sync::mpsc;

/// Highest value reported before an operation has actually succeeded.
const CEILING_BEFORE_COMPLETE: f64 = 99.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Connecting,
    Syncing,
    QuotingRelay,
    EstimatingGas,
    Signing,
    Proving,
    Populating,
    Submitting,
    Confirming,
    Resyncing,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    pub percent: f64,
}

/// Slice of the overall progress bar a sub-task occupies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressRange {
    pub start: f64,
    pub end: f64,
}

impl ProgressRange {
    /// Proof generation dominates the wall clock of a private transaction.
    pub const PROOF: Self = Self {
        start: 15.0,
        end: 80.0,
    };

    /// Map a sub-task's own 0–100 value into this slice.
    pub fn map(&self, inner: f64) -> f64 {
        let inner = if inner.is_finite() {
            inner.clamp(0.0, 100.0)
        } else {
            0.0
        };
        self.start + (self.end - self.start) * inner / 100.0
    }
}

/// Publishes monotonic progress for one operation.
#[derive(Debug)]
pub struct ProgressReporter {
    sink: Option<mpsc::UnboundedSender<ProgressEvent>>,
    last: f64,
}

impl ProgressReporter {
    pub fn new(sink: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self {
            sink: Some(sink),
            last: 0.0,
        }
    }

    /// A reporter nobody listens to.
    pub fn silent() -> Self {
        Self {
            sink: None,
            last: 0.0,
        }
    }

    pub fn from_option(sink: Option<mpsc::UnboundedSender<ProgressEvent>>) -> Self {
        Self { sink, last: 0.0 }
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    pub fn report(&mut self, stage: ProgressStage, percent: f64) {
        let percent = if percent.is_finite() { percent } else { 0.0 };
        let percent = percent.clamp(0.0, CEILING_BEFORE_COMPLETE).max(self.last);
        self.emit(stage, percent);
    }

    /// Report the operation as finished. Only call after success.
    pub fn complete(&mut self) {
        self.emit(ProgressStage::Complete, 100.0);
    }

    fn emit(&mut self, stage: ProgressStage, percent: f64) {
        self.last = percent;
        if let Some(sink) = &self.sink {
            // A dropped receiver means the caller stopped listening.
            if sink.send(ProgressEvent { stage, percent }).is_err() {
                self.sink = None;
            }
        }
    }
}

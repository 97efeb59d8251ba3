//! Progress indicator and error notification sink
//!
//! Broadcasts show an indeterminate progress bar. The sink receives start,
//! advance and done signals; `ProgressGuard` guarantees `done` is delivered
//! however the broadcast ends.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

/// Initial fraction shown by `start`
pub const PROGRESS_MINIMUM: f32 = 0.08;

/// Receives progress and error notifications from the submission workflow
pub trait ProgressSink: Send + Sync {
    fn start(&self);

    /// Advance to `fraction` in `[0, 1]`
    fn set(&self, fraction: f32);

    fn done(&self);

    fn notify_error(&self, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub active: bool,
    pub fraction: f32,
}

/// Progress state for one form session, readable without locking
pub struct ProgressTracker {
    label: String,
    active: AtomicBool,
    fraction: AtomicU32,
}

impl ProgressTracker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            active: AtomicBool::new(false),
            fraction: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            active: self.active.load(Ordering::Acquire),
            fraction: f32::from_bits(self.fraction.load(Ordering::Acquire)),
        }
    }

    fn store(&self, fraction: f32) {
        self.fraction
            .store(fraction.clamp(0.0, 1.0).to_bits(), Ordering::Release);
    }
}

impl ProgressSink for ProgressTracker {
    fn start(&self) {
        self.store(PROGRESS_MINIMUM);
        self.active.store(true, Ordering::Release);
        debug!("[{}] progress started", self.label);
    }

    fn set(&self, fraction: f32) {
        self.store(fraction);
    }

    fn done(&self) {
        self.store(1.0);
        self.active.store(false, Ordering::Release);
        debug!("[{}] progress done", self.label);
    }

    fn notify_error(&self, message: &str) {
        error!("[{}] {}", self.label, message);
    }
}

/// Starts progress on creation and completes it on drop
pub struct ProgressGuard {
    sink: Arc<dyn ProgressSink>,
}

impl ProgressGuard {
    pub fn start(sink: Arc<dyn ProgressSink>, baseline: f32) -> Self {
        sink.start();
        sink.set(baseline);
        Self { sink }
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.sink.done();
    }
}

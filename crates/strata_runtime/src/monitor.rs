//! Processor counters and the final report.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Live counters shared by a processor and its task bodies
#[derive(Debug, Default)]
pub struct ProcessorStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    cached: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    halted: AtomicBool,
}

impl ProcessorStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tuple handed to a task body
    pub fn record_submission(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a run that published its outputs
    pub fn record_completion(&self, cached: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if cached {
            self.cached.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a failed run
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a task body that panicked
    pub fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    /// Mark the processor halted
    pub fn mark_halted(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Whether the processor was halted
    #[must_use]
    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Snapshot as a report
    #[must_use]
    pub fn report(&self, processor: &str) -> ProcessorReport {
        ProcessorReport {
            processor: processor.to_string(),
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            cached: self.cached.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            halted: self.halted(),
        }
    }
}

/// Outcome of a processor run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorReport {
    /// Processor name
    pub processor: String,
    /// Tuples handed to task bodies
    pub submitted: u64,
    /// Runs that published outputs
    pub completed: u64,
    /// Completed runs served from the cache
    pub cached: u64,
    /// Runs that failed
    pub failed: u64,
    /// Task bodies that panicked
    pub panicked: u64,
    /// Whether the processor stopped early
    pub halted: bool,
}

impl ProcessorReport {
    /// Runs that actually executed
    #[must_use]
    pub const fn executed(&self) -> u64 {
        self.completed - self.cached
    }

    /// Whether every submitted run completed
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        !self.halted && self.failed == 0 && self.panicked == 0 && self.completed == self.submitted
    }
}

//! Internal observability metrics for record-reformer
//!
//! Counters describing what the pipeline did with the events it received.
//!
//! # Metrics
//!
//! - `events_received` - events handed to the pipeline
//! - `events_emitted` - events passed on to the sink
//! - `events_dropped` - events dropped because a template failed
//! - `unknown_placeholders` - placeholder lookups that found nothing
//! - `invalid_input` - input lines that could not be decoded into events

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe counter using atomic operations
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter initialized to 0
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters for one pipeline instance
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub events_received: Counter,
    pub events_emitted: Counter,
    pub events_dropped: Counter,
    pub unknown_placeholders: Counter,
    pub invalid_input: Counter,
}

impl PipelineMetrics {
    /// Create a new set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.get(),
            events_emitted: self.events_emitted.get(),
            events_dropped: self.events_dropped.get(),
            unknown_placeholders: self.unknown_placeholders.get(),
            invalid_input: self.invalid_input.get(),
        }
    }
}

/// Plain copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_received: u64,
    pub events_emitted: u64,
    pub events_dropped: u64,
    pub unknown_placeholders: u64,
    pub invalid_input: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} emitted={} dropped={} unknown_placeholders={} invalid_input={}",
            self.events_received,
            self.events_emitted,
            self.events_dropped,
            self.unknown_placeholders,
            self.invalid_input
        )
    }
}

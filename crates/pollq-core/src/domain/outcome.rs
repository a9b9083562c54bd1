//! Outcome model: what happened to each item of a polling cycle.
//!
//! These types carry no behavior of their own. The consumer fills them in so
//! callers (tests, CLI, metrics exporters) can observe a cycle without
//! scraping logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of running the per-item pipeline once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Processed and marked successful.
    Succeeded,

    /// The item disappeared before processing; nothing recorded.
    Vanished,

    /// Processing failed and the retry policy scheduled another attempt.
    RetryScheduled { next_attempt_time: DateTime<Utc> },

    /// Processing failed and the retry policy gave up.
    Abandoned,

    /// Processing failed and the item disappeared before the failure could
    /// be recorded.
    VanishedOnFailure,

    /// Processing failed and recording the failure failed as well.
    BookkeepingFailed,
}

/// Per-cycle summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub succeeded: usize,
    pub vanished: usize,
    pub retry_scheduled: usize,
    pub abandoned: usize,
    pub bookkeeping_failed: usize,
}

impl CycleReport {
    pub(crate) fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Vanished | ItemOutcome::VanishedOnFailure => self.vanished += 1,
            ItemOutcome::RetryScheduled { .. } => self.retry_scheduled += 1,
            ItemOutcome::Abandoned => self.abandoned += 1,
            ItemOutcome::BookkeepingFailed => self.bookkeeping_failed += 1,
        }
    }

    /// Number of items whose processing failed in this cycle.
    pub fn failed(&self) -> usize {
        self.retry_scheduled + self.abandoned + self.bookkeeping_failed
    }

    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

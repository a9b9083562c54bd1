//! Queueing state: retry/scheduling metadata of one queued item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the most recent attempt.
///
/// State transitions:
/// - NotAttempted -> Succeeded
/// - NotAttempted -> Failed -> Failed ... (while the retry policy keeps scheduling)
/// - Failed -> Succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueingStatus {
    /// Enqueued, never attempted.
    NotAttempted,

    /// Last attempt succeeded.
    Succeeded,

    /// Last attempt failed.
    Failed,
}

/// Attempt bookkeeping of a queued item.
///
/// Design:
/// - The storage collaborator owns the persisted record.
/// - The consumer works on an owned copy for the duration of one transaction
///   and hands it back through `ConsumerModule::save_queueing_state`.
/// - `next_attempt_time == None` means "not due": either succeeded or
///   abandoned by the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueingState {
    status: QueueingStatus,
    enqueued_time: DateTime<Utc>,
    attempt_count: u32,
    last_attempt_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl QueueingState {
    /// State of a freshly enqueued item, due immediately.
    pub fn enqueued(at: DateTime<Utc>) -> Self {
        Self {
            status: QueueingStatus::NotAttempted,
            enqueued_time: at,
            attempt_count: 0,
            last_attempt_time: None,
            next_attempt_time: Some(at),
            last_error: None,
        }
    }

    pub fn status(&self) -> QueueingStatus {
        self.status
    }

    pub fn enqueued_time(&self) -> DateTime<Utc> {
        self.enqueued_time
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn last_attempt_time(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_time
    }

    pub fn next_attempt_time(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_time
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Is the item eligible for polling at `now`?
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_time.is_some_and(|t| t <= now)
    }

    /// No further attempt is scheduled.
    pub fn is_terminal(&self) -> bool {
        self.next_attempt_time.is_none()
    }

    /// Mark the attempt at `now` as successful. The item is no longer due.
    pub fn register_attempt_success(&mut self, now: DateTime<Utc>) {
        self.record_attempt(now);
        self.status = QueueingStatus::Succeeded;
        self.next_attempt_time = None;
        self.last_error = None;
    }

    /// Record a failed attempt at `now`.
    ///
    /// The item becomes terminal until `schedule_next_attempt` is called.
    pub fn register_attempt_failure(&mut self, now: DateTime<Utc>, error: &dyn std::fmt::Display) {
        self.record_attempt(now);
        self.status = QueueingStatus::Failed;
        self.next_attempt_time = None;
        self.last_error = Some(error.to_string());
    }

    /// Make the item due again at or after `time`.
    pub fn schedule_next_attempt(&mut self, time: DateTime<Utc>) {
        self.next_attempt_time = Some(time);
    }

    fn record_attempt(&mut self, now: DateTime<Utc>) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        // last_attempt_time never goes backwards, even with a skewed clock
        self.last_attempt_time = Some(match self.last_attempt_time {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }
}

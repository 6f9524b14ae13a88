//! Scheduled payments and the due-time index
//!
//! One periodic scheduler scans the index instead of arming a timer per
//! rule. The index is a cache of the store and is rebuilt on load.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use shared_types::{Address, Amount, JobId, MilestoneIndex, Timestamp, TxHash};
use uuid::Uuid;

use super::condition::Condition;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Scheduled,
    Executed,
    Cancelled,
}

/// One-shot release at or after `release_date`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledPayment {
    pub id: Uuid,
    pub job_id: JobId,
    pub milestone: MilestoneIndex,
    pub release_date: Timestamp,
    pub conditions: Vec<Condition>,
    pub amount: Option<Amount>,
    pub recipient: Option<Address>,
    pub status: PaymentStatus,
    pub created_at: Timestamp,
    pub executed_at: Option<Timestamp>,
    pub execution_hash: Option<TxHash>,
    pub last_error: Option<String>,
}

impl ScheduledPayment {
    pub fn new(
        job_id: JobId,
        milestone: MilestoneIndex,
        release_date: Timestamp,
        conditions: Vec<Condition>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            milestone,
            release_date,
            conditions,
            amount: None,
            recipient: None,
            status: PaymentStatus::Scheduled,
            created_at: now,
            executed_at: None,
            execution_hash: None,
            last_error: None,
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.status == PaymentStatus::Scheduled && now >= self.release_date
    }
}

/// Entry kinds tracked by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScheduleEntry {
    Rule(JobId, Uuid),
    Payment(JobId, Uuid),
}

/// Entries ordered by due time.
#[derive(Debug, Default)]
pub struct ScheduleIndex {
    entries: BTreeSet<(Timestamp, ScheduleEntry)>,
}

impl ScheduleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, due_at: Timestamp, entry: ScheduleEntry) {
        self.entries.insert((due_at, entry));
    }

    /// Remove an entry regardless of its due time.
    pub fn remove(&mut self, entry: ScheduleEntry) {
        self.entries.retain(|(_, e)| *e != entry);
    }

    /// Entries due at `now`, earliest first. Entries stay until removed.
    pub fn due(&self, now: Timestamp) -> Vec<ScheduleEntry> {
        self.entries
            .iter()
            .take_while(|(at, _)| *at <= now)
            .map(|(_, e)| *e)
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub mod jobs;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::Job;

/// Persistent job-list operations. Each method is a whole
/// read-modify-write-persist unit; implementations guard the list with a
/// single lock so snapshots never interleave with mutations.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<Job>>;
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;
    /// Adds a job, replacing any existing job with the same id
    /// (last write wins).
    async fn add_job(&self, job: Job) -> Result<()>;
    /// Marks a job cancelled. Returns false when no such job exists.
    /// Cancelling an already-cancelled job is a no-op that returns true.
    async fn cancel_job(&self, job_id: &str, at: DateTime<Utc>) -> Result<bool>;
    /// Flips one reminder entry's `sent` flag. Already-sent entries are
    /// left untouched.
    async fn mark_reminder_sent(
        &self,
        job_id: &str,
        entry_idx: usize,
        at: DateTime<Utc>,
    ) -> Result<()>;
    /// Marks a scheduled message sent and records its delivery tallies.
    async fn mark_message_sent(
        &self,
        job_id: &str,
        at: DateTime<Utc>,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<()>;
    /// Drops every job the predicate rejects. Returns the number removed;
    /// persists only when something was removed.
    async fn retain_jobs(
        &self,
        keep: &(dyn for<'a> Fn(&'a Job) -> bool + Send + Sync),
    ) -> Result<usize>;
}

//! Retention policy over the job list. Pure predicate plus a driver that
//! funnels it through the store; the store skips the disk write when
//! nothing was removed.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::models::{Job, JobKind, JobStatus};
use crate::storage::JobStore;

/// Whether one job survives a sweep at `now`.
///
/// Cancelled jobs go unconditionally. A reminder job goes once every entry
/// is sent; one unsent entry retains it regardless of age. A scheduled
/// message goes once sent and past the retention window, `sent_at` falling
/// back to `created_at` when absent.
pub fn should_retain(job: &Job, now: DateTime<Utc>, retention: Duration) -> bool {
    if job.status == JobStatus::Cancelled {
        return false;
    }
    match &job.kind {
        JobKind::PlacementReminder(series) => series.reminder_dates.iter().any(|r| !r.sent),
        JobKind::ScheduledMessage(msg) => {
            if !msg.sent {
                return true;
            }
            let sent_at = msg.sent_at.unwrap_or(job.created_at);
            now - sent_at < retention
        }
    }
}

/// Runs one retention pass. Returns the number of jobs removed.
pub async fn sweep(store: &dyn JobStore, now: DateTime<Utc>, retention: Duration) -> Result<usize> {
    let removed = store
        .retain_jobs(&move |job| should_retain(job, now, retention))
        .await?;
    if removed > 0 {
        tracing::info!(removed, "Retention sweep removed jobs");
    }
    Ok(removed)
}

//! Pure due-work evaluation over a job-list snapshot. No catch-up
//! suppression: anything unsent with a fire time at or before `now` is due,
//! however old.

use chrono::{DateTime, Utc};

use crate::models::{Job, JobKind};

/// Reminder entries due at `now`: active jobs only, unsent entries only,
/// in job-list order then entry order. The index addresses the entry within
/// the job's `reminder_dates`.
pub fn due_reminders(jobs: &[Job], now: DateTime<Utc>) -> Vec<(&Job, usize)> {
    let mut due = Vec::new();
    for job in jobs {
        if !job.is_active() {
            continue;
        }
        let JobKind::PlacementReminder(series) = &job.kind else {
            continue;
        };
        for (idx, entry) in series.reminder_dates.iter().enumerate() {
            if !entry.sent && entry.fire_at <= now {
                due.push((job, idx));
            }
        }
    }
    due
}

/// Scheduled messages due at `now`: active, unsent, `send_at <= now`.
pub fn due_scheduled_messages(jobs: &[Job], now: DateTime<Utc>) -> Vec<&Job> {
    jobs.iter()
        .filter(|job| {
            if !job.is_active() {
                return false;
            }
            match &job.kind {
                JobKind::ScheduledMessage(msg) => !msg.sent && msg.send_at <= now,
                JobKind::PlacementReminder(_) => false,
            }
        })
        .collect()
}

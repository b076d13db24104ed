use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OutreachError;
use crate::models::Contact;

/// Format accepted for reminder deadlines, matching the persisted job file.
pub const DEADLINE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Cancelled,
}

/// One fire time in a reminder series. `fire_at` is fixed at job creation;
/// `sent` flips false -> true exactly once and never reverts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderEntry {
    pub fire_at: DateTime<Utc>,
    pub days_before: u32,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReminderSeries {
    pub company: String,
    pub position: String,
    pub deadline: NaiveDate,
    pub reminder_dates: Vec<ReminderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledMessage {
    pub message_template: String,
    pub template_vars: BTreeMap<String, String>,
    pub send_at: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub sent_count: u32,
    pub failed_count: u32,
}

/// The two job kinds. Internally tagged so the persisted record carries a
/// `"type"` discriminator alongside the variant's own fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    PlacementReminder(ReminderSeries),
    ScheduledMessage(ScheduledMessage),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub contacts: Vec<Contact>,
    #[serde(flatten)]
    pub kind: JobKind,
}

impl Job {
    pub fn is_active(&self) -> bool {
        self.status == JobStatus::Active
    }

    /// Completion is inferred from sub-state, never stored: a reminder job is
    /// complete once every entry is sent (offsets dropped at creation never
    /// became entries and do not count); a scheduled message once `sent`.
    pub fn is_complete(&self) -> bool {
        match &self.kind {
            JobKind::PlacementReminder(series) => series.reminder_dates.iter().all(|r| r.sent),
            JobKind::ScheduledMessage(msg) => msg.sent,
        }
    }
}

/// Input for creating a reminder-series job. `job_id` is caller-supplied or
/// generated; `deadline` arrives as a `%Y-%m-%d` string and is parsed
/// fail-fast, before anything is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReminderJob {
    pub job_id: Option<String>,
    pub company: String,
    pub position: String,
    pub deadline: String,
    pub contacts: Vec<Contact>,
    /// Overrides the configured default offsets when set.
    pub reminder_days_before: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduledMessage {
    pub job_id: Option<String>,
    pub contacts: Vec<Contact>,
    pub message_template: String,
    pub template_vars: BTreeMap<String, String>,
    pub send_at: DateTime<Utc>,
}

impl NewReminderJob {
    /// Build the persistent job record. Reminder entries are computed once,
    /// here: one per offset, firing at `reminder_time` UTC on
    /// `deadline - days_before`. Offsets already in the past at creation are
    /// dropped, not scheduled retroactively.
    pub fn into_job(
        self,
        default_offsets: &[u32],
        reminder_time: NaiveTime,
        now: DateTime<Utc>,
    ) -> Result<Job, OutreachError> {
        let job_id = validate_job_id(self.job_id)?;
        if self.contacts.is_empty() {
            return Err(OutreachError::Validation(
                "A job needs at least one contact".to_string(),
            ));
        }

        let deadline = NaiveDate::parse_from_str(&self.deadline, DEADLINE_FORMAT).map_err(|e| {
            OutreachError::Validation(format!("Invalid deadline '{}': {}", self.deadline, e))
        })?;

        let mut offsets = self
            .reminder_days_before
            .unwrap_or_else(|| default_offsets.to_vec());
        // Largest offset first, so entries end up in ascending fire_at order.
        offsets.sort_unstable_by(|a, b| b.cmp(a));

        let mut reminder_dates = Vec::new();
        for days_before in offsets {
            let fire_at = (deadline - chrono::Duration::days(i64::from(days_before)))
                .and_time(reminder_time)
                .and_utc();
            if fire_at >= now {
                reminder_dates.push(ReminderEntry {
                    fire_at,
                    days_before,
                    sent: false,
                    sent_at: None,
                });
            }
        }

        Ok(Job {
            job_id,
            status: JobStatus::Active,
            created_at: now,
            cancelled_at: None,
            contacts: self.contacts,
            kind: JobKind::PlacementReminder(ReminderSeries {
                company: self.company,
                position: self.position,
                deadline,
                reminder_dates,
            }),
        })
    }
}

impl NewScheduledMessage {
    pub fn into_job(self, now: DateTime<Utc>) -> Result<Job, OutreachError> {
        let job_id = validate_job_id(self.job_id)?;
        if self.contacts.is_empty() {
            return Err(OutreachError::Validation(
                "A job needs at least one contact".to_string(),
            ));
        }
        if self.message_template.trim().is_empty() {
            return Err(OutreachError::Validation(
                "Message template cannot be empty".to_string(),
            ));
        }

        Ok(Job {
            job_id,
            status: JobStatus::Active,
            created_at: now,
            cancelled_at: None,
            contacts: self.contacts,
            kind: JobKind::ScheduledMessage(ScheduledMessage {
                message_template: self.message_template,
                template_vars: self.template_vars,
                send_at: self.send_at,
                sent: false,
                sent_at: None,
                sent_count: 0,
                failed_count: 0,
            }),
        })
    }
}

fn validate_job_id(job_id: Option<String>) -> Result<String, OutreachError> {
    match job_id {
        Some(id) if id.trim().is_empty() => Err(OutreachError::Validation(
            "Job id cannot be empty".to_string(),
        )),
        Some(id) => Ok(id),
        None => Ok(Uuid::now_v7().to_string()),
    }
}

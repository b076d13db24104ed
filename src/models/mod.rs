pub mod config;
pub mod contact;
pub mod job;

pub use config::SchedulerConfig;
pub use contact::Contact;
pub use job::{
    Job, JobKind, JobStatus, NewReminderJob, NewScheduledMessage, ReminderEntry, ReminderSeries,
    ScheduledMessage,
};

//! Scheduling engine for bulk templated messaging: deadline-reminder series
//! and one-shot scheduled messages, persisted to a JSON job file and driven
//! by a minute-cadence background loop with a daily retention sweep.

pub mod contacts;
pub mod delivery;
pub mod errors;
pub mod models;
pub mod scheduler;
pub mod storage;
pub mod templates;

pub use contacts::{filter_contacts, ContactFilter, ContactSource, InMemoryContactSource};
pub use delivery::{ContactOutcome, DeliveryOutcome, MessageTransport};
pub use errors::OutreachError;
pub use models::{
    Contact, Job, JobKind, JobStatus, NewReminderJob, NewScheduledMessage, ReminderEntry,
    ReminderSeries, ScheduledMessage, SchedulerConfig,
};
pub use scheduler::{
    Clock, DispatchReport, Dispatcher, FailedContact, FakeClock, MessageScheduler, SystemClock,
};
pub use storage::{jobs::JsonJobStore, JobStore};
pub use templates::{render, JsonTemplateStore, MessageTemplate, TemplateSource, TemplateVars};

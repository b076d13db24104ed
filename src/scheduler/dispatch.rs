//! Delivery of one due event: render every contact's message up front, send
//! sequentially, then mark the event sent in one store call.
//!
//! At-least-once, no retries: the sent flag flips only after the delivery
//! attempts, so a crash mid-dispatch re-delivers on the next tick, while a
//! partial failure never does. A render failure aborts the event before any
//! send, leaving it unsent for the next tick.

use std::sync::Arc;

use anyhow::Result;

use crate::delivery::{ContactOutcome, MessageTransport};
use crate::models::{Contact, Job, JobKind};
use crate::scheduler::Clock;
use crate::storage::JobStore;
use crate::templates::{render, TemplateSource, TemplateVars, REMINDER_TEMPLATE_NAME};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedContact {
    pub name: String,
    pub reason: &'static str,
}

/// Outcome tally for one dispatched due event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: u32,
    pub failed: Vec<FailedContact>,
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn JobStore>,
    transport: Arc<dyn MessageTransport>,
    templates: Arc<dyn TemplateSource>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn JobStore>,
        transport: Arc<dyn MessageTransport>,
        templates: Arc<dyn TemplateSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            transport,
            templates,
            clock,
        }
    }

    /// Dispatch one due reminder entry.
    pub async fn dispatch_reminder(&self, job: &Job, entry_idx: usize) -> Result<DispatchReport> {
        let JobKind::PlacementReminder(series) = &job.kind else {
            anyhow::bail!("Job '{}' is not a reminder job", job.job_id);
        };
        if series.reminder_dates.get(entry_idx).is_none() {
            anyhow::bail!("Job '{}' has no reminder entry {}", job.job_id, entry_idx);
        }

        let template = self.templates.template(REMINDER_TEMPLATE_NAME).await?;

        let days_remaining = (series.deadline - self.clock.now().date_naive())
            .num_days()
            .max(0);
        let mut vars = TemplateVars::new();
        vars.insert("company", series.company.clone());
        vars.insert("position", series.position.clone());
        vars.insert("last_date", series.deadline.format("%Y-%m-%d").to_string());
        vars.insert("days_remaining", days_remaining.to_string());

        let messages = render_all(&template, &vars, &job.contacts)?;
        let report = self.deliver_all(&job.job_id, messages).await;

        self.store
            .mark_reminder_sent(&job.job_id, entry_idx, self.clock.now())
            .await?;

        log_report(&job.job_id, &report);
        Ok(report)
    }

    /// Dispatch one due scheduled message.
    pub async fn dispatch_scheduled(&self, job: &Job) -> Result<DispatchReport> {
        let JobKind::ScheduledMessage(msg) = &job.kind else {
            anyhow::bail!("Job '{}' is not a scheduled message", job.job_id);
        };

        let vars = TemplateVars::from_map(msg.template_vars.clone());
        let messages = render_all(&msg.message_template, &vars, &job.contacts)?;
        let report = self.deliver_all(&job.job_id, messages).await;

        self.store
            .mark_message_sent(
                &job.job_id,
                self.clock.now(),
                report.sent,
                report.failed.len() as u32,
            )
            .await?;

        log_report(&job.job_id, &report);
        Ok(report)
    }

    /// One attempt per contact, in order. Transport errors count as failures
    /// for that contact only.
    async fn deliver_all(
        &self,
        job_id: &str,
        messages: Vec<(Contact, String)>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (contact, message) in messages {
            let outcome = if !contact.has_phone() {
                ContactOutcome::NoPhoneNumber
            } else {
                match self.transport.deliver(&contact, &message).await {
                    Ok(outcome) => outcome.into(),
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job_id,
                            contact = %contact.name,
                            error = %e,
                            "Transport error during delivery"
                        );
                        ContactOutcome::SendFailed
                    }
                }
            };

            match outcome.failure_reason() {
                None => report.sent += 1,
                Some(reason) => report.failed.push(FailedContact {
                    name: contact.name.clone(),
                    reason,
                }),
            }
        }

        report
    }
}

/// Renders every contact's message before anything is sent, so a bad
/// template never results in a half-delivered event.
fn render_all(
    template: &str,
    vars: &TemplateVars,
    contacts: &[Contact],
) -> Result<Vec<(Contact, String)>> {
    let mut messages = Vec::with_capacity(contacts.len());
    for contact in contacts {
        let contact_vars = vars.with_contact(contact)?;
        let message = render(template, &contact_vars)?;
        messages.push((contact.clone(), message));
    }
    Ok(messages)
}

fn log_report(job_id: &str, report: &DispatchReport) {
    if report.failed.is_empty() {
        tracing::info!(job_id = %job_id, sent = report.sent, "Dispatched");
    } else {
        tracing::warn!(
            job_id = %job_id,
            sent = report.sent,
            failed = report.failed.len(),
            "Dispatched with partial failures"
        );
    }
}

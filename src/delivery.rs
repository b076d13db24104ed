//! Message delivery seam. The engine never talks to a messaging backend
//! directly; it hands a rendered message and a contact to a
//! [`MessageTransport`] and interprets the returned outcome. Delivery
//! failures are data, not errors: a transport `Err` means the attempt
//! itself could not be made and is folded into [`ContactOutcome::SendFailed`]
//! by the dispatcher.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Contact;

/// What the transport reports for one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The backend has no such recipient.
    ContactNotFound,
    /// The backend accepted the request but the send did not go through.
    SendFailed,
}

/// Per-contact result as recorded by the dispatcher. Extends
/// [`DeliveryOutcome`] with the one failure decided locally, before the
/// transport is ever called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactOutcome {
    Delivered,
    NoPhoneNumber,
    ContactNotFound,
    SendFailed,
}

impl ContactOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ContactOutcome::Delivered)
    }

    /// Human-readable failure reason, None when delivered.
    pub fn failure_reason(&self) -> Option<&'static str> {
        match self {
            ContactOutcome::Delivered => None,
            ContactOutcome::NoPhoneNumber => Some("No phone number"),
            ContactOutcome::ContactNotFound => Some("Contact not found"),
            ContactOutcome::SendFailed => Some("Failed to send"),
        }
    }
}

impl From<DeliveryOutcome> for ContactOutcome {
    fn from(outcome: DeliveryOutcome) -> Self {
        match outcome {
            DeliveryOutcome::Delivered => ContactOutcome::Delivered,
            DeliveryOutcome::ContactNotFound => ContactOutcome::ContactNotFound,
            DeliveryOutcome::SendFailed => ContactOutcome::SendFailed,
        }
    }
}

/// Sends one rendered message to one contact. Implementations own their own
/// timeouts and must not retry; the engine makes exactly one attempt per
/// contact per due event.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn deliver(&self, contact: &Contact, message: &str) -> Result<DeliveryOutcome>;
}

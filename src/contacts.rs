//! Contact lookup and filtering. Jobs copy their contacts at creation, so
//! the source is only consulted when assembling a new job's audience; the
//! backing storage (spreadsheets, CRMs) stays behind the [`ContactSource`]
//! trait.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Contact;

/// Criteria for selecting contacts. All set criteria must match; an empty
/// filter matches everyone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactFilter {
    /// Minimum value of the contact's `score` field. Contacts with a missing
    /// or unparsable score are treated as scoring 0.
    pub min_score: Option<f64>,
    /// Exact-match membership against the contact's `category` field.
    pub categories: Option<Vec<String>>,
    /// Case-insensitive substring match against the contact's `tags` field;
    /// any one keyword matching is enough.
    pub keywords: Option<Vec<String>>,
}

impl ContactFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        if let Some(min_score) = self.min_score {
            let score = contact
                .extra
                .get("score")
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.0);
            if score < min_score {
                return false;
            }
        }

        if let Some(categories) = &self.categories {
            let category = contact.extra.get("category").map(String::as_str).unwrap_or("");
            if !categories.iter().any(|c| c == category) {
                return false;
            }
        }

        if let Some(keywords) = &self.keywords {
            let tags = contact
                .extra
                .get("tags")
                .map(|t| t.to_lowercase())
                .unwrap_or_default();
            if !keywords.iter().any(|k| tags.contains(&k.to_lowercase())) {
                return false;
            }
        }

        true
    }
}

/// Applies the filter to a slice, preserving order.
pub fn filter_contacts(contacts: &[Contact], filter: &ContactFilter) -> Vec<Contact> {
    contacts
        .iter()
        .filter(|c| filter.matches(c))
        .cloned()
        .collect()
}

#[async_trait]
pub trait ContactSource: Send + Sync {
    async fn list_contacts(&self, filter: &ContactFilter) -> Result<Vec<Contact>>;
}

/// Contact source backed by a fixed in-memory list.
pub struct InMemoryContactSource {
    contacts: Vec<Contact>,
}

impl InMemoryContactSource {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }
}

#[async_trait]
impl ContactSource for InMemoryContactSource {
    async fn list_contacts(&self, filter: &ContactFilter) -> Result<Vec<Contact>> {
        Ok(filter_contacts(&self.contacts, filter))
    }
}

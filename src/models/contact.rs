use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A message recipient. `extra` captures any additional columns from the
/// contact source (score, category, tags, ...) and is available for template
/// substitution; it is flattened so the persisted record stays a flat map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn has_phone(&self) -> bool {
        !self.phone.trim().is_empty()
    }
}

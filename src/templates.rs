//! Named message templates and `{placeholder}` rendering.
//!
//! Templates use single-brace placeholders (`{name}`), with `{{` and `}}`
//! as literal-brace escapes. Rendering is strict: an unresolved placeholder
//! or an unbalanced brace is an error, not silently passed through.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::OutreachError;
use crate::models::Contact;

/// Placeholder values for a render pass. Job-level variables form the base;
/// contact fields are overlaid per recipient via [`TemplateVars::with_contact`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateVars {
    vars: BTreeMap<String, String>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Overlays the contact's fields (`name`, `phone`, and any extras) on top
    /// of the job-level variables. A key present in both layers is ambiguous
    /// and rejected outright rather than silently shadowed.
    pub fn with_contact(&self, contact: &Contact) -> Result<TemplateVars, OutreachError> {
        let mut merged = self.vars.clone();

        let mut overlay = |key: &str, value: &str| -> Result<(), OutreachError> {
            if merged.contains_key(key) {
                return Err(OutreachError::Validation(format!(
                    "Template variable '{}' collides with a contact field",
                    key
                )));
            }
            merged.insert(key.to_string(), value.to_string());
            Ok(())
        };

        overlay("name", &contact.name)?;
        overlay("phone", &contact.phone)?;
        for (key, value) in &contact.extra {
            overlay(key, value)?;
        }

        Ok(TemplateVars { vars: merged })
    }
}

/// Substitutes `{placeholder}` occurrences in `template` from `vars`.
pub fn render(template: &str, vars: &TemplateVars) -> Result<String, OutreachError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => {
                            return Err(OutreachError::Template(
                                "Unclosed '{' in template".to_string(),
                            ))
                        }
                    }
                }
                let value = vars.get(&key).ok_or_else(|| {
                    OutreachError::Template(format!("Unresolved placeholder '{{{}}}'", key))
                })?;
                out.push_str(value);
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(OutreachError::Template(
                        "Unmatched '}' in template".to_string(),
                    ));
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Lookup of named message templates.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn template(&self, name: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageTemplate {
    pub template: String,
    pub description: String,
}

pub const REMINDER_TEMPLATE_NAME: &str = "reminder";
pub const PLACEMENT_ALERT_TEMPLATE_NAME: &str = "placement_alert";
pub const INTERVIEW_TEMPLATE_NAME: &str = "interview_schedule";

const DEFAULT_REMINDER_TEMPLATE: &str = "\
🔔 *Placement Reminder* 🔔

Dear {name},

This is a reminder about the placement opportunity:

*Company:* {company}
*Position:* {position}
*Application Deadline:* {last_date}

⏰ Only {days_remaining} days left to apply!

Don't miss this opportunity. Apply now!

Best regards,
Placement Cell
";

const DEFAULT_PLACEMENT_ALERT_TEMPLATE: &str = "\
🎯 *Placement Opportunity Alert* 🎯

Dear {name},

We have an exciting placement opportunity that matches your profile:

*Company:* {company}
*Position:* {position}
*Package:* {package}
*Location:* {location}
*Last Date to Apply:* {last_date}

*Requirements:*
{requirements}

Please reply with \"INTERESTED\" if you want to apply for this position.

Best regards,
Placement Cell
";

const DEFAULT_INTERVIEW_TEMPLATE: &str = "\
📅 *Interview Scheduled* 📅

Dear {name},

Your interview has been scheduled for:

*Company:* {company}
*Position:* {position}
*Date:* {interview_date}
*Time:* {interview_time}
*Mode:* {interview_mode}
*Venue/Link:* {interview_details}

Please be prepared and join 10 minutes early.

All the best!

Placement Cell
";

/// Named templates persisted to `messages.json` under the data dir. First
/// use seeds the stock `reminder` and `placement_alert` templates.
pub struct JsonTemplateStore {
    file_path: PathBuf,
    cache: RwLock<BTreeMap<String, MessageTemplate>>,
}

impl JsonTemplateStore {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("messages.json");

        let templates = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read messages.json")?;
            serde_json::from_str::<BTreeMap<String, MessageTemplate>>(&content).map_err(|e| {
                OutreachError::Storage(format!(
                    "messages.json at {} is corrupt: {}",
                    file_path.display(),
                    e
                ))
            })?
        } else {
            let defaults = default_templates();
            write_templates(&file_path, &defaults).await?;
            tracing::info!("Seeded default message templates");
            defaults
        };

        Ok(Self {
            file_path,
            cache: RwLock::new(templates),
        })
    }

    /// Adds or replaces a named template and persists the set.
    pub async fn upsert_template(
        &self,
        name: &str,
        template: MessageTemplate,
    ) -> Result<()> {
        let mut cache = self.cache.write().await;
        cache.insert(name.to_string(), template);
        write_templates(&self.file_path, &cache).await
    }

    pub async fn template_names(&self) -> Vec<String> {
        let cache = self.cache.read().await;
        cache.keys().cloned().collect()
    }
}

fn default_templates() -> BTreeMap<String, MessageTemplate> {
    let mut templates = BTreeMap::new();
    templates.insert(
        REMINDER_TEMPLATE_NAME.to_string(),
        MessageTemplate {
            template: DEFAULT_REMINDER_TEMPLATE.to_string(),
            description: "Reminder message for upcoming deadlines".to_string(),
        },
    );
    templates.insert(
        PLACEMENT_ALERT_TEMPLATE_NAME.to_string(),
        MessageTemplate {
            template: DEFAULT_PLACEMENT_ALERT_TEMPLATE.to_string(),
            description: "General placement opportunity alert".to_string(),
        },
    );
    templates.insert(
        INTERVIEW_TEMPLATE_NAME.to_string(),
        MessageTemplate {
            template: DEFAULT_INTERVIEW_TEMPLATE.to_string(),
            description: "Interview schedule notification".to_string(),
        },
    );
    templates
}

async fn write_templates(
    file_path: &std::path::Path,
    templates: &BTreeMap<String, MessageTemplate>,
) -> Result<()> {
    let tmp_path = file_path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(templates).context("Failed to serialize templates")?;
    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .context("Failed to write temporary templates file")?;
    tokio::fs::rename(&tmp_path, file_path)
        .await
        .context("Failed to rename temporary templates file")?;
    Ok(())
}

#[async_trait]
impl TemplateSource for JsonTemplateStore {
    async fn template(&self, name: &str) -> Result<String> {
        let cache = self.cache.read().await;
        cache
            .get(name)
            .map(|t| t.template.clone())
            .ok_or_else(|| OutreachError::NotFound(format!("Template '{}' not found", name)).into())
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Engine configuration. Every field has a default so partial config
/// sources deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    /// Directory holding jobs.json. Resolved against the platform data dir
    /// when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Seconds between due-work evaluations.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Local wall-clock time (UTC) at which the daily retention sweep runs.
    #[serde(default = "default_sweep_time")]
    pub sweep_time: NaiveTime,
    /// Days a sent scheduled message is kept before the sweep removes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Default day offsets before a deadline at which reminders fire.
    #[serde(default = "default_reminder_days_before")]
    pub reminder_days_before: Vec<u32>,
    /// Time of day (UTC) at which reminder entries fire.
    #[serde(default = "default_reminder_time")]
    pub reminder_time: NaiveTime,
    /// How long `stop()` waits for the run loop to finish in-flight work.
    #[serde(default = "default_stop_grace_secs")]
    pub stop_grace_secs: u64,
}

fn default_tick_secs() -> u64 {
    60
}

fn default_sweep_time() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).expect("valid time")
}

fn default_retention_days() -> u32 {
    7
}

fn default_reminder_days_before() -> Vec<u32> {
    vec![7, 3, 1]
}

fn default_reminder_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).expect("valid time")
}

fn default_stop_grace_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            tick_secs: default_tick_secs(),
            sweep_time: default_sweep_time(),
            retention_days: default_retention_days(),
            reminder_days_before: default_reminder_days_before(),
            reminder_time: default_reminder_time(),
            stop_grace_secs: default_stop_grace_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Returns the configured data dir, or the platform default
    /// (`<data_dir>/outreach-scheduler`) when unset.
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let base = dirs::data_dir().context("Could not determine platform data directory")?;
        Ok(base.join("outreach-scheduler"))
    }
}

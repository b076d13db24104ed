use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::errors::OutreachError;
use crate::models::{Job, JobKind, JobStatus};
use crate::storage::JobStore;

pub struct JsonJobStore {
    file_path: PathBuf,
    cache: RwLock<Vec<Job>>,
}

impl JsonJobStore {
    /// Create a new JsonJobStore, loading existing data from disk if present.
    ///
    /// A missing `jobs.json` means an empty job list. A file that exists but
    /// fails to parse is a hard error: silently dropping the job list would
    /// lose scheduled work, so the caller must intervene.
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .context("Failed to create data directory")?;

        let file_path = data_dir.join("jobs.json");

        let jobs = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .context("Failed to read jobs.json")?;
            serde_json::from_str::<Vec<Job>>(&content).map_err(|e| {
                OutreachError::Storage(format!(
                    "jobs.json at {} is corrupt: {}",
                    file_path.display(),
                    e
                ))
            })?
        } else {
            Vec::new()
        };

        Ok(Self {
            file_path,
            cache: RwLock::new(jobs),
        })
    }

    /// Atomically write the jobs cache to disk.
    /// Writes to a .tmp file first, then renames to the actual file.
    async fn persist(&self, jobs: &[Job]) -> Result<()> {
        let tmp_path = self.file_path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(jobs).context("Failed to serialize jobs")?;

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .context("Failed to write temporary jobs file")?;

        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .context("Failed to rename temporary jobs file")?;

        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonJobStore {
    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.clone())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let cache = self.cache.read().await;
        Ok(cache.iter().find(|j| j.job_id == job_id).cloned())
    }

    async fn add_job(&self, job: Job) -> Result<()> {
        let mut cache = self.cache.write().await;

        if let Some(idx) = cache.iter().position(|j| j.job_id == job.job_id) {
            tracing::warn!(job_id = %job.job_id, "Replacing existing job with same id");
            cache[idx] = job;
        } else {
            cache.push(job);
        }

        self.persist(&cache).await
    }

    async fn cancel_job(&self, job_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut cache = self.cache.write().await;

        let Some(job) = cache.iter_mut().find(|j| j.job_id == job_id) else {
            return Ok(false);
        };

        if job.status == JobStatus::Cancelled {
            return Ok(true);
        }

        job.status = JobStatus::Cancelled;
        job.cancelled_at = Some(at);

        self.persist(&cache).await?;
        Ok(true)
    }

    async fn mark_reminder_sent(
        &self,
        job_id: &str,
        entry_idx: usize,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut cache = self.cache.write().await;

        let job = cache
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| OutreachError::NotFound(format!("Job '{}' not found", job_id)))?;

        let JobKind::PlacementReminder(series) = &mut job.kind else {
            return Err(OutreachError::Validation(format!(
                "Job '{}' is not a reminder job",
                job_id
            ))
            .into());
        };

        let entry = series.reminder_dates.get_mut(entry_idx).ok_or_else(|| {
            OutreachError::NotFound(format!(
                "Job '{}' has no reminder entry {}",
                job_id, entry_idx
            ))
        })?;

        // sent flips once and never reverts
        if entry.sent {
            return Ok(());
        }
        entry.sent = true;
        entry.sent_at = Some(at);

        self.persist(&cache).await
    }

    async fn mark_message_sent(
        &self,
        job_id: &str,
        at: DateTime<Utc>,
        sent_count: u32,
        failed_count: u32,
    ) -> Result<()> {
        let mut cache = self.cache.write().await;

        let job = cache
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| OutreachError::NotFound(format!("Job '{}' not found", job_id)))?;

        let JobKind::ScheduledMessage(msg) = &mut job.kind else {
            return Err(OutreachError::Validation(format!(
                "Job '{}' is not a scheduled message",
                job_id
            ))
            .into());
        };

        if msg.sent {
            return Ok(());
        }
        msg.sent = true;
        msg.sent_at = Some(at);
        msg.sent_count = sent_count;
        msg.failed_count = failed_count;

        self.persist(&cache).await
    }

    async fn retain_jobs(
        &self,
        keep: &(dyn for<'a> Fn(&'a Job) -> bool + Send + Sync),
    ) -> Result<usize> {
        let mut cache = self.cache.write().await;

        let before = cache.len();
        cache.retain(|j| keep(j));
        let removed = before - cache.len();

        if removed > 0 {
            self.persist(&cache).await?;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, NewReminderJob, NewScheduledMessage};
    use chrono::{NaiveTime, TimeZone};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn make_reminder_job(job_id: &str) -> Job {
        NewReminderJob {
            job_id: Some(job_id.to_string()),
            company: "Acme".to_string(),
            position: "Engineer".to_string(),
            deadline: "2025-06-25".to_string(),
            contacts: vec![Contact::new("Jane", "+14155550123")],
            reminder_days_before: None,
        }
        .into_job(
            &[7, 3, 1],
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            fixed_now(),
        )
        .expect("build job")
    }

    fn make_scheduled_job(job_id: &str) -> Job {
        NewScheduledMessage {
            job_id: Some(job_id.to_string()),
            contacts: vec![Contact::new("Jane", "+14155550123")],
            message_template: "Hi {name}".to_string(),
            template_vars: BTreeMap::new(),
            send_at: fixed_now() + chrono::Duration::hours(1),
        }
        .into_job(fixed_now())
        .expect("build job")
    }

    async fn setup_store() -> (JsonJobStore, TempDir) {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let store = JsonJobStore::new(tmp_dir.path().to_path_buf())
            .await
            .expect("create store");
        (store, tmp_dir)
    }

    #[tokio::test]
    async fn test_add_and_get_job() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");
        let fetched = store.get_job("job-1").await.expect("get").expect("found");
        assert_eq!(fetched.job_id, "job-1");
        assert!(fetched.is_active());
    }

    #[tokio::test]
    async fn test_get_job_not_found() {
        let (store, _tmp) = setup_store().await;
        let result = store.get_job("nonexistent").await.expect("get");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_jobs_empty() {
        let (store, _tmp) = setup_store().await;
        assert!(store.list_jobs().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_add_job_same_id_replaces() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("dup")).await.expect("add");
        store.add_job(make_scheduled_job("dup")).await.expect("add");

        let jobs = store.list_jobs().await.expect("list");
        assert_eq!(jobs.len(), 1);
        assert!(matches!(jobs[0].kind, JobKind::ScheduledMessage(_)));
    }

    #[tokio::test]
    async fn test_cancel_job() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");

        let cancelled = store.cancel_job("job-1", fixed_now()).await.expect("cancel");
        assert!(cancelled);

        let job = store.get_job("job-1").await.expect("get").expect("found");
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.cancelled_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_cancel_job_not_found() {
        let (store, _tmp) = setup_store().await;
        let cancelled = store
            .cancel_job("nonexistent", fixed_now())
            .await
            .expect("cancel");
        assert!(!cancelled);
    }

    #[tokio::test]
    async fn test_cancel_job_idempotent() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");

        assert!(store.cancel_job("job-1", fixed_now()).await.expect("first"));
        let later = fixed_now() + chrono::Duration::hours(1);
        assert!(store.cancel_job("job-1", later).await.expect("second"));

        // The original cancellation time is preserved.
        let job = store.get_job("job-1").await.expect("get").expect("found");
        assert_eq!(job.cancelled_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_mark_reminder_sent() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");

        store
            .mark_reminder_sent("job-1", 0, fixed_now())
            .await
            .expect("mark");

        let job = store.get_job("job-1").await.expect("get").expect("found");
        let JobKind::PlacementReminder(series) = &job.kind else {
            panic!("expected reminder kind");
        };
        assert!(series.reminder_dates[0].sent);
        assert_eq!(series.reminder_dates[0].sent_at, Some(fixed_now()));
        assert!(!series.reminder_dates[1].sent);
    }

    #[tokio::test]
    async fn test_mark_reminder_sent_does_not_revert() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");

        store
            .mark_reminder_sent("job-1", 0, fixed_now())
            .await
            .expect("first");
        let later = fixed_now() + chrono::Duration::hours(2);
        store
            .mark_reminder_sent("job-1", 0, later)
            .await
            .expect("second");

        let job = store.get_job("job-1").await.expect("get").expect("found");
        let JobKind::PlacementReminder(series) = &job.kind else {
            panic!("expected reminder kind");
        };
        assert_eq!(series.reminder_dates[0].sent_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_mark_reminder_sent_bad_index() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");
        let result = store.mark_reminder_sent("job-1", 10, fixed_now()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_reminder_sent_wrong_kind() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_scheduled_job("job-1")).await.expect("add");
        let result = store.mark_reminder_sent("job-1", 0, fixed_now()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_message_sent() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_scheduled_job("job-1")).await.expect("add");

        store
            .mark_message_sent("job-1", fixed_now(), 3, 1)
            .await
            .expect("mark");

        let job = store.get_job("job-1").await.expect("get").expect("found");
        let JobKind::ScheduledMessage(msg) = &job.kind else {
            panic!("expected scheduled kind");
        };
        assert!(msg.sent);
        assert_eq!(msg.sent_at, Some(fixed_now()));
        assert_eq!(msg.sent_count, 3);
        assert_eq!(msg.failed_count, 1);
    }

    #[tokio::test]
    async fn test_mark_message_sent_not_found() {
        let (store, _tmp) = setup_store().await;
        let result = store.mark_message_sent("ghost", fixed_now(), 1, 0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_retain_jobs() {
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("keep")).await.expect("add");
        store.add_job(make_scheduled_job("drop")).await.expect("add");

        let removed = store
            .retain_jobs(&|j| j.job_id == "keep")
            .await
            .expect("retain");
        assert_eq!(removed, 1);

        let jobs = store.list_jobs().await.expect("list");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "keep");
    }

    #[tokio::test]
    async fn test_retain_jobs_through_trait_object() {
        // The predicate borrows from the job it inspects; this must work
        // through a `&dyn JobStore` with any caller-side closure.
        let (store, _tmp) = setup_store().await;
        store.add_job(make_reminder_job("keep")).await.expect("add");
        store.add_job(make_scheduled_job("drop")).await.expect("add");

        let wanted = "keep".to_string();
        let store: &dyn JobStore = &store;
        let removed = store
            .retain_jobs(&|j| j.job_id.as_str() == wanted)
            .await
            .expect("retain");
        assert_eq!(removed, 1);
        assert!(store.get_job("keep").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_retain_jobs_no_change_keeps_file_untouched() {
        let (store, tmp) = setup_store().await;
        store.add_job(make_reminder_job("job-1")).await.expect("add");

        let file_path = tmp.path().join("jobs.json");
        let before = tokio::fs::metadata(&file_path).await.expect("stat");
        let removed = store.retain_jobs(&|_| true).await.expect("retain");
        assert_eq!(removed, 0);
        let after = tokio::fs::metadata(&file_path).await.expect("stat");
        assert_eq!(
            before.modified().expect("mtime"),
            after.modified().expect("mtime")
        );
    }

    #[tokio::test]
    async fn test_atomic_write_produces_valid_json() {
        let (store, tmp) = setup_store().await;
        store.add_job(make_reminder_job("persist-test")).await.expect("add");

        let file_path = tmp.path().join("jobs.json");
        let content = tokio::fs::read_to_string(&file_path)
            .await
            .expect("read file");
        let jobs: Vec<Job> = serde_json::from_str(&content).expect("parse JSON");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "persist-test");
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let tmp_dir = TempDir::new().expect("create temp dir");

        {
            let store = JsonJobStore::new(tmp_dir.path().to_path_buf())
                .await
                .expect("create store");
            store
                .add_job(make_reminder_job("persistent-job"))
                .await
                .expect("add");
            store
                .mark_reminder_sent("persistent-job", 0, fixed_now())
                .await
                .expect("mark");
        }

        {
            let store = JsonJobStore::new(tmp_dir.path().to_path_buf())
                .await
                .expect("create store");
            let jobs = store.list_jobs().await.expect("list");
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs[0].job_id, "persistent-job");
            let JobKind::PlacementReminder(series) = &jobs[0].kind else {
                panic!("expected reminder kind");
            };
            assert!(series.reminder_dates[0].sent);
        }
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_after_write() {
        let (store, tmp) = setup_store().await;
        store.add_job(make_reminder_job("clean-write")).await.expect("add");

        let tmp_file = tmp.path().join("jobs.json.tmp");
        assert!(
            !tmp_file.exists(),
            "Temporary file should not remain after write"
        );
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let store = JsonJobStore::new(tmp_dir.path().to_path_buf())
            .await
            .expect("create store");
        assert!(store.list_jobs().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_jobs_json_is_an_error() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let jobs_file = tmp_dir.path().join("jobs.json");

        tokio::fs::write(&jobs_file, b"this is not valid JSON{{{")
            .await
            .expect("write corrupted file");

        let result = JsonJobStore::new(tmp_dir.path().to_path_buf()).await;
        let err = result.err().expect("corrupt file must error");
        assert!(
            err.to_string().contains("corrupt"),
            "Expected corruption error, got: {}",
            err
        );

        // The corrupt file is left in place for operator inspection.
        let content = tokio::fs::read(&jobs_file).await.expect("read");
        assert_eq!(content, b"this is not valid JSON{{{");
    }
}

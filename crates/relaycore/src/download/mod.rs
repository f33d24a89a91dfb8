//! Download job queue and cooperative cancellation (spec.md §5): a
//! bounded worker pool drives per-track pipelines while the server hands
//! back a job handle the caller can poll or cancel.

pub mod wanted;

use std::collections::HashMap;
use std::sync::Arc;

use sandboxed_file_manager::SandboxedManager;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{DownloadJob, DownloadJobStatus};

/// Tracks an in-flight job's cancellation token alongside its shared
/// status record so `cancel()` and status polling can be served without
/// touching the worker task itself.
struct JobHandle {
    job: DownloadJob,
    cancel: CancellationToken,
}

/// In-memory download job registry. One instance is shared by the whole
/// server process; workers observe `CancellationToken` between segments
/// and between post-processing steps, matching the cooperative
/// cancellation contract — in-flight HTTP calls are bounded by their own
/// timeouts rather than hard-interrupted.
pub struct DownloadJobManager {
    jobs: RwLock<HashMap<Uuid, JobHandle>>,
    /// Bounds the number of concurrently-running track pipelines
    /// (`downloader.downloads` in config).
    concurrency: Arc<Semaphore>,
    /// Per-job working directories for transient manifest/segment files,
    /// released on every exit path (spec.md §5 shared-resource policy).
    work_dirs: SandboxedManager,
}

fn job_dir(job_id: Uuid) -> String {
    format!("job-{job_id}")
}

impl DownloadJobManager {
    pub fn new(max_concurrent_downloads: usize, work_dirs: SandboxedManager) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            concurrency: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
            work_dirs,
        }
    }

    /// Registers a new job in `Queued` state and creates its working
    /// directory. The caller is responsible for spawning the worker task
    /// that drives it via `run_with`.
    pub async fn submit(&self, service_tag: &str, title_id: &str) -> DownloadJob {
        let job = DownloadJob::new(service_tag, title_id);
        if let Err(err) = self.work_dirs.create_dir_all(job_dir(job.job_id)).await {
            tracing::warn!(job_id = %job.job_id, error = %err, "failed to create download job working directory");
        }
        let handle = JobHandle { job: job.clone(), cancel: CancellationToken::new() };
        self.jobs.write().await.insert(job.job_id, handle);
        job
    }

    /// Absolute path to this job's working directory, for a worker to
    /// stage segments and manifests in.
    pub fn work_dir(&self, job_id: Uuid) -> AppResult<std::path::PathBuf> {
        self.work_dirs.get_full_path(job_dir(job_id)).map_err(|e| AppError::internal(e.to_string()))
    }

    /// Runs `work` for `job_id` inside the concurrency-limited worker
    /// pool, honoring cooperative cancellation and updating the job's
    /// terminal status on completion.
    pub async fn run_with<F, Fut>(&self, job_id: Uuid, work: F) -> AppResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<serde_json::Value, String>>,
    {
        let cancel = {
            let mut jobs = self.jobs.write().await;
            let handle = jobs.get_mut(&job_id).ok_or_else(|| AppError::not_found("download job", job_id.to_string()))?;
            handle.job.status = DownloadJobStatus::Running;
            handle.job.updated_at = chrono::Utc::now();
            handle.cancel.clone()
        };

        let _permit = self.concurrency.acquire().await.map_err(|_| AppError::internal("download semaphore closed"))?;

        let outcome = work(cancel.clone()).await;

        {
            let mut jobs = self.jobs.write().await;
            if let Some(handle) = jobs.get_mut(&job_id) {
                handle.job.updated_at = chrono::Utc::now();
                if cancel.is_cancelled() {
                    handle.job.status = DownloadJobStatus::Cancelled;
                } else {
                    match outcome {
                        Ok(result) => {
                            handle.job.status = DownloadJobStatus::Completed;
                            handle.job.progress = 1.0;
                            handle.job.result = Some(result);
                        }
                        Err(message) => {
                            handle.job.status = DownloadJobStatus::Failed;
                            handle.job.error = Some(message);
                        }
                    }
                }
            }
        }

        if let Err(err) = self.work_dirs.remove_dir_all(job_dir(job_id)).await {
            tracing::debug!(job_id = %job_id, error = %err, "download job working directory already gone");
        }
        Ok(())
    }

    pub async fn update_progress(&self, job_id: Uuid, progress: f32) {
        if let Some(handle) = self.jobs.write().await.get_mut(&job_id) {
            handle.job.progress = progress.clamp(0.0, 1.0);
            handle.job.updated_at = chrono::Utc::now();
        }
    }

    /// Sets the job's status to `Cancelled` and signals its
    /// `CancellationToken`; workers observe the flag at their next
    /// segment/post-processing boundary rather than being interrupted
    /// mid-call.
    pub async fn cancel(&self, job_id: Uuid) -> AppResult<DownloadJob> {
        let was_queued = {
            let mut jobs = self.jobs.write().await;
            let handle = jobs.get_mut(&job_id).ok_or_else(|| AppError::not_found("download job", job_id.to_string()))?;
            let was_queued = handle.job.status == DownloadJobStatus::Queued;
            if !handle.job.is_terminal() {
                handle.cancel.cancel();
                handle.job.status = DownloadJobStatus::Cancelled;
                handle.job.updated_at = chrono::Utc::now();
            }
            was_queued
        };
        // A job that never reached `run_with` won't release its own
        // working directory, so do it here instead.
        if was_queued {
            self.work_dirs.remove_dir_all(job_dir(job_id)).await.ok();
        }
        Ok(self.jobs.read().await.get(&job_id).expect("job present").job.clone())
    }

    pub async fn get(&self, job_id: Uuid) -> Option<DownloadJob> {
        self.jobs.read().await.get(&job_id).map(|h| h.job.clone())
    }

    pub async fn list(&self) -> Vec<DownloadJob> {
        self.jobs.read().await.values().map(|h| h.job.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_manager(max_concurrent: usize) -> DownloadJobManager {
        let dir = tempfile::tempdir().unwrap();
        let work_dirs = SandboxedManager::builder().base_directory(dir.keep()).build().await.unwrap();
        DownloadJobManager::new(max_concurrent, work_dirs)
    }

    #[tokio::test]
    async fn submit_creates_queued_job() {
        let manager = test_manager(2).await;
        let job = manager.submit("atvp", "m1").await;
        assert_eq!(job.status, DownloadJobStatus::Queued);
        assert_eq!(manager.get(job.job_id).await.unwrap().status, DownloadJobStatus::Queued);
    }

    #[tokio::test]
    async fn run_with_marks_completed_on_success() {
        let manager = test_manager(2).await;
        let job = manager.submit("atvp", "m1").await;
        manager.run_with(job.job_id, |_cancel| async move { Ok(serde_json::json!({"ok": true})) }).await.unwrap();
        let updated = manager.get(job.job_id).await.unwrap();
        assert_eq!(updated.status, DownloadJobStatus::Completed);
        assert_eq!(updated.progress, 1.0);
    }

    #[tokio::test]
    async fn run_with_marks_failed_on_error() {
        let manager = test_manager(2).await;
        let job = manager.submit("atvp", "m1").await;
        manager.run_with(job.job_id, |_cancel| async move { Err("boom".to_string()) }).await.unwrap();
        let updated = manager.get(job.job_id).await.unwrap();
        assert_eq!(updated.status, DownloadJobStatus::Failed);
        assert_eq!(updated.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn cancel_before_run_yields_cancelled_status() {
        let manager = test_manager(2).await;
        let job = manager.submit("atvp", "m1").await;
        let cancelled = manager.cancel(job.job_id).await.unwrap();
        assert_eq!(cancelled.status, DownloadJobStatus::Cancelled);

        manager
            .run_with(job.job_id, |cancel| async move {
                if cancel.is_cancelled() {
                    return Err("cancelled before start".to_string());
                }
                Ok(serde_json::Value::Null)
            })
            .await
            .unwrap();
        assert_eq!(manager.get(job.job_id).await.unwrap().status, DownloadJobStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_unknown_job_errors() {
        let manager = test_manager(1).await;
        assert!(manager.cancel(Uuid::new_v4()).await.is_err());
    }
}

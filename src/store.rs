use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::RwLock;

use crate::domain::{Execution, ExecutionStatus};
use crate::error::{QualensError, Result};

/// Storage contract for indexed executions.
///
/// The indexing pipeline only needs find-by-key, save and a terminal-status
/// probe; anything richer (queries, pagination) belongs to the admin surface
/// and is out of scope here.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Looks up an execution by its (job URL, job link) dedup key; a match
    /// on either non-empty half counts.
    async fn find_by_job(
        &self,
        job_url: Option<&str>,
        job_link: Option<&str>,
    ) -> Result<Option<Execution>>;

    /// Upserts by the same dedup key.
    async fn save(&self, execution: Execution) -> Result<()>;

    /// True when the job URL is already recorded with terminal DONE status.
    async fn is_done(&self, job_url: &str) -> Result<bool>;

    async fn all(&self) -> Result<Vec<Execution>>;
}

/// Completion-request markers, keyed by job URL.
///
/// A marker is an external signal that the job is about to finish; the
/// crawl that observes one consumes it.
#[async_trait]
pub trait CompletionRequestRepository: Send + Sync {
    async fn exists(&self, job_url: &str) -> Result<bool>;
    async fn create(&self, job_url: &str) -> Result<()>;
    async fn delete(&self, job_url: &str) -> Result<()>;
}

/// Asset-storage collaborator for generated HTTP logs.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores an HTML snippet and returns its public location.
    async fn upload_http_log(&self, name: &str, html: &str) -> Result<String>;
}

/// JSON-file-backed store in a data directory.
///
/// Executions live in `executions.json`, completion markers in
/// `completion-requests.json`, HTTP logs under `http-logs/`. Everything is
/// loaded into memory at open and written back on each mutation.
pub struct JsonStore {
    dir: PathBuf,
    executions: RwLock<Vec<Execution>>,
    markers: RwLock<HashSet<String>>,
}

impl JsonStore {
    /// Opens (or initializes) a store in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| QualensError::Store("No data directory found".into()))?
            .join("qualens");
        Self::open(&dir)
    }

    /// Opens (or initializes) a store rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let executions = load_json_or_default(&dir.join("executions.json"));
        let markers = load_json_or_default(&dir.join("completion-requests.json"));

        info!("Execution store at: {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            executions: RwLock::new(executions),
            markers: RwLock::new(markers),
        })
    }

    fn flush_executions(&self, executions: &[Execution]) -> Result<()> {
        let content = serde_json::to_string(executions)?;
        fs::write(self.dir.join("executions.json"), content)?;
        Ok(())
    }

    fn flush_markers(&self, markers: &HashSet<String>) -> Result<()> {
        let content = serde_json::to_string(markers)?;
        fs::write(self.dir.join("completion-requests.json"), content)?;
        Ok(())
    }
}

fn load_json_or_default<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .inspect(|_| debug!("Loaded store file: {}", path.display()))
        .unwrap_or_default()
}

#[async_trait]
impl ExecutionRepository for JsonStore {
    async fn find_by_job(
        &self,
        job_url: Option<&str>,
        job_link: Option<&str>,
    ) -> Result<Option<Execution>> {
        let executions = self.executions.read().await;
        Ok(executions
            .iter()
            .find(|e| e.matches_job(job_url, job_link))
            .cloned())
    }

    async fn save(&self, execution: Execution) -> Result<()> {
        if execution.job_url.is_none() && execution.job_link.is_none() {
            return Err(QualensError::BadRequest(
                "Execution needs a job URL or a job link".into(),
            ));
        }

        let mut executions = self.executions.write().await;
        let existing = executions
            .iter()
            .position(|e| e.matches_job(execution.job_url.as_deref(), execution.job_link.as_deref()));

        match existing {
            Some(index) => executions[index] = execution,
            None => executions.push(execution),
        }

        self.flush_executions(&executions)
    }

    async fn is_done(&self, job_url: &str) -> Result<bool> {
        let executions = self.executions.read().await;
        Ok(executions
            .iter()
            .any(|e| e.job_url.as_deref() == Some(job_url) && e.status == ExecutionStatus::Done))
    }

    async fn all(&self) -> Result<Vec<Execution>> {
        Ok(self.executions.read().await.clone())
    }
}

#[async_trait]
impl CompletionRequestRepository for JsonStore {
    async fn exists(&self, job_url: &str) -> Result<bool> {
        Ok(self.markers.read().await.contains(job_url))
    }

    async fn create(&self, job_url: &str) -> Result<()> {
        let mut markers = self.markers.write().await;
        markers.insert(job_url.to_string());
        self.flush_markers(&markers)
    }

    async fn delete(&self, job_url: &str) -> Result<()> {
        let mut markers = self.markers.write().await;
        markers.remove(job_url);
        self.flush_markers(&markers)
    }
}

#[async_trait]
impl AssetStore for JsonStore {
    async fn upload_http_log(&self, name: &str, html: &str) -> Result<String> {
        let logs_dir = self.dir.join("http-logs");
        fs::create_dir_all(&logs_dir)?;

        let file = logs_dir.join(name);
        fs::write(&file, html)?;

        debug!("HTTP log stored: {}", file.display());
        Ok(file.display().to_string())
    }
}

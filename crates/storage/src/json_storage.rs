//! JSON file storage implementation.
//!
//! Stores data as JSON files under a root directory (by convention
//! `.archon/`):
//!
//! ```text
//! tasks/<task-id>.json
//! decisions/<decision-id>.json
//! performance.json
//! ```
//!
//! Decision files are created with `create_new`, so the audit trail can only
//! grow.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use archon_core::{Decision, PerformanceHistory, Task, TaskId};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use super::{Result, Storage, StorageError};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
}

impl JsonStorage {
    /// Open (and create if needed) a store rooted at `root`.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("tasks")).await?;
        fs::create_dir_all(root.join("decisions")).await?;

        debug!("Opened JSON storage at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn task_path(&self, id: &TaskId) -> PathBuf {
        self.root.join("tasks").join(format!("{}.json", file_stem(id.as_str())))
    }

    fn decision_path(&self, decision: &Decision) -> PathBuf {
        self.root.join("decisions").join(format!("{}.json", decision.id))
    }

    fn performance_path(&self) -> PathBuf {
        self.root.join("performance.json")
    }
}

#[async_trait]
impl Storage for JsonStorage {
    async fn save_task(&mut self, task: &Task) -> Result<()> {
        let json = serde_json::to_string_pretty(task)?;
        write_atomic(&self.task_path(&task.id), json.as_bytes()).await
    }

    async fn load_task(&self, id: &TaskId) -> Result<Option<Task>> {
        read_json(&self.task_path(id)).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = list_dir(&self.root.join("tasks")).await?;
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn append_decision(&mut self, decision: &Decision) -> Result<()> {
        let path = self.decision_path(decision);
        let json = serde_json::to_string_pretty(decision)?;

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(format!("decision {}", decision.id)));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        debug!("Appended decision {} for task {}", decision.id, decision.task_id);
        Ok(())
    }

    async fn list_decisions(&self, task: Option<&TaskId>) -> Result<Vec<Decision>> {
        let mut decisions: Vec<Decision> = list_dir(&self.root.join("decisions")).await?;
        decisions.retain(|d| task.map_or(true, |t| &d.task_id == t));
        decisions.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(decisions)
    }

    async fn load_performance(&self) -> Result<PerformanceHistory> {
        Ok(read_json(&self.performance_path()).await?.unwrap_or_default())
    }

    async fn save_performance(&mut self, history: &PerformanceHistory) -> Result<()> {
        let json = serde_json::to_string_pretty(history)?;
        write_atomic(&self.performance_path(), json.as_bytes()).await
    }
}

/// Map a task id onto a safe file name.
fn file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Write to a sibling `.tmp` file, then rename over `path`, so readers
/// never see a half-written file.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

/// A single entry stored in the learning store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningEntry {
    pub id: Uuid,
    pub text: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl LearningEntry {
    pub fn new(text: impl Into<String>, category: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            category: category.into(),
            tags,
            created_at: Utc::now(),
        }
    }

    /// Whether the entry carries `tag` (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Trait for learning store backends.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Append a pattern under `category`, tagged for later retrieval.
    async fn store(&self, text: &str, category: &str, tags: &[String]) -> MaestroResult<()>;

    /// List entries, optionally restricted to one category.
    async fn list(&self, category: Option<&str>) -> MaestroResult<Vec<LearningEntry>>;

    /// Count entries.
    async fn count(&self) -> MaestroResult<usize>;
}

/// In-memory learning store.
pub struct InMemoryLearningStore {
    entries: RwLock<Vec<LearningEntry>>,
}

impl InMemoryLearningStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    async fn push(&self, entry: LearningEntry) {
        let mut entries = self.entries.write().await;
        entries.push(entry);
    }
}

impl Default for InMemoryLearningStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LearningStore for InMemoryLearningStore {
    async fn store(&self, text: &str, category: &str, tags: &[String]) -> MaestroResult<()> {
        if text.trim().is_empty() {
            return Err(MaestroError::Memory("Cannot store empty pattern".to_string()));
        }
        self.push(LearningEntry::new(text, category, tags.to_vec())).await;
        Ok(())
    }

    async fn list(&self, category: Option<&str>) -> MaestroResult<Vec<LearningEntry>> {
        let entries = self.entries.read().await;
        let filtered: Vec<LearningEntry> = entries
            .iter()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .cloned()
            .collect();
        Ok(filtered)
    }

    async fn count(&self) -> MaestroResult<usize> {
        let entries = self.entries.read().await;
        Ok(entries.len())
    }
}

/// File-backed learning store that persists entries as JSONL on disk.
///
/// The journal is opened once, replayed into memory, and kept open in append
/// mode; every store writes one line through that handle.
pub struct FileLearningStore {
    path: PathBuf,
    journal: Mutex<File>,
    inner: InMemoryLearningStore,
}

impl FileLearningStore {
    /// Open (or create) the journal at `path` and load its entries.
    pub async fn new(path: PathBuf) -> MaestroResult<Self> {
        let (journal, entries) = open_journal(&path).await?;
        debug!(path = %path.display(), entries = entries.len(), "Loaded learning store");
        let inner = InMemoryLearningStore::new();
        for entry in entries {
            inner.push(entry).await;
        }
        Ok(Self {
            path,
            journal: Mutex::new(journal),
            inner,
        })
    }

    /// Path of the backing JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Open `path` for reading and appending, creating it and its parent
/// directories if needed, and parse the lines already in it.
async fn open_journal(path: &Path) -> MaestroResult<(File, Vec<LearningEntry>)> {
    let memory_err = |what: &str, e: std::io::Error| {
        MaestroError::Memory(format!("{what} {}: {e}", path.display()))
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| memory_err("Failed to create directory for", e))?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| memory_err("Failed to open", e))?;

    let mut data = String::new();
    file.read_to_string(&mut data)
        .await
        .map_err(|e| memory_err("Failed to read", e))?;
    let entries = data
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| MaestroError::Memory(format!("Invalid JSONL entry: {e}")))
        })
        .collect::<MaestroResult<Vec<LearningEntry>>>()?;
    Ok((file, entries))
}

#[async_trait]
impl LearningStore for FileLearningStore {
    async fn store(&self, text: &str, category: &str, tags: &[String]) -> MaestroResult<()> {
        if text.trim().is_empty() {
            return Err(MaestroError::Memory("Cannot store empty pattern".to_string()));
        }
        let entry = LearningEntry::new(text, category, tags.to_vec());
        let mut line = serde_json::to_string(&entry)
            .map_err(|e| MaestroError::Memory(format!("Failed to serialize entry: {e}")))?;
        line.push('\n');

        // held across the in-memory push so file and memory order agree
        let mut journal = self.journal.lock().await;
        journal
            .write_all(line.as_bytes())
            .await
            .map_err(|e| MaestroError::Memory(format!("Failed to write entry: {e}")))?;
        journal
            .flush()
            .await
            .map_err(|e| MaestroError::Memory(format!("Failed to write entry: {e}")))?;
        self.inner.push(entry).await;
        Ok(())
    }

    async fn list(&self, category: Option<&str>) -> MaestroResult<Vec<LearningEntry>> {
        self.inner.list(category).await
    }

    async fn count(&self) -> MaestroResult<usize> {
        self.inner.count().await
    }
}

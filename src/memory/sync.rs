use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::library::BookLibrary;
use crate::memory::client::MemoryClient;

/// How many section uploads run at once.
const DEFAULT_SYNC_WORKERS: usize = 8;

/// Status checkpoint interval, in completed sections.
const CHECKPOINT_EVERY: usize = 10;

/// Persistent record of one book's sync into semantic memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_sections: usize,
    pub synced_sections: usize,
    pub failed_sections: usize,
    #[serde(default)]
    pub memory_ids: Vec<String>,
    #[serde(default)]
    pub success_rate: f64,
}

/// Roll-up written after syncing the whole library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total_books: usize,
    pub successful_syncs: usize,
    pub failed_syncs: usize,
    pub total_sections_synced: usize,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AllBooksSync {
    summary: SyncSummary,
    book_results: HashMap<String, SyncStatus>,
}

/// Pushes processed book sections into semantic memory.
///
/// A book that already finished syncing is skipped unless forced, so the
/// command is safe to re-run after partial failures.
pub struct ReferenceSync {
    library: BookLibrary,
    memory: MemoryClient,
    sync_dir: PathBuf,
    worker_semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ReferenceSync {
    pub fn new<P: AsRef<Path>>(library: BookLibrary, memory: MemoryClient, sync_dir: P) -> Self {
        Self::with_workers(library, memory, sync_dir, DEFAULT_SYNC_WORKERS)
    }

    pub fn with_workers<P: AsRef<Path>>(
        library: BookLibrary,
        memory: MemoryClient,
        sync_dir: P,
        max_workers: usize,
    ) -> Self {
        Self {
            library,
            memory,
            sync_dir: sync_dir.as_ref().to_path_buf(),
            worker_semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            max_concurrent: max_workers.max(1),
        }
    }

    fn status_file(&self, book_id: &str) -> PathBuf {
        self.sync_dir.join(format!("{}_sync.json", book_id))
    }

    /// Load the persisted sync status for a book, if any.
    pub async fn get_sync_status(&self, book_id: &str) -> Result<Option<SyncStatus>> {
        let path = self.status_file(book_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read sync status: {}", path.display()))?;
        let status: SyncStatus = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse sync status: {}", path.display()))?;
        Ok(Some(status))
    }

    async fn save_status(&self, status: &SyncStatus) -> Result<()> {
        tokio::fs::create_dir_all(&self.sync_dir)
            .await
            .context("Failed to create sync status directory")?;
        let path = self.status_file(&status.book_id);
        let content = serde_json::to_string_pretty(status)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write sync status: {}", path.display()))?;
        Ok(())
    }

    /// Sync one book's sections into memory.
    pub async fn sync_book(&self, book_id: &str, force: bool) -> Result<SyncStatus> {
        if !force {
            if let Some(status) = self.get_sync_status(book_id).await? {
                if status.completed {
                    info!("📋 Book {} already synced, use force to resync", book_id);
                    return Ok(status);
                }
            }
        }

        let metadata = self.library.get_metadata(book_id).await?;
        let sections = self.library.get_sections(book_id).await?;
        if sections.sections.is_empty() {
            return Err(anyhow!("No sections found for book {}", book_id));
        }

        info!(
            "🔄 Syncing '{}' by {} ({} sections)",
            metadata.title,
            metadata.author,
            sections.sections.len()
        );

        let mut status = SyncStatus {
            book_id: book_id.to_string(),
            title: metadata.title.clone(),
            author: metadata.author.clone(),
            started_at: Utc::now(),
            completed: false,
            completed_at: None,
            total_sections: sections.sections.len(),
            synced_sections: 0,
            failed_sections: 0,
            memory_ids: Vec::new(),
            success_rate: 0.0,
        };
        self.save_status(&status).await?;

        let (tx, mut rx) = mpsc::channel(self.max_concurrent);
        let source = format!("{} by {}", metadata.title, metadata.author);

        // Spawn an upload task per section
        for section in sections.sections.into_iter() {
            let memory = self.memory.clone();
            let tx = tx.clone();
            let semaphore = Arc::clone(&self.worker_semaphore);
            let source = source.clone();
            let book_id = book_id.to_string();
            let book_title = metadata.title.clone();
            let author = metadata.author.clone();

            tokio::spawn(async move {
                let _permit = semaphore.acquire().await.unwrap();

                let section_metadata = json!({
                    "book_id": book_id,
                    "book_title": book_title,
                    "author": author,
                    "section_title": section.section_title,
                    "chapter_title": section.chapter_title,
                });
                let result = memory
                    .add_reference_material(&section.content, &source, section_metadata)
                    .await;

                if let Err(e) = tx.send(result).await {
                    error!("Failed to send sync result: {}", e);
                }
            });
        }

        // Drop the original sender to close the channel when all tasks complete
        drop(tx);

        // Collect results, checkpointing the status file as sections land
        while let Some(result) = rx.recv().await {
            match result {
                Ok(memory_id) => {
                    status.synced_sections += 1;
                    status.memory_ids.push(memory_id);
                }
                Err(e) => {
                    status.failed_sections += 1;
                    warn!("❌ Failed to sync section: {}", e);
                }
            }

            if (status.synced_sections + status.failed_sections) % CHECKPOINT_EVERY == 0 {
                if let Err(e) = self.save_status(&status).await {
                    warn!("⚠️ Failed to checkpoint sync status: {}", e);
                }
            }
        }

        status.completed = true;
        status.completed_at = Some(Utc::now());
        status.success_rate = if status.total_sections > 0 {
            status.synced_sections as f64 / status.total_sections as f64
        } else {
            0.0
        };
        self.save_status(&status).await?;

        info!(
            "✅ Synced {}/{} sections for book {}",
            status.synced_sections, status.total_sections, book_id
        );
        Ok(status)
    }

    /// Sync every book in the library.
    pub async fn sync_all(&self, force: bool) -> Result<SyncSummary> {
        let books = self.library.list_books().await?;
        if books.is_empty() {
            return Err(anyhow!("No books found to sync"));
        }

        let total_books = books.len();
        let mut book_results = HashMap::new();

        for book in books {
            match self.sync_book(&book.book_id, force).await {
                Ok(status) => {
                    book_results.insert(book.book_id.clone(), status);
                }
                Err(e) => {
                    warn!("❌ Failed to sync book {}: {}", book.book_id, e);
                }
            }
        }

        let successful_syncs = book_results.values().filter(|s| s.completed).count();
        let summary = SyncSummary {
            total_books,
            successful_syncs,
            failed_syncs: total_books - successful_syncs,
            total_sections_synced: book_results.values().map(|s| s.synced_sections).sum(),
            completed_at: Utc::now(),
        };

        let all_books = AllBooksSync {
            summary: summary.clone(),
            book_results,
        };
        tokio::fs::create_dir_all(&self.sync_dir)
            .await
            .context("Failed to create sync status directory")?;
        let path = self.sync_dir.join("all_books_sync.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&all_books)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(
            "📊 Library sync finished: {}/{} books, {} sections",
            summary.successful_syncs, summary.total_books, summary.total_sections_synced
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::client::MemoryConfig;
    use tempfile::TempDir;

    fn unconfigured_sync(dir: &Path) -> ReferenceSync {
        let library = BookLibrary::new(dir.join("books"));
        let memory = MemoryClient::new(MemoryConfig::default()).unwrap();
        ReferenceSync::new(library, memory, dir.join("sync_status"))
    }

    #[tokio::test]
    async fn test_status_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let sync = unconfigured_sync(temp_dir.path());

        assert!(sync.get_sync_status("book_a").await.unwrap().is_none());

        let status = SyncStatus {
            book_id: "book_a".to_string(),
            title: "Alpha Quadrant".to_string(),
            author: "Jo Tester".to_string(),
            started_at: Utc::now(),
            completed: true,
            completed_at: Some(Utc::now()),
            total_sections: 4,
            synced_sections: 3,
            failed_sections: 1,
            memory_ids: vec!["m1".to_string(), "m2".to_string(), "m3".to_string()],
            success_rate: 0.75,
        };
        sync.save_status(&status).await.unwrap();

        let loaded = sync.get_sync_status("book_a").await.unwrap().unwrap();
        assert!(loaded.completed);
        assert_eq!(loaded.synced_sections, 3);
        assert_eq!(loaded.memory_ids.len(), 3);
        assert_eq!(loaded.success_rate, 0.75);
    }

    #[tokio::test]
    async fn test_completed_book_is_skipped_without_force() {
        let temp_dir = TempDir::new().unwrap();
        let sync = unconfigured_sync(temp_dir.path());

        let status = SyncStatus {
            book_id: "book_a".to_string(),
            title: "Alpha Quadrant".to_string(),
            author: "Jo Tester".to_string(),
            started_at: Utc::now(),
            completed: true,
            completed_at: Some(Utc::now()),
            total_sections: 2,
            synced_sections: 2,
            failed_sections: 0,
            memory_ids: vec!["m1".to_string(), "m2".to_string()],
            success_rate: 1.0,
        };
        sync.save_status(&status).await.unwrap();

        // The library directory is empty, so anything past the skip check
        // would fail to load the book.
        let result = sync.sync_book("book_a", false).await.unwrap();
        assert_eq!(result.synced_sections, 2);
        assert!(result.completed);
    }

    #[tokio::test]
    async fn test_missing_book_fails() {
        let temp_dir = TempDir::new().unwrap();
        let sync = unconfigured_sync(temp_dir.path());
        assert!(sync.sync_book("ghost", false).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_all_with_empty_library_fails() {
        let temp_dir = TempDir::new().unwrap();
        let sync = unconfigured_sync(temp_dir.path());
        assert!(sync.sync_all(false).await.is_err());
    }

    #[tokio::test]
    async fn test_partial_status_parses_without_optional_fields() {
        let temp_dir = TempDir::new().unwrap();
        let sync = unconfigured_sync(temp_dir.path());
        tokio::fs::create_dir_all(temp_dir.path().join("sync_status"))
            .await
            .unwrap();

        // Shape written by the initial checkpoint, before completion fields exist.
        let initial = serde_json::json!({
            "book_id": "book_b",
            "title": "Zeta Reticuli",
            "author": "Jo Tester",
            "started_at": Utc::now(),
            "completed": false,
            "total_sections": 10,
            "synced_sections": 4,
            "failed_sections": 0,
        });
        tokio::fs::write(
            temp_dir.path().join("sync_status/book_b_sync.json"),
            initial.to_string(),
        )
        .await
        .unwrap();

        let loaded = sync.get_sync_status("book_b").await.unwrap().unwrap();
        assert!(!loaded.completed);
        assert!(loaded.completed_at.is_none());
        assert!(loaded.memory_ids.is_empty());
        assert_eq!(loaded.success_rate, 0.0);
    }
}

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Metadata for one processed reference book.
///
/// Books are ingested by an external EPUB processor that writes
/// `metadata.json` and `sections.json` into a per-book directory; this
/// module only reads those files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookInfo {
    pub book_id: String,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub processed_at: Option<String>,
    #[serde(default)]
    pub num_chapters: Option<usize>,
}

/// One readable section of a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSection {
    pub section_title: String,
    pub chapter_title: String,
    pub content: String,
}

/// All sections of a processed book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSections {
    pub total_sections: usize,
    pub sections: Vec<BookSection>,
}

/// Read-only view over the processed book library.
#[derive(Debug, Clone)]
pub struct BookLibrary {
    books_dir: PathBuf,
}

impl BookLibrary {
    pub fn new<P: AsRef<Path>>(books_dir: P) -> Self {
        Self {
            books_dir: books_dir.as_ref().to_path_buf(),
        }
    }

    fn book_dir(&self, book_id: &str) -> PathBuf {
        self.books_dir.join(book_id)
    }

    /// List every book with readable metadata, sorted by title.
    pub async fn list_books(&self) -> Result<Vec<BookInfo>> {
        let mut books = Vec::new();

        if !self.books_dir.exists() {
            debug!("📁 Book library directory does not exist yet");
            return Ok(books);
        }

        let mut entries = tokio::fs::read_dir(&self.books_dir)
            .await
            .with_context(|| format!("Failed to read books directory: {}", self.books_dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            match self.read_metadata(&path).await {
                Ok(info) => books.push(info),
                Err(e) => {
                    warn!("⚠️ Skipping unreadable book at {}: {}", path.display(), e);
                }
            }
        }

        books.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(books)
    }

    /// Load metadata for one book.
    pub async fn get_metadata(&self, book_id: &str) -> Result<BookInfo> {
        let dir = self.book_dir(book_id);
        if !dir.exists() {
            return Err(anyhow!("Book not found: {}", book_id));
        }
        self.read_metadata(&dir).await
    }

    /// Load all sections of one book.
    pub async fn get_sections(&self, book_id: &str) -> Result<BookSections> {
        let path = self.book_dir(book_id).join("sections.json");
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read sections for book {}", book_id))?;
        let sections: BookSections = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse sections for book {}", book_id))?;
        Ok(sections)
    }

    async fn read_metadata(&self, book_dir: &Path) -> Result<BookInfo> {
        let path = book_dir.join("metadata.json");
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read book metadata: {}", path.display()))?;
        let info: BookInfo = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse book metadata: {}", path.display()))?;
        Ok(info)
    }
}

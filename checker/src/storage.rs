use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::time::{now_rfc3339, unix_millis};

pub const TEST_FILE_PREFIX: &str = "test-file-";
pub const TEST_FILE_SUFFIX: &str = ".txt";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageKind {
    /// The shared mount every instance sees.
    Shared,
    /// Local disk fallback, private to this instance.
    Local,
}

impl StorageKind {
    pub fn label(&self) -> &'static str {
        match self {
            StorageKind::Shared => "shared",
            StorageKind::Local => "local-disk",
        }
    }
}

/// Directory-backed test file operations. Writes are plain filesystem
/// calls with no locking: concurrent writers landing on the same
/// millisecond race on the same name, which is acceptable for a
/// diagnostic tool.
#[derive(Clone, Debug)]
pub struct StorageBackend {
    kind: StorageKind,
    path: PathBuf,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WrittenFile {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub modified: String,
}

impl StorageBackend {
    pub fn shared(path: impl Into<PathBuf>) -> StorageBackend {
        StorageBackend {
            kind: StorageKind::Shared,
            path: path.into(),
        }
    }

    pub fn local(path: impl Into<PathBuf>) -> StorageBackend {
        StorageBackend {
            kind: StorageKind::Local,
            path: path.into(),
        }
    }

    /// Prepare the local fallback directory, creating it if absent.
    pub async fn init_local(path: &str) -> Result<StorageBackend> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("failed to create local storage directory {path}"))?;

        Ok(StorageBackend::local(path))
    }

    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_test_file(&self) -> Result<WrittenFile> {
        let name = format!("{TEST_FILE_PREFIX}{}{TEST_FILE_SUFFIX}", unix_millis());
        let content = format!("test file {}", now_rfc3339());
        tokio::fs::write(self.path.join(&name), &content)
            .await
            .with_context(|| format!("failed to write {name}"))?;

        Ok(WrittenFile { name, content })
    }

    /// Returns the newest test file, where "newest" is the
    /// lexicographically last name. This matches chronological order only
    /// because generated names embed fixed-width millisecond timestamps.
    pub async fn read_latest_test_file(&self) -> Result<Option<WrittenFile>> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path)
            .await
            .with_context(|| format!("failed to list {}", self.path.display()))?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEST_FILE_PREFIX) && name.ends_with(TEST_FILE_SUFFIX) {
                names.push(name);
            }
        }

        names.sort();
        let Some(name) = names.pop() else {
            return Ok(None);
        };

        let content = tokio::fs::read_to_string(self.path.join(&name))
            .await
            .with_context(|| format!("failed to read {name}"))?;

        Ok(Some(WrittenFile { name, content }))
    }

    /// Name, size and modification time for every regular file in the
    /// active directory.
    pub async fn list_files(&self) -> Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path)
            .await
            .with_context(|| format!("failed to list {}", self.path.display()))?;
        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = match metadata.modified() {
                Ok(modified) => OffsetDateTime::from(modified)
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("unknown")),
                Err(_) => String::from("unknown"),
            };
            files.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                modified,
            });
        }

        Ok(files)
    }
}

// ==========================================
// Precast tracking backend - staged file storage
// ==========================================
// Uploads are written to disk before a job is created; the background
// pipeline only ever sees the staged path.
// Layout: <root>/<project_id>/<uuid>_<sanitised file name>
// ==========================================

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("file storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub original_name: String,
    pub size: usize,
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn stage(
        &self,
        project_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StagedFile, StorageError>;
}

pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn stage(
        &self,
        project_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StagedFile, StorageError> {
        let dir = self.root.join(project_id.to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(format!("{}_{}", uuid::Uuid::new_v4(), sanitise_file_name(file_name)));
        let size = bytes.len();
        tokio::fs::write(&path, bytes).await?;

        tracing::debug!(path = %path.display(), size, "upload staged");
        Ok(StagedFile {
            path,
            original_name: file_name.to_string(),
            size,
        })
    }
}

/// Last path component with anything but `[A-Za-z0-9._-]` replaced by `_`.
pub fn sanitise_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

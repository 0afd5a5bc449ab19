//! 对象存储
//!
//! 照片按 bucket 分目录保存。文件系统实现在对象旁边写一份 `.meta.json`，
//! 记录 data URL 中声明的 content type。

use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IngestError, Result};

pub const BUCKET_SNAGS: &str = "snags";
pub const BUCKET_QUOTE_REQUESTS: &str = "quote-requests";
pub const BUCKET_CUSTOMER_UPLOADS: &str = "customer-uploads";

const META_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub content_type: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStorage: Debug + Send + Sync {
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 对象在磁盘上的位置；拒绝绝对路径与 `..`
    pub fn object_path(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let mut full = self.root.join(checked_relative(bucket)?);
        full.push(checked_relative(path)?);
        Ok(full)
    }

    pub async fn read(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.object_path(bucket, path)?).await?)
    }

    pub async fn read_meta(&self, bucket: &str, path: &str) -> Result<ObjectMeta> {
        let raw = tokio::fs::read(meta_path(&self.object_path(bucket, path)?)).await?;
        serde_json::from_slice(&raw).map_err(|e| IngestError::Storage(e.to_string()))
    }
}

fn checked_relative(path: &str) -> Result<&Path> {
    let candidate = Path::new(path);
    let valid = !path.is_empty() && candidate.components().all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(candidate)
    } else {
        Err(IngestError::Storage(format!("invalid object path: {}", path)))
    }
}

fn meta_path(object: &Path) -> PathBuf {
    let mut name = object.as_os_str().to_os_string();
    name.push(META_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let target = self.object_path(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        let meta = ObjectMeta {
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
        };
        let meta = serde_json::to_vec(&meta).map_err(|e| IngestError::Storage(e.to_string()))?;
        tokio::fs::write(meta_path(&target), meta).await?;

        debug!("已写入对象 {}/{} ({} bytes)", bucket, path, bytes.len());
        Ok(())
    }
}

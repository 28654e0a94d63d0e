//! 文件交接服务 - 业务能力层
//!
//! 只负责"告诉下游有新文件"能力，不解析文件内容

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::Artifact;

/// 下游交接
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn handoff(&self, artifact: &Artifact) -> AppResult<()>;
}

/// 追加写入 manifest.jsonl，每个文件一行
pub struct ManifestSink {
    manifest_path: PathBuf,
}

impl ManifestSink {
    pub fn new(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
        }
    }

    /// 放在下载根目录下的 manifest.jsonl
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir.into().join("manifest.jsonl"))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.manifest_path
    }
}

#[async_trait]
impl ArtifactSink for ManifestSink {
    async fn handoff(&self, artifact: &Artifact) -> AppResult<()> {
        debug!(
            "交接文件: {} | {} | {}",
            artifact.account,
            artifact.platform,
            artifact.path.display()
        );

        if let Some(parent) = self.manifest_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::io(parent, e))?;
        }

        let (start, end) = artifact.date_range.compact();
        let line = json!({
            "account": artifact.account,
            "platform": artifact.platform,
            "start": start,
            "end": end,
            "path": artifact.path,
            "handed_at": Local::now().to_rfc3339(),
        });

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.manifest_path)
            .await
            .map_err(|e| AppError::io(&self.manifest_path, e))?;
        file.write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AppError::io(&self.manifest_path, e))?;
        file.flush()
            .await
            .map_err(|e| AppError::io(&self.manifest_path, e))?;

        Ok(())
    }
}

/// 不做任何交接
#[derive(Debug, Default)]
pub struct NoopSink;

#[async_trait]
impl ArtifactSink for NoopSink {
    async fn handoff(&self, _artifact: &Artifact) -> AppResult<()> {
        Ok(())
    }
}

//! 断点存储服务 - 业务能力层
//!
//! 每个批次一个 `<run_id>.json`，先写临时文件再重命名，
//! 中途崩溃也不会留下半截记录。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::BatchRun;

/// 断点存储
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, run: &BatchRun) -> AppResult<()>;
    async fn load(&self, run_id: &str) -> AppResult<BatchRun>;
    /// 最近创建的批次
    async fn latest(&self) -> AppResult<Option<BatchRun>>;
}

/// JSON 文件断点存储
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", run_id))
    }

    async fn read(path: &Path) -> AppResult<BatchRun> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AppError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn save(&self, run: &BatchRun) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::io(&self.dir, e))?;

        let path = self.path_for(&run.run_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(run)?;
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| AppError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| AppError::io(&path, e))?;

        debug!(
            "💾 断点已保存: {} ({}/{} 完成)",
            run.run_id,
            run.completed_count(),
            run.jobs.len()
        );
        Ok(())
    }

    async fn load(&self, run_id: &str) -> AppResult<BatchRun> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Err(AppError::CheckpointNotFound {
                run_id: run_id.to_string(),
            });
        }
        Self::read(&path).await
    }

    async fn latest(&self) -> AppResult<Option<BatchRun>> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::io(&self.dir, e))?;
        let mut latest: Option<BatchRun> = None;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::io(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read(&path).await {
                Ok(run) => {
                    if latest.as_ref().map_or(true, |l| run.created_at > l.created_at) {
                        latest = Some(run);
                    }
                }
                Err(e) => warn!("跳过无法解析的断点文件 {}: {}", path.display(), e),
            }
        }

        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DateRange, Job, RecipeKind};
    use chrono::NaiveDate;

    fn run() -> BatchRun {
        let range = DateRange::single(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        BatchRun::new(vec![Job::new("A", RecipeKind::Promotion, range)], range, 2)
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());
        let run = run();

        store.save(&run).await.unwrap();
        let loaded = store.load(&run.run_id).await.unwrap();
        assert_eq!(loaded.jobs, run.jobs);
        assert_eq!(loaded.resume_from, run.resume_from);
        assert!(!dir.path().join(format!("{}.json.tmp", run.run_id)).exists());
    }

    #[tokio::test]
    async fn missing_run_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());
        let err = store.load("run-19700101-000000").await.unwrap_err();
        assert!(matches!(err, AppError::CheckpointNotFound { .. }));
    }

    #[tokio::test]
    async fn latest_picks_newest_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());
        assert!(store.latest().await.unwrap().is_none());

        let mut older = run();
        older.run_id = "run-older".into();
        older.created_at = older.created_at - chrono::Duration::hours(1);
        let newer = run();
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.run_id, newer.run_id);
    }
}

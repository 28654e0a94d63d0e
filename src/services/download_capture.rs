//! 下载捕获服务 - 业务能力层
//!
//! 只负责"把一次点击触发的下载落到规范路径"，不关心是哪个配方点的

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::infrastructure::PageDriver;
use crate::models::{canonical_filename, Artifact, DateRange, Platform};

/// 期望产出的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedArtifact {
    pub account: String,
    pub platform: Platform,
    pub date_range: DateRange,
}

/// 下载捕获
#[derive(Debug, Clone)]
pub struct DownloadCapture {
    root: PathBuf,
    timeout: Duration,
}

impl DownloadCapture {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    /// 文件最终落盘的位置
    pub fn destination(&self, expected: &ExpectedArtifact) -> PathBuf {
        self.root.join(expected.platform.subdir()).join(canonical_filename(
            expected.platform,
            &expected.account,
            &expected.date_range,
        ))
    }

    /// 先监听下载事件，再执行触发动作，等待下载完成后移动到规范路径。
    /// 同名文件直接覆盖，重复抓取同一天不会产生第二份。
    pub async fn capture<F>(
        &self,
        driver: &dyn PageDriver,
        trigger: F,
        expected: &ExpectedArtifact,
    ) -> AppResult<Artifact>
    where
        F: Future<Output = AppResult<()>>,
    {
        let pending = driver.arm_download().await?;
        trigger.await?;

        let downloaded = tokio::time::timeout(self.timeout, pending)
            .await
            .map_err(|_| AppError::DownloadTimeout {
                platform: expected.platform.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })??;
        debug!(
            "下载完成: {} ({:?})",
            downloaded.path.display(),
            downloaded.suggested_filename
        );

        let dest = self.destination(expected);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::io(parent, e))?;
        }
        persist(&downloaded.path, &dest).await?;

        info!("[账号 {}] 💾 已保存: {}", expected.account, dest.display());
        Ok(Artifact {
            account: expected.account.clone(),
            platform: expected.platform,
            date_range: expected.date_range,
            path: dest,
        })
    }
}

/// 优先重命名，跨文件系统时退回复制
async fn persist(from: &Path, to: &Path) -> AppResult<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| AppError::io(to, e))?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        debug!("清理暂存文件失败 {}: {}", from.display(), e);
    }
    Ok(())
}

//! 浏览器会话 - 业务能力层
//!
//! 一个会话 = 一个账号的隔离浏览器实例：
//! - 登录态来自基线快照的工作副本，从不直接使用基线目录
//! - 同一账号同时最多一个会话（按账号加锁）
//! - 无论成功失败都会关闭；忘记关闭时由 Drop 兜底

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::browser::{launch_profile_browser, LaunchOptions};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{ChromeDriver, PageDriver};
use crate::models::Account;

/// Chrome 运行期锁文件，复制时跳过
const LOCK_FILES: &[&str] = &["SingletonLock", "SingletonCookie", "SingletonSocket", "lockfile"];
const LOCAL_STATE: &str = "Local State";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Opening,
    Ready,
    Closed,
    Failed,
}

/// 已打开的会话
pub struct Session {
    account: Account,
    work_dir: PathBuf,
    status: SessionStatus,
    driver: Arc<dyn PageDriver>,
    lease: Option<OwnedMutexGuard<()>>,
    discard_workspace: bool,
}

impl Session {
    pub fn new(account: Account, work_dir: PathBuf, driver: Arc<dyn PageDriver>) -> Self {
        Self {
            account,
            work_dir,
            status: SessionStatus::Opening,
            driver,
            lease: None,
            discard_workspace: false,
        }
    }

    /// 浏览器已启动，可以开始执行步骤
    pub fn ready(mut self) -> Self {
        self.status = SessionStatus::Ready;
        self
    }

    /// 持有账号锁直到会话关闭
    pub fn with_lease(mut self, lease: OwnedMutexGuard<()>) -> Self {
        self.lease = Some(lease);
        self
    }

    /// 关闭后删除工作副本
    pub fn discard_workspace_on_close(mut self) -> Self {
        self.discard_workspace = true;
        self
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    /// 关闭浏览器并释放账号锁
    pub async fn close(mut self) -> AppResult<()> {
        let result = self.driver.shutdown().await;
        self.status = match result {
            Ok(()) => SessionStatus::Closed,
            Err(_) => SessionStatus::Failed,
        };

        if self.discard_workspace {
            if let Err(e) = tokio::fs::remove_dir_all(&self.work_dir).await {
                warn!("删除工作副本失败 {}: {}", self.work_dir.display(), e);
            }
        }

        info!("[账号 {}] 🔒 会话已关闭", self.account.id());
        self.lease.take();
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if matches!(self.status, SessionStatus::Closed | SessionStatus::Failed) {
            return;
        }
        warn!("[账号 {}] 会话未显式关闭，后台关闭浏览器", self.account.id());
        let driver = Arc::clone(&self.driver);
        // 锁随任务一起移走，浏览器退出后才允许同账号再次打开
        let lease = self.lease.take();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = driver.shutdown().await {
                    warn!("后台关闭浏览器失败: {}", e);
                }
                drop(lease);
            });
        }
    }
}

/// 会话工厂
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, account: &Account) -> AppResult<Session>;
}

/// 账号锁：同一 Profile 同时只允许一个会话
#[derive(Debug, Default)]
pub struct ProfileLeases {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ProfileLeases {
    pub async fn acquire(&self, profile: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(profile.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// 工作副本布局
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    /// 基线快照（已登录的 user-data-dir）
    pub baseline_dir: PathBuf,
    /// 工作副本根目录，每个账号一个子目录
    pub workspace_dir: PathBuf,
    /// 浏览器下载暂存目录
    pub staging_dir: PathBuf,
}

impl WorkspaceLayout {
    pub fn user_data_dir(&self, profile: &str) -> PathBuf {
        self.workspace_dir.join(profile)
    }

    /// 首次使用时从基线复制 `Local State` 与 Profile 目录；已有副本直接复用
    pub async fn materialize(&self, account: &Account) -> AppResult<PathBuf> {
        let profile = account.id();
        let user_data = self.user_data_dir(profile);
        let target_profile = user_data.join(profile);

        if target_profile.is_dir() && user_data.join(LOCAL_STATE).is_file() {
            debug!("[账号 {}] 复用工作副本: {}", profile, user_data.display());
            remove_lock_files(&target_profile).await;
            remove_lock_files(&user_data).await;
            return Ok(user_data);
        }

        let source_profile = self.baseline_dir.join(profile);
        let source_state = self.baseline_dir.join(LOCAL_STATE);
        if !source_profile.is_dir() || !source_state.is_file() {
            return Err(AppError::session_open_failed(
                profile,
                format!(
                    "基线快照缺少登录状态 ({})，请先手动登录该 Profile",
                    source_profile.display()
                ),
            ));
        }

        info!("[账号 {}] 📂 首次使用，复制基线快照...", profile);
        let partial = user_data.join(format!("{}.partial", profile));
        let (from, to, state_to) = (
            source_profile.clone(),
            partial.clone(),
            user_data.join(LOCAL_STATE),
        );
        tokio::task::spawn_blocking(move || -> AppResult<()> {
            if to.exists() {
                std::fs::remove_dir_all(&to).map_err(|e| AppError::io(&to, e))?;
            }
            copy_dir(&from, &to)?;
            std::fs::copy(&source_state, &state_to).map_err(|e| AppError::io(&state_to, e))?;
            Ok(())
        })
        .await
        .map_err(|e| AppError::session_open_failed(profile, e.to_string()))??;

        tokio::fs::rename(&partial, &target_profile)
            .await
            .map_err(|e| AppError::io(&target_profile, e))?;
        Ok(user_data)
    }
}

fn copy_dir(from: &Path, to: &Path) -> AppResult<()> {
    std::fs::create_dir_all(to).map_err(|e| AppError::io(to, e))?;
    for entry in std::fs::read_dir(from).map_err(|e| AppError::io(from, e))? {
        let entry = entry.map_err(|e| AppError::io(from, e))?;
        let name = entry.file_name();
        if LOCK_FILES.iter().any(|l| name == *l) {
            continue;
        }
        let src = entry.path();
        let dst = to.join(&name);
        let file_type = entry.file_type().map_err(|e| AppError::io(&src, e))?;
        if file_type.is_dir() {
            copy_dir(&src, &dst)?;
        } else if file_type.is_file() {
            std::fs::copy(&src, &dst).map_err(|e| AppError::io(&dst, e))?;
        }
    }
    Ok(())
}

async fn remove_lock_files(dir: &Path) {
    for name in LOCK_FILES {
        let path = dir.join(name);
        if tokio::fs::symlink_metadata(&path).await.is_ok() {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                debug!("删除锁文件失败 {}: {}", path.display(), e);
            }
        }
    }
}

/// 基于本地 Chrome 的会话工厂
pub struct ChromeSessionFactory {
    layout: WorkspaceLayout,
    headless: bool,
    executable: Option<PathBuf>,
    keep_workspace: bool,
    leases: ProfileLeases,
}

impl ChromeSessionFactory {
    pub fn new(layout: WorkspaceLayout) -> Self {
        Self {
            layout,
            headless: false,
            executable: None,
            keep_workspace: true,
            leases: ProfileLeases::default(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        let mut factory = Self::new(WorkspaceLayout {
            baseline_dir: config.baseline_profile_dir.clone(),
            workspace_dir: config.workspace_dir.clone(),
            staging_dir: config.download_dir.join(".staging"),
        });
        factory.headless = config.headless;
        factory.executable = config.chrome_executable.clone();
        factory.keep_workspace = config.keep_workspace;
        factory
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    async fn open(&self, account: &Account) -> AppResult<Session> {
        let profile = account.id();
        let lease = self.leases.acquire(profile).await;

        let user_data = self.layout.materialize(account).await?;
        let staging = self.layout.staging_dir.join(profile);
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| AppError::io(&staging, e))?;

        let (browser, handler, page) = launch_profile_browser(LaunchOptions {
            user_data_dir: &user_data,
            profile,
            staging_dir: &staging,
            headless: self.headless,
            executable: self.executable.as_deref(),
        })
        .await
        .map_err(|e| AppError::session_open_failed(profile, e.to_string()))?;

        let driver: Arc<dyn PageDriver> = Arc::new(ChromeDriver::new(browser, handler, page, staging));
        let mut session = Session::new(account.clone(), user_data, driver).with_lease(lease);
        if !self.keep_workspace {
            session = session.discard_workspace_on_close();
        }
        let session = session.ready();
        debug!("[账号 {}] 会话状态: {:?}", profile, session.status());
        info!("[账号 {}] 🔓 会话已就绪 ({})", profile, account.brand);
        Ok(session)
    }
}

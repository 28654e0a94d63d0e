#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;

use portal_extract::error::{AppError, AppResult, BrowserError};
use portal_extract::infrastructure::{
    DownloadedFile, ElementAction, ElementRef, FramePath, Locator, PageDriver, PendingDownload,
};
use portal_extract::models::{Account, AccountRegistry, Job, JobId, Platform};
use portal_extract::recipes::RecipeSource;
use portal_extract::services::{Session, SessionFactory};
use portal_extract::workflow::{Action, Condition, ExtractionRecipe, NavigationStep, StepPolicy};

pub const HOME_URL: &str = "https://ecom.meituan.com/meishi/";

/// 测试用的极短超时
pub fn fast_policy() -> StepPolicy {
    StepPolicy {
        max_attempts: 3,
        locate_timeout: Duration::from_millis(10),
        verify_timeout: Duration::from_millis(10),
        backoff: Duration::from_millis(1),
        poll_interval: Duration::from_millis(2),
    }
}

pub fn key(locator: &Locator) -> String {
    locator.to_string()
}

/// 按脚本响应的页面驱动
///
/// 页面上"存在"的元素用定位器的字符串表示，点击可以让新元素出现。
#[derive(Default)]
pub struct ScriptedDriver {
    present: Mutex<HashSet<String>>,
    perform_failures: Mutex<HashMap<String, u32>>,
    resolve_failures: Mutex<HashMap<String, u32>>,
    pub resolve_calls: Mutex<HashMap<String, usize>>,
    reveal_on_click: Mutex<HashMap<String, Vec<String>>>,
    reveal_on_navigate: Mutex<Vec<String>>,
    pub performed: Mutex<Vec<String>>,
    pub navigations: Mutex<Vec<String>>,
    pub screenshots: Mutex<Vec<PathBuf>>,
    download_dir: Mutex<Option<PathBuf>>,
    download_blocked: AtomicBool,
    download_seq: AtomicU64,
    pub shutdowns: AtomicUsize,
    live: Mutex<Option<Arc<AtomicUsize>>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, locator: &Locator) -> &Self {
        self.present.lock().unwrap().insert(key(locator));
        self
    }

    pub fn hide(&self, locator: &Locator) -> &Self {
        self.present.lock().unwrap().remove(&key(locator));
        self
    }

    /// 前 n 次动作失败
    pub fn fail_perform(&self, locator: &Locator, times: u32) -> &Self {
        self.perform_failures
            .lock()
            .unwrap()
            .insert(key(locator), times);
        self
    }

    /// 前 n 次定位报错（模拟执行上下文被销毁）
    pub fn fail_resolve(&self, locator: &Locator, times: u32) -> &Self {
        self.resolve_failures
            .lock()
            .unwrap()
            .insert(key(locator), times);
        self
    }

    pub fn resolve_count(&self, locator: &Locator) -> usize {
        self.resolve_calls
            .lock()
            .unwrap()
            .get(&key(locator))
            .copied()
            .unwrap_or(0)
    }

    pub fn reveal_on_click(&self, clicked: &Locator, revealed: &Locator) -> &Self {
        self.reveal_on_click
            .lock()
            .unwrap()
            .entry(key(clicked))
            .or_default()
            .push(key(revealed));
        self
    }

    pub fn reveal_on_navigate(&self, revealed: &Locator) -> &Self {
        self.reveal_on_navigate.lock().unwrap().push(key(revealed));
        self
    }

    pub fn serve_downloads_from(&self, dir: &Path) -> &Self {
        *self.download_dir.lock().unwrap() = Some(dir.to_path_buf());
        self
    }

    pub fn block_downloads(&self) -> &Self {
        self.download_blocked.store(true, Ordering::SeqCst);
        self
    }

    pub fn track_live(&self, live: Arc<AtomicUsize>) {
        *self.live.lock().unwrap() = Some(live);
    }

    pub fn performed_count(&self, locator: &Locator) -> usize {
        let k = key(locator);
        self.performed
            .lock()
            .unwrap()
            .iter()
            .filter(|p| **p == k)
            .count()
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        self.navigations.lock().unwrap().push(url.to_string());
        let revealed: Vec<String> = self.reveal_on_navigate.lock().unwrap().clone();
        self.present.lock().unwrap().extend(revealed);
        Ok(())
    }

    async fn reload(&self) -> AppResult<()> {
        self.navigations.lock().unwrap().push("reload".to_string());
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> AppResult<()> {
        Ok(())
    }

    async fn resolve(&self, frame: &FramePath, locator: &Locator) -> AppResult<Option<ElementRef>> {
        let k = key(locator);
        *self.resolve_calls.lock().unwrap().entry(k.clone()).or_default() += 1;
        {
            let mut failures = self.resolve_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&k) {
                if *left > 0 {
                    *left -= 1;
                    return Err(BrowserError::StaleElement("context destroyed".into()).into());
                }
            }
        }
        if self.present.lock().unwrap().contains(&k) {
            Ok(Some(ElementRef {
                frame: frame.clone(),
                token: k,
                matches: 1,
            }))
        } else {
            Ok(None)
        }
    }

    async fn perform(&self, element: &ElementRef, _action: &ElementAction) -> AppResult<()> {
        {
            let mut failures = self.perform_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&element.token) {
                if *left > 0 {
                    *left -= 1;
                    return Err(BrowserError::StaleElement(element.token.clone()).into());
                }
            }
        }
        self.performed.lock().unwrap().push(element.token.clone());
        let revealed = self
            .reveal_on_click
            .lock()
            .unwrap()
            .get(&element.token)
            .cloned()
            .unwrap_or_default();
        self.present.lock().unwrap().extend(revealed);
        Ok(())
    }

    async fn arm_download(&self) -> AppResult<PendingDownload> {
        if self.download_blocked.load(Ordering::SeqCst) {
            return Ok(futures::future::pending().boxed());
        }
        let dir = self
            .download_dir
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Other("未配置下载目录".into()))?;
        let seq = self.download_seq.fetch_add(1, Ordering::SeqCst);
        Ok(async move {
            let path = dir.join(format!("guid-{}", seq));
            tokio::fs::write(&path, format!("report {}", seq))
                .await
                .map_err(|e| AppError::io(&path, e))?;
            Ok(DownloadedFile {
                path,
                suggested_filename: Some("report.xlsx".into()),
            })
        }
        .boxed())
    }

    async fn screenshot(&self, path: &Path) -> AppResult<()> {
        self.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn shutdown(&self) -> AppResult<()> {
        if self.shutdowns.fetch_add(1, Ordering::SeqCst) == 0 {
            if let Some(live) = self.live.lock().unwrap().as_ref() {
                live.fetch_sub(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }
}

/// 记录打开次数和同时存活会话数的会话工厂
#[derive(Default)]
pub struct MockSessionFactory {
    pub opens: Mutex<HashMap<String, usize>>,
    pub live: Arc<AtomicUsize>,
    pub max_live: AtomicUsize,
    pub fail_accounts: Mutex<HashSet<String>>,
    pub drivers: Mutex<Vec<Arc<ScriptedDriver>>>,
    download_dir: Option<PathBuf>,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_downloads(dir: &Path) -> Self {
        Self {
            download_dir: Some(dir.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn fail_account(&self, account: &str) {
        self.fail_accounts.lock().unwrap().insert(account.to_string());
    }

    pub fn opens_for(&self, account: &str) -> usize {
        self.opens.lock().unwrap().get(account).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.opens.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn open(&self, account: &Account) -> AppResult<Session> {
        *self
            .opens
            .lock()
            .unwrap()
            .entry(account.id().to_string())
            .or_default() += 1;

        if self.fail_accounts.lock().unwrap().contains(account.id()) {
            return Err(AppError::session_open_failed(account.id(), "基线快照缺少登录状态"));
        }

        let driver = Arc::new(ScriptedDriver::new());
        driver.show(&ok_locator());
        if let Some(dir) = &self.download_dir {
            driver.serve_downloads_from(dir);
            driver.show(&download_locator());
        }
        let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(now, Ordering::SeqCst);
        driver.track_live(Arc::clone(&self.live));
        self.drivers.lock().unwrap().push(Arc::clone(&driver));

        let page: Arc<dyn PageDriver> = driver;
        Ok(Session::new(
            account.clone(),
            PathBuf::from(format!("workspace/{}", account.id())),
            page,
        )
        .ready())
    }
}

pub fn ok_locator() -> Locator {
    Locator::text("确定")
}

pub fn missing_locator() -> Locator {
    Locator::text("不存在的按钮")
}

pub fn download_locator() -> Locator {
    Locator::text("下载")
}

/// 按任务 ID 决定成败的配方
#[derive(Default)]
pub struct ScriptedRecipes {
    pub failing: Mutex<HashSet<JobId>>,
    pub fatal: Mutex<HashSet<JobId>>,
    pub stalled: Mutex<HashSet<JobId>>,
    pub pause: Duration,
    pub download: bool,
    pub max_recoveries: u32,
}

impl ScriptedRecipes {
    pub fn new(pause: Duration) -> Self {
        Self {
            pause,
            ..Self::default()
        }
    }

    pub fn fail(&self, job_id: &JobId) {
        self.failing.lock().unwrap().insert(job_id.clone());
    }

    /// 该任务遇到登录页，步骤判定为不可恢复
    pub fn fail_fatally(&self, job_id: &JobId) {
        self.fatal.lock().unwrap().insert(job_id.clone());
    }

    /// 该任务卡住，只能靠取消结束
    pub fn stall(&self, job_id: &JobId) {
        self.stalled.lock().unwrap().insert(job_id.clone());
    }
}

impl RecipeSource for ScriptedRecipes {
    fn recipe_for(&self, job: &Job, _account: &Account) -> AppResult<ExtractionRecipe> {
        let policy = StepPolicy {
            max_attempts: 1,
            ..fast_policy()
        };
        let target = if self.failing.lock().unwrap().contains(&job.id) {
            missing_locator()
        } else {
            ok_locator()
        };

        let mut confirm = NavigationStep::click("点击确定").with_policy(policy).locate(target);
        if self.fatal.lock().unwrap().contains(&job.id) {
            confirm = confirm.abort_if(Condition::visible(FramePath::main(), ok_locator()));
        }

        let pause = if self.stalled.lock().unwrap().contains(&job.id) {
            Duration::from_secs(30)
        } else {
            self.pause
        };

        let mut recipe = ExtractionRecipe::new(format!("scripted {}", job.id))
            .step(NavigationStep::new("等待", Action::Pause(pause)).with_policy(policy))
            .step(confirm)
            .recovery(
                vec![NavigationStep::new("重新打开首页", Action::Navigate(HOME_URL.into()))
                    .with_policy(policy)],
                self.max_recoveries,
            );
        if self.download {
            recipe = recipe.step(
                NavigationStep::new("下载", Action::Download(Platform::Operation))
                    .with_policy(policy)
                    .locate(download_locator()),
            );
        }
        Ok(recipe)
    }
}

pub fn account(profile: &str, brand: &str, cpc: bool) -> Account {
    Account {
        profile: profile.into(),
        brand: brand.into(),
        cpc,
        operation: true,
    }
}

pub fn registry(accounts: Vec<Account>) -> Arc<AccountRegistry> {
    Arc::new(AccountRegistry::new(accounts).unwrap())
}

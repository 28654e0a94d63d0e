use std::path::Path;

use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult, BrowserError};

/// 启动参数
#[derive(Debug, Clone, Copy)]
pub struct LaunchOptions<'a> {
    /// 工作副本（user-data-dir）
    pub user_data_dir: &'a Path,
    /// Profile 子目录名
    pub profile: &'a str,
    /// 浏览器下载的暂存目录
    pub staging_dir: &'a Path,
    pub headless: bool,
    pub executable: Option<&'a Path>,
}

/// 以持久化用户目录启动浏览器（免扫码），返回 (浏览器, 事件循环任务, 页面)
pub async fn launch_profile_browser(
    opts: LaunchOptions<'_>,
) -> AppResult<(Browser, JoinHandle<()>, Page)> {
    info!("🚀 启动浏览器 [{}]", opts.profile);
    debug!("用户目录: {}", opts.user_data_dir.display());

    let mut builder = BrowserConfig::builder()
        .user_data_dir(opts.user_data_dir)
        .viewport(None)
        .args(vec![
            format!("--profile-directory={}", opts.profile),
            "--disable-infobars".to_string(),
            "--no-first-run".to_string(),
            // 嵌套 iframe 需要与主页面同进程，才能拿到各 frame 的执行上下文
            "--disable-features=IsolateOrigins,site-per-process".to_string(),
        ]);
    builder = if opts.headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(exe) = opts.executable {
        builder = builder.chrome_executable(exe);
    }

    let config = builder.build().map_err(|e| {
        error!("配置浏览器失败: {}", e);
        AppError::from(BrowserError::ConfigurationFailed(e))
    })?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败 [{}]: {}", opts.profile, e);
        AppError::launch_failed(opts.profile, e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler_task = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 下载交给浏览器按 guid 写入暂存目录，并开启下载事件
    let behavior = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::AllowAndName)
        .download_path(opts.staging_dir.to_string_lossy().to_string())
        .events_enabled(true)
        .build()
        .map_err(BrowserError::ConfigurationFailed)?;
    browser.execute(behavior).await?;

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let page = match browser.pages().await?.into_iter().next() {
        Some(page) => page,
        None => browser.new_page("about:blank").await.map_err(|e| {
            error!("创建页面失败: {}", e);
            e
        })?,
    };

    info!("✅ 浏览器已就绪 [{}]", opts.profile);
    Ok((browser, handler_task, page))
}

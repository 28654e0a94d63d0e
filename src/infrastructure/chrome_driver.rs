//! Chrome 页面驱动 - 基础设施层
//!
//! 持有唯一的浏览器与页面资源，通过在各 frame 执行上下文中求值脚本完成定位和动作

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::FrameId;
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser::script;
use crate::error::{AppError, AppResult, BrowserError};
use crate::infrastructure::driver::{
    DownloadedFile, ElementAction, ElementRef, PageDriver, PendingDownload,
};
use crate::infrastructure::locator::{FrameHop, FramePath, Locator};

/// Chrome 页面驱动
pub struct ChromeDriver {
    browser: Mutex<Option<Browser>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    page: Page,
    staging_dir: PathBuf,
    seq: AtomicU64,
}

impl ChromeDriver {
    pub fn new(browser: Browser, handler: JoinHandle<()>, page: Page, staging_dir: PathBuf) -> Self {
        Self {
            browser: Mutex::new(Some(browser)),
            handler: std::sync::Mutex::new(Some(handler)),
            page,
            staging_dir,
            seq: AtomicU64::new(0),
        }
    }

    fn next_token(&self) -> String {
        format!("pe-{}", self.seq.fetch_add(1, Ordering::Relaxed))
    }

    /// 沿 iframe 路径找到目标 frame 的执行上下文，主 frame 返回 None
    async fn frame_context(&self, path: &FramePath) -> AppResult<Option<ExecutionContextId>> {
        if path.is_main() {
            return Ok(None);
        }

        let not_found = || AppError::from(BrowserError::FrameNotFound(path.to_string()));
        let mut current = self.page.mainframe().await?.ok_or_else(not_found)?;
        let frames = self.page.frames().await?;

        for hop in path.hops() {
            let children = self.child_frames(&frames, &current).await?;
            let next = match hop {
                FrameHop::Child(index) => children.get(*index).cloned(),
                FrameHop::UrlContains(fragment) => {
                    let mut found = None;
                    for id in children {
                        let url = self.page.frame_url(id.clone()).await?.unwrap_or_default();
                        if url.contains(fragment.as_str()) {
                            found = Some(id);
                            break;
                        }
                    }
                    found
                }
            };
            current = next.ok_or_else(not_found)?;
        }

        let context = self
            .page
            .frame_execution_context(current)
            .await?
            .ok_or_else(not_found)?;
        Ok(Some(context))
    }

    async fn child_frames(&self, frames: &[FrameId], parent: &FrameId) -> AppResult<Vec<FrameId>> {
        let mut children = Vec::new();
        for id in frames {
            if self.page.frame_parent(id.clone()).await?.as_ref() == Some(parent) {
                children.push(id.clone());
            }
        }
        Ok(children)
    }

    /// 在指定执行上下文中执行 JS 并返回 JSON 结果
    async fn eval_in(&self, context: Option<ExecutionContextId>, js: String) -> AppResult<JsonValue> {
        let result = match context {
            None => self.page.evaluate(js).await?,
            Some(id) => {
                let params = EvaluateParams::builder()
                    .expression(js)
                    .context_id(id)
                    .await_promise(true)
                    .return_by_value(true)
                    .build()
                    .map_err(BrowserError::ConfigurationFailed)?;
                self.page.evaluate_expression(params).await?
            }
        };
        Ok(result.into_value::<JsonValue>()?)
    }
}

fn virtual_key_code(key: &str) -> Option<i64> {
    match key {
        "Enter" => Some(13),
        "Escape" => Some(27),
        "PageUp" => Some(33),
        "PageDown" => Some(34),
        "End" => Some(35),
        "Home" => Some(36),
        _ => None,
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url).await.map_err(|e| {
            AppError::from(BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;
        Ok(())
    }

    async fn reload(&self) -> AppResult<()> {
        self.page.reload().await?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> AppResult<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let mut builder = DispatchKeyEventParams::builder().r#type(kind).key(key).code(key);
            if let Some(code) = virtual_key_code(key) {
                builder = builder.windows_virtual_key_code(code);
            }
            let params = builder.build().map_err(BrowserError::ConfigurationFailed)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    async fn resolve(&self, frame: &FramePath, locator: &Locator) -> AppResult<Option<ElementRef>> {
        // iframe 尚未加载视为未命中，由调用方继续轮询
        let context = match self.frame_context(frame).await {
            Ok(context) => context,
            Err(AppError::Browser(BrowserError::FrameNotFound(path))) => {
                debug!("iframe 未就绪: {}", path);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let token = self.next_token();
        let js = script::resolve_script(locator, &token)?;
        let matches = self.eval_in(context, js).await?.as_u64().unwrap_or(0) as usize;
        if matches == 0 {
            return Ok(None);
        }

        Ok(Some(ElementRef {
            frame: frame.clone(),
            token,
            matches,
        }))
    }

    async fn perform(&self, element: &ElementRef, action: &ElementAction) -> AppResult<()> {
        let context = self.frame_context(&element.frame).await?;
        let js = script::perform_script(action, &element.token)?;
        self.eval_in(context, js).await.map_err(|e| match e {
            AppError::Browser(BrowserError::Cdp(cdp)) => {
                AppError::from(BrowserError::StaleElement(cdp.to_string()))
            }
            other => other,
        })?;
        Ok(())
    }

    async fn arm_download(&self) -> AppResult<PendingDownload> {
        let (mut begins, mut progress) = {
            let guard = self.browser.lock().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| AppError::Other("浏览器已关闭".to_string()))?;
            (
                browser.event_listener::<EventDownloadWillBegin>().await?,
                browser.event_listener::<EventDownloadProgress>().await?,
            )
        };
        let staging = self.staging_dir.clone();

        Ok(Box::pin(async move {
            let closed = || AppError::from(BrowserError::DownloadCanceled("下载事件流已关闭".to_string()));
            let begin = begins.next().await.ok_or_else(closed)?;
            let guid = begin.guid.clone();
            let suggested = begin.suggested_filename.clone();
            debug!("开始下载: {} ({})", suggested, guid);

            while let Some(event) = progress.next().await {
                if event.guid != guid {
                    continue;
                }
                match event.state {
                    DownloadProgressState::Completed => {
                        return Ok(DownloadedFile {
                            path: staging.join(&guid),
                            suggested_filename: Some(suggested),
                        });
                    }
                    DownloadProgressState::Canceled => {
                        return Err(BrowserError::DownloadCanceled(suggested).into());
                    }
                    DownloadProgressState::InProgress => {}
                }
            }
            Err(closed())
        }))
    }

    async fn screenshot(&self, path: &Path) -> AppResult<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page.save_screenshot(params, path).await?;
        Ok(())
    }

    async fn shutdown(&self) -> AppResult<()> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("等待浏览器退出失败: {}", e);
            }
        }
        let handler = self
            .handler
            .lock()
            .map_err(|_| AppError::Other("handler 锁已损坏".to_string()))?
            .take();
        if let Some(handler) = handler {
            handler.abort();
        }
        Ok(())
    }
}

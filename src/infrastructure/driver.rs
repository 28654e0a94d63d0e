//! 页面驱动接口 - 基础设施层
//!
//! 流程层只依赖这个 trait，不直接接触 chromiumoxide，
//! 测试里用脚本化的假驱动替换真实浏览器。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::infrastructure::locator::{FramePath, Locator};

/// 已定位元素的引用
///
/// 元素在页面内被打上一次性标记，后续动作按标记重新取回
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub frame: FramePath,
    pub token: String,
    /// 命中的元素数量
    pub matches: usize,
}

/// 作用于已定位元素的动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ElementAction {
    Click,
    /// 依次点击全部命中元素，可限制数量
    ClickAll(Option<usize>),
    Fill(String),
    Check,
    Uncheck,
}

/// 浏览器已写完的下载文件（尚未规范命名）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub suggested_filename: Option<String>,
}

/// 已挂好监听、等待完成的下载
pub type PendingDownload = BoxFuture<'static, AppResult<DownloadedFile>>;

/// 页面驱动
///
/// 职责：
/// - 持有唯一的页面资源
/// - 暴露定位、动作、导航、下载监听能力
/// - 不认识账号 / 配方
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 导航到 URL 并等待加载
    async fn navigate(&self, url: &str) -> AppResult<()>;

    /// 刷新当前页面
    async fn reload(&self) -> AppResult<()>;

    /// 向页面发送按键
    async fn press_key(&self, key: &str) -> AppResult<()>;

    /// 在指定 frame 中查找可见元素，未命中返回 None
    async fn resolve(&self, frame: &FramePath, locator: &Locator) -> AppResult<Option<ElementRef>>;

    /// 对已定位元素执行动作
    async fn perform(&self, element: &ElementRef, action: &ElementAction) -> AppResult<()>;

    /// 注册对下一次下载的监听；必须在触发动作之前调用
    async fn arm_download(&self) -> AppResult<PendingDownload>;

    /// 保存截图
    async fn screenshot(&self, path: &Path) -> AppResult<()>;

    /// 关闭浏览器，释放资源
    async fn shutdown(&self) -> AppResult<()>;
}

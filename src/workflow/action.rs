//! 步骤动作与后置条件

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::{ElementAction, FramePath, Locator, PageDriver};
use crate::models::Platform;

/// 步骤动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    /// 点击所有命中元素（可限制数量）
    ClickAll(Option<usize>),
    Fill(String),
    Check,
    Uncheck,
    /// 点击并捕获触发的下载
    Download(Platform),
    Navigate(String),
    Reload,
    PressKey(String),
    Pause(Duration),
}

impl Action {
    /// 是否需要先定位元素
    pub fn needs_element(&self) -> bool {
        self.element_action().is_some()
    }

    /// 对应的元素动作
    pub fn element_action(&self) -> Option<ElementAction> {
        match self {
            Action::Click | Action::Download(_) => Some(ElementAction::Click),
            Action::ClickAll(limit) => Some(ElementAction::ClickAll(*limit)),
            Action::Fill(text) => Some(ElementAction::Fill(text.clone())),
            Action::Check => Some(ElementAction::Check),
            Action::Uncheck => Some(ElementAction::Uncheck),
            Action::Navigate(_) | Action::Reload | Action::PressKey(_) | Action::Pause(_) => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click => f.write_str("点击"),
            Action::ClickAll(_) => f.write_str("全部点击"),
            Action::Fill(text) => write!(f, "填写 \"{}\"", text),
            Action::Check => f.write_str("勾选"),
            Action::Uncheck => f.write_str("取消勾选"),
            Action::Download(platform) => write!(f, "下载 {}", platform),
            Action::Navigate(url) => write!(f, "打开 {}", url),
            Action::Reload => f.write_str("刷新"),
            Action::PressKey(key) => write!(f, "按键 {}", key),
            Action::Pause(d) => write!(f, "等待 {}ms", d.as_millis()),
        }
    }
}

/// 后置条件 / 异常页面判断
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Always,
    Visible { frame: FramePath, locator: Locator },
    Absent { frame: FramePath, locator: Locator },
    All(Vec<Condition>),
}

impl Condition {
    pub fn visible(frame: FramePath, locator: Locator) -> Self {
        Condition::Visible { frame, locator }
    }

    pub fn absent(frame: FramePath, locator: Locator) -> Self {
        Condition::Absent { frame, locator }
    }

    /// 立即判断一次
    pub async fn holds(&self, driver: &dyn PageDriver) -> AppResult<bool> {
        for leaf in self.leaves() {
            let ok = match leaf {
                Condition::Visible { frame, locator } => driver.resolve(frame, locator).await?.is_some(),
                Condition::Absent { frame, locator } => driver.resolve(frame, locator).await?.is_none(),
                Condition::Always | Condition::All(_) => true,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 展开嵌套的 All
    fn leaves(&self) -> Vec<&Condition> {
        match self {
            Condition::All(conditions) => conditions.iter().flat_map(|c| c.leaves()).collect(),
            other => vec![other],
        }
    }

    /// 在超时内轮询，满足即返回 true
    pub async fn wait_until(
        &self,
        driver: &dyn PageDriver,
        timeout: Duration,
        poll: Duration,
    ) -> AppResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            // 点击后 frame 的执行上下文常被销毁，出错视为尚未满足
            match self.holds(driver).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => debug!("条件判断出错 {}: {}", self, e),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(poll).await;
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => f.write_str("无"),
            Condition::Visible { frame, locator } => write!(f, "可见 {} @ {}", locator, frame),
            Condition::Absent { frame, locator } => write!(f, "消失 {} @ {}", locator, frame),
            Condition::All(conditions) => {
                let parts: Vec<String> = conditions.iter().map(|c| c.to_string()).collect();
                write!(f, "全部({})", parts.join("; "))
            }
        }
    }
}

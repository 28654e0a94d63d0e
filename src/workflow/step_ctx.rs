//! 步骤执行上下文
//!
//! 封装"我正在替哪个账号、抓哪段日期"这一信息，以及执行步骤所需的能力

use std::fmt::Display;

use crate::infrastructure::PageDriver;
use crate::models::DateRange;
use crate::services::DownloadCapture;

/// 步骤执行上下文
pub struct StepContext<'a> {
    /// 当前会话的页面驱动
    pub driver: &'a dyn PageDriver,
    /// 下载捕获
    pub capture: &'a DownloadCapture,
    /// 账号 ID（Profile 名）
    pub account: &'a str,
    /// 下载日期范围
    pub date_range: DateRange,
}

impl<'a> StepContext<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        capture: &'a DownloadCapture,
        account: &'a str,
        date_range: DateRange,
    ) -> Self {
        Self {
            driver,
            capture,
            account,
            date_range,
        }
    }
}

impl Display for StepContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[账号 {}]", self.account)
    }
}

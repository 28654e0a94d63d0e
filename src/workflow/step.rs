//! 导航步骤 - 流程层
//!
//! 一个步骤 = 定位（多策略兜底） → 动作 → 后置条件校验，
//! 失败后按退避重试，直到达到最大尝试次数。

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::infrastructure::{ElementRef, FramePath, Locator};
use crate::models::Artifact;
use crate::services::ExpectedArtifact;
use crate::workflow::action::{Action, Condition};
use crate::workflow::step_ctx::StepContext;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPolicy {
    /// 最大尝试次数（至少 1 次）
    pub max_attempts: u32,
    /// 单个定位策略的等待时间
    pub locate_timeout: Duration,
    /// 后置条件的等待时间
    pub verify_timeout: Duration,
    /// 两次尝试之间的退避
    pub backoff: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
}

impl Default for StepPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            locate_timeout: Duration::from_millis(3000),
            verify_timeout: Duration::from_millis(5000),
            backoff: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// 步骤结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    /// 重试耗尽，可由配方恢复
    RetriableFailure(String),
    /// 页面处于无法恢复的状态（如登录失效），直接终止配方
    FatalFailure(String),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

/// 一次步骤执行的记录
#[derive(Debug, Clone)]
pub struct StepRun {
    pub outcome: StepOutcome,
    /// 实际尝试次数
    pub attempts: u32,
    /// 下载步骤产出的文件
    pub artifact: Option<Artifact>,
}

/// 导航步骤
#[derive(Debug, Clone)]
pub struct NavigationStep {
    pub name: String,
    pub frame: FramePath,
    /// 按顺序尝试的定位策略
    pub locators: Vec<Locator>,
    pub action: Action,
    pub post_condition: Condition,
    /// 命中即判定为不可恢复
    pub abort_if: Option<Condition>,
    /// 可选步骤失败后跳过
    pub optional: bool,
    /// 恢复后从最近的检查点重新开始
    pub checkpoint: bool,
    pub policy: StepPolicy,
}

impl NavigationStep {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            frame: FramePath::main(),
            locators: Vec::new(),
            action,
            post_condition: Condition::Always,
            abort_if: None,
            optional: false,
            checkpoint: false,
            policy: StepPolicy::default(),
        }
    }

    pub fn click(name: impl Into<String>) -> Self {
        Self::new(name, Action::Click)
    }

    pub fn in_frame(mut self, frame: FramePath) -> Self {
        self.frame = frame;
        self
    }

    /// 追加一个定位策略
    pub fn locate(mut self, locator: Locator) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn expect(mut self, condition: Condition) -> Self {
        self.post_condition = condition;
        self
    }

    pub fn abort_if(mut self, condition: Condition) -> Self {
        self.abort_if = Some(condition);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn checkpoint(mut self) -> Self {
        self.checkpoint = true;
        self
    }

    pub fn with_policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    pub fn locate_timeout(mut self, timeout: Duration) -> Self {
        self.policy.locate_timeout = timeout;
        self
    }

    pub fn verify_timeout(mut self, timeout: Duration) -> Self {
        self.policy.verify_timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.policy.backoff = backoff;
        self
    }

    /// 执行步骤（含重试）
    pub async fn run(&self, ctx: &StepContext<'_>) -> StepRun {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            if let Some(guard) = &self.abort_if {
                match guard.holds(ctx.driver).await {
                    Ok(true) => {
                        warn!("{} ⛔ [{}] 页面异常: {}", ctx, self.name, guard);
                        return StepRun {
                            outcome: StepOutcome::FatalFailure(format!("页面异常: {}", guard)),
                            attempts: attempt,
                            artifact: None,
                        };
                    }
                    Ok(false) => {}
                    Err(e) => debug!("{} 异常页面检测失败: {}", ctx, e),
                }
            }

            match self.attempt(ctx).await {
                Ok(artifact) => {
                    if attempt > 1 {
                        info!("{} ✓ [{}] 第 {} 次尝试成功", ctx, self.name, attempt);
                    } else {
                        debug!("{} ✓ [{}]", ctx, self.name);
                    }
                    return StepRun {
                        outcome: StepOutcome::Success,
                        attempts: attempt,
                        artifact,
                    };
                }
                Err(reason) => {
                    warn!(
                        "{} [{}] 第 {}/{} 次尝试失败: {}",
                        ctx, self.name, attempt, max_attempts, reason
                    );
                    last_reason = reason;
                }
            }

            if attempt < max_attempts {
                sleep(self.policy.backoff).await;
            }
        }

        StepRun {
            outcome: StepOutcome::RetriableFailure(last_reason),
            attempts: max_attempts,
            artifact: None,
        }
    }

    async fn attempt(&self, ctx: &StepContext<'_>) -> Result<Option<Artifact>, String> {
        let element = match self.action.needs_element() {
            true => Some(self.find_element(ctx).await?),
            false => None,
        };

        let artifact = self
            .act(ctx, element.as_ref())
            .await
            .map_err(|e| format!("{}失败: {}", self.action, e))?;

        let verified = self
            .post_condition
            .wait_until(ctx.driver, self.policy.verify_timeout, self.policy.poll_interval)
            .await
            .map_err(|e| format!("校验失败: {}", e))?;
        if !verified {
            return Err(format!("后置条件未满足: {}", self.post_condition));
        }

        Ok(artifact)
    }

    /// 依次尝试每个定位策略，每个策略在超时内轮询
    async fn find_element(&self, ctx: &StepContext<'_>) -> Result<ElementRef, String> {
        if self.locators.is_empty() {
            return Err("未配置定位策略".to_string());
        }

        for locator in &self.locators {
            let deadline = Instant::now() + self.policy.locate_timeout;
            loop {
                match ctx.driver.resolve(&self.frame, locator).await {
                    Ok(Some(element)) => {
                        debug!("{} 定位成功: {} ({} 个)", ctx, locator, element.matches);
                        return Ok(element);
                    }
                    Ok(None) => {}
                    Err(e) => debug!("{} 定位出错 {}: {}", ctx, locator, e),
                }
                if Instant::now() >= deadline {
                    break;
                }
                sleep(self.policy.poll_interval).await;
            }
            debug!("{} 策略未命中: {}", ctx, locator);
        }

        Err(format!("未找到元素 @ {}", self.frame))
    }

    async fn act(
        &self,
        ctx: &StepContext<'_>,
        element: Option<&ElementRef>,
    ) -> crate::error::AppResult<Option<Artifact>> {
        match (&self.action, element) {
            (Action::Navigate(url), _) => ctx.driver.navigate(url).await?,
            (Action::Reload, _) => ctx.driver.reload().await?,
            (Action::PressKey(key), _) => ctx.driver.press_key(key).await?,
            (Action::Pause(duration), _) => sleep(*duration).await,
            (Action::Download(platform), Some(element)) => {
                let expected = ExpectedArtifact {
                    account: ctx.account.to_string(),
                    platform: *platform,
                    date_range: ctx.date_range,
                };
                let trigger = ctx
                    .driver
                    .perform(element, &crate::infrastructure::ElementAction::Click);
                let artifact = ctx.capture.capture(ctx.driver, trigger, &expected).await?;
                return Ok(Some(artifact));
            }
            (action, Some(element)) => {
                if let Some(element_action) = action.element_action() {
                    ctx.driver.perform(element, &element_action).await?;
                }
            }
            (_, None) => {}
        }
        Ok(None)
    }
}

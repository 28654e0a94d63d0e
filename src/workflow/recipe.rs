//! 抓取配方 - 流程层
//!
//! 配方 = 有序步骤 + 恢复序列。状态流转：
//!
//! ```text
//! NotStarted → Running(0) → … → Running(n) → Succeeded
//!                   ↓ 非可选步骤重试耗尽
//!             RecoveringFrom(i) → Running(最近检查点)
//!                   ↓ 恢复次数用尽 / 致命错误
//!                 Failed
//! ```

use tracing::{error, info, warn};

use crate::models::Artifact;
use crate::workflow::step::{NavigationStep, StepOutcome};
use crate::workflow::step_ctx::StepContext;

/// 配方执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeState {
    NotStarted,
    Running(usize),
    RecoveringFrom(usize),
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFailureKind {
    /// 步骤判定页面不可恢复
    StepFatal,
    /// 恢复次数用尽
    RecoveryExhausted,
}

/// 配方失败详情
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeFailure {
    pub kind: RecipeFailureKind,
    pub step: String,
    pub attempts: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeStatus {
    Succeeded,
    Failed(RecipeFailure),
}

/// 配方执行结果
#[derive(Debug, Clone)]
pub struct RecipeOutcome {
    pub status: RecipeStatus,
    pub artifacts: Vec<Artifact>,
    /// 实际执行的恢复次数
    pub recoveries: u32,
}

impl RecipeOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RecipeStatus::Succeeded
    }
}

/// 抓取配方
#[derive(Debug, Clone)]
pub struct ExtractionRecipe {
    pub name: String,
    steps: Vec<NavigationStep>,
    recovery: Vec<NavigationStep>,
    max_recoveries: u32,
}

impl ExtractionRecipe {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            recovery: Vec::new(),
            max_recoveries: 0,
        }
    }

    pub fn step(mut self, step: NavigationStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = NavigationStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// 设置恢复序列与恢复次数上限
    pub fn recovery(mut self, steps: Vec<NavigationStep>, max_recoveries: u32) -> Self {
        self.recovery = steps;
        self.max_recoveries = max_recoveries;
        self
    }

    pub fn step_list(&self) -> &[NavigationStep] {
        &self.steps
    }

    pub fn max_recoveries(&self) -> u32 {
        self.max_recoveries
    }

    /// 第 i 步失败后，恢复完成应从哪一步继续
    pub fn resume_index(&self, failed: usize) -> usize {
        (0..=failed.min(self.steps.len().saturating_sub(1)))
            .rev()
            .find(|&i| self.steps[i].checkpoint)
            .unwrap_or(0)
    }

    pub async fn run(&self, ctx: &StepContext<'_>) -> RecipeOutcome {
        let mut state = RecipeState::NotStarted;
        let mut artifacts: Vec<Artifact> = Vec::new();
        let mut recoveries = 0u32;
        let mut last_failure: Option<RecipeFailure> = None;

        info!("{} ▶ 开始执行配方: {} ({} 步)", ctx, self.name, self.steps.len());

        loop {
            state = match state {
                RecipeState::NotStarted => RecipeState::Running(0),
                RecipeState::Running(i) if i >= self.steps.len() => RecipeState::Succeeded,
                RecipeState::Running(i) => {
                    let step = &self.steps[i];
                    let run = step.run(ctx).await;
                    match run.outcome {
                        StepOutcome::Success => {
                            if let Some(artifact) = run.artifact {
                                keep_latest(&mut artifacts, artifact);
                            }
                            RecipeState::Running(i + 1)
                        }
                        StepOutcome::FatalFailure(reason) => {
                            last_failure = Some(RecipeFailure {
                                kind: RecipeFailureKind::StepFatal,
                                step: step.name.clone(),
                                attempts: run.attempts,
                                reason,
                            });
                            RecipeState::Failed
                        }
                        StepOutcome::RetriableFailure(reason) if step.optional => {
                            warn!("{} ⏭ 跳过可选步骤 [{}]: {}", ctx, step.name, reason);
                            RecipeState::Running(i + 1)
                        }
                        StepOutcome::RetriableFailure(reason) => {
                            last_failure = Some(RecipeFailure {
                                kind: RecipeFailureKind::RecoveryExhausted,
                                step: step.name.clone(),
                                attempts: run.attempts,
                                reason,
                            });
                            RecipeState::RecoveringFrom(i)
                        }
                    }
                }
                RecipeState::RecoveringFrom(i) => {
                    if recoveries >= self.max_recoveries {
                        RecipeState::Failed
                    } else {
                        recoveries += 1;
                        info!(
                            "{} 🔄 第 {}/{} 次恢复 (失败步骤: {})",
                            ctx, recoveries, self.max_recoveries, self.steps[i].name
                        );
                        match self.recover(ctx).await {
                            Ok(()) => RecipeState::Running(self.resume_index(i)),
                            Err(fatal) => {
                                last_failure = Some(fatal);
                                RecipeState::Failed
                            }
                        }
                    }
                }
                RecipeState::Succeeded => {
                    info!("{} ✓ 配方完成: {} ({} 个文件)", ctx, self.name, artifacts.len());
                    return RecipeOutcome {
                        status: RecipeStatus::Succeeded,
                        artifacts,
                        recoveries,
                    };
                }
                RecipeState::Failed => {
                    let failure = last_failure.take().unwrap_or_else(|| RecipeFailure {
                        kind: RecipeFailureKind::RecoveryExhausted,
                        step: String::new(),
                        attempts: 0,
                        reason: "未知原因".to_string(),
                    });
                    error!(
                        "{} ❌ 配方失败: {} [{}] {}",
                        ctx, self.name, failure.step, failure.reason
                    );
                    return RecipeOutcome {
                        status: RecipeStatus::Failed(failure),
                        artifacts,
                        recoveries,
                    };
                }
            };
        }
    }

    /// 执行恢复序列；非可选步骤失败时放弃余下的恢复步骤，致命错误直接返回
    async fn recover(&self, ctx: &StepContext<'_>) -> Result<(), RecipeFailure> {
        for step in &self.recovery {
            let run = step.run(ctx).await;
            match run.outcome {
                StepOutcome::Success => {}
                StepOutcome::FatalFailure(reason) => {
                    return Err(RecipeFailure {
                        kind: RecipeFailureKind::StepFatal,
                        step: step.name.clone(),
                        attempts: run.attempts,
                        reason,
                    });
                }
                StepOutcome::RetriableFailure(reason) => {
                    warn!("{} 恢复步骤 [{}] 失败: {}", ctx, step.name, reason);
                    if !step.optional {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

/// 同一平台重复下载时保留最新的文件
fn keep_latest(artifacts: &mut Vec<Artifact>, artifact: Artifact) {
    artifacts.retain(|a| a.platform != artifact.platform);
    artifacts.push(artifact);
}

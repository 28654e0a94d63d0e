//! 单个任务处理器 - 编排层
//!
//! ## 职责
//!
//! 负责一个 (账号, 配方, 日期范围) 任务的完整生命周期。
//!
//! ## 核心功能
//!
//! 1. **打开会话**：从工作副本启动该账号的浏览器
//! 2. **执行配方**：委托 `ExtractionRecipe` 逐步执行
//! 3. **失败截图**：配方失败时保存 `error_<账号>.png`
//! 4. **关闭会话**：无论结果如何都关闭浏览器
//! 5. **任务间隔**：成功后等待一段时间再释放并发名额

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{AccountRegistry, Artifact, FailureKind, Job, JobFailure};
use crate::recipes::RecipeSource;
use crate::services::{DownloadCapture, SessionFactory};
use crate::workflow::{RecipeFailureKind, RecipeStatus, StepContext};

/// 任务执行所需的共享依赖
pub struct JobDeps {
    pub registry: Arc<AccountRegistry>,
    pub sessions: Arc<dyn SessionFactory>,
    pub recipes: Arc<dyn RecipeSource>,
    pub capture: Arc<DownloadCapture>,
    /// 失败截图目录，None 表示不截图
    pub diagnostics_dir: Option<PathBuf>,
    /// 成功后的等待时间
    pub pause_between_jobs: Duration,
}

/// 单个任务的结果
#[derive(Debug, Clone)]
pub enum JobResult {
    Succeeded(Vec<Artifact>),
    Failed(JobFailure),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job: Job,
    pub result: JobResult,
}

impl JobReport {
    pub fn failed(job: Job, kind: FailureKind, step: Option<String>, reason: impl Into<String>) -> Self {
        let failure = JobFailure {
            job_id: job.id.clone(),
            account: job.account.clone(),
            kind,
            step,
            attempts: 0,
            reason: reason.into(),
        };
        Self {
            job,
            result: JobResult::Failed(failure),
        }
    }
}

/// 处理单个任务
///
/// # 参数
/// - `deps`: 共享依赖
/// - `job`: 任务
/// - `job_index`: 任务在规划中的序号（用于日志）
/// - `total`: 任务总数
/// - `cancel`: 取消信号
pub async fn process_job(
    deps: &JobDeps,
    job: Job,
    job_index: usize,
    total: usize,
    cancel: CancellationToken,
) -> JobReport {
    let Some(account) = deps.registry.get(&job.account).cloned() else {
        let reason = format!("账号表中不存在: {}", job.account);
        return JobReport::failed(job, FailureKind::Internal, None, reason);
    };

    log_job_start(job_index, total, &job, &account.brand);

    let recipe = match deps.recipes.recipe_for(&job, &account) {
        Ok(recipe) => recipe,
        Err(e) => return JobReport::failed(job, FailureKind::Internal, None, e.to_string()),
    };

    if cancel.is_cancelled() {
        return JobReport {
            job,
            result: JobResult::Cancelled,
        };
    }

    // 登录态缺失等问题重试无意义，直接上报
    let session = match deps.sessions.open(&account).await {
        Ok(session) => session,
        Err(e) => {
            error!("[账号 {}] ❌ 会话打开失败: {}", job.account, e);
            return JobReport::failed(job, FailureKind::SessionOpenFailed, None, e.to_string());
        }
    };

    let outcome = {
        let ctx = StepContext::new(session.driver(), &deps.capture, account.id(), job.date_range);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            outcome = recipe.run(&ctx) => Some(outcome),
        };

        if let (Some(outcome), Some(dir)) = (&outcome, &deps.diagnostics_dir) {
            if !outcome.is_success() {
                save_failure_screenshot(&ctx, dir).await;
            }
        }
        outcome
    };

    if let Err(e) = session.close().await {
        warn!("[账号 {}] 关闭会话失败: {}", job.account, e);
    }

    let result = match outcome {
        None => {
            warn!("[账号 {}] ⏹ 任务已取消: {}", job.account, job.id);
            JobResult::Cancelled
        }
        Some(outcome) => match outcome.status {
            RecipeStatus::Succeeded => {
                log_job_complete(job_index, &job, outcome.artifacts.len(), outcome.recoveries);
                if !deps.pause_between_jobs.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(deps.pause_between_jobs) => {}
                    }
                }
                JobResult::Succeeded(outcome.artifacts)
            }
            RecipeStatus::Failed(failure) => JobResult::Failed(JobFailure {
                job_id: job.id.clone(),
                account: job.account.clone(),
                kind: match failure.kind {
                    RecipeFailureKind::StepFatal => FailureKind::StepFatal,
                    RecipeFailureKind::RecoveryExhausted => FailureKind::RecoveryExhausted,
                },
                step: Some(failure.step),
                attempts: failure.attempts,
                reason: failure.reason,
            }),
        },
    };

    JobReport { job, result }
}

async fn save_failure_screenshot(ctx: &StepContext<'_>, dir: &std::path::Path) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        warn!("{} 创建截图目录失败: {}", ctx, e);
        return;
    }
    let path = dir.join(format!("error_{}.png", ctx.account));
    match ctx.driver.screenshot(&path).await {
        Ok(()) => info!("{} 📸 已保存失败截图: {}", ctx, path.display()),
        Err(e) => warn!("{} 保存失败截图失败: {}", ctx, e),
    }
}

// ========== 日志辅助函数 ==========

fn log_job_start(job_index: usize, total: usize, job: &Job, brand: &str) {
    info!("\n[账号 {}] {}", job.account, "─".repeat(30));
    info!(
        "[账号 {}] 开始第 {}/{} 个任务: {} ({})",
        job.account, job_index, total, job.recipe, brand
    );
    info!("[账号 {}] 日期范围: {}", job.account, job.date_range);
}

fn log_job_complete(job_index: usize, job: &Job, artifacts: usize, recoveries: u32) {
    info!(
        "[账号 {}] ✅ 第 {} 个任务完成: {} 个文件, 恢复 {} 次",
        job.account, job_index, artifacts, recoveries
    );
}

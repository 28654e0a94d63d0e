//! 批量任务编排器 - 编排层
//!
//! ## 职责
//!
//! 按规划顺序派发任务，控制同时打开的会话数量，
//! 每个任务结束后立即写断点，失败时按策略停止或跳过。
//!
//! ## 核心功能
//!
//! 1. **断点续跑**：只派发未完成的任务，已完成的不会重跑
//! 2. **并发控制**：同时运行的任务数不超过批次的并发上限
//! 3. **失败策略**：`Halt` 停止派发新任务；`SkipAccount` 跳过该账号剩余任务
//! 4. **取消**：收到取消信号后不再派发，等待在途任务关闭会话后返回
//! 5. **文件交接**：成功任务的文件逐个交给下游

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult, ConfigError};
use crate::models::{AccountRegistry, BatchRun, FailureKind, Job, JobId, RunStatus};
use crate::orchestrator::job_runner::{self, JobDeps, JobReport, JobResult};
use crate::recipes::RecipeSource;
use crate::services::{ArtifactSink, CheckpointStore, DownloadCapture, SessionFactory};

/// 任务失败后的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// 停止派发新任务，等待在途任务结束
    #[default]
    Halt,
    /// 跳过失败账号的剩余任务，其他账号继续
    SkipAccount,
}

impl FromStr for FailurePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "halt" => Ok(FailurePolicy::Halt),
            "skip-account" | "skip_account" => Ok(FailurePolicy::SkipAccount),
            other => Err(ConfigError::UnknownFailurePolicy(other.to_string()).into()),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Halt => f.write_str("halt"),
            FailurePolicy::SkipAccount => f.write_str("skip-account"),
        }
    }
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    JobStarted {
        job_id: JobId,
        index: usize,
        total: usize,
    },
    JobFinished {
        job_id: JobId,
        succeeded: bool,
        completed: usize,
        total: usize,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
    },
}

/// 编排选项
#[derive(Debug, Clone, Default)]
pub struct OrchestratorOptions {
    pub failure_policy: FailurePolicy,
    pub pause_between_jobs: Duration,
    pub diagnostics_dir: Option<PathBuf>,
}

/// 批量任务编排器
pub struct BatchOrchestrator {
    registry: Arc<AccountRegistry>,
    sessions: Arc<dyn SessionFactory>,
    recipes: Arc<dyn RecipeSource>,
    capture: Arc<DownloadCapture>,
    store: Arc<dyn CheckpointStore>,
    sink: Arc<dyn ArtifactSink>,
    options: OrchestratorOptions,
    progress: Option<UnboundedSender<ProgressEvent>>,
}

impl BatchOrchestrator {
    pub fn new(
        registry: Arc<AccountRegistry>,
        sessions: Arc<dyn SessionFactory>,
        recipes: Arc<dyn RecipeSource>,
        capture: Arc<DownloadCapture>,
        store: Arc<dyn CheckpointStore>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            registry,
            sessions,
            recipes,
            capture,
            store,
            sink,
            options: OrchestratorOptions::default(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            // 接收方已退出时丢弃事件
            let _ = tx.send(event);
        }
    }

    fn deps(&self) -> Arc<JobDeps> {
        Arc::new(JobDeps {
            registry: Arc::clone(&self.registry),
            sessions: Arc::clone(&self.sessions),
            recipes: Arc::clone(&self.recipes),
            capture: Arc::clone(&self.capture),
            diagnostics_dir: self.options.diagnostics_dir.clone(),
            pause_between_jobs: self.options.pause_between_jobs,
        })
    }

    /// 执行（或续跑）一个批次，返回最终的运行记录
    pub async fn run_batch(&self, mut run: BatchRun, cancel: CancellationToken) -> AppResult<BatchRun> {
        let pending = run.pending_jobs();
        let total = run.jobs.len();
        run.begin();

        if pending.is_empty() {
            info!("✓ 批次 {} 没有待执行的任务", run.run_id);
            run.finish();
            self.store.save(&run).await?;
            self.emit(ProgressEvent::RunFinished {
                run_id: run.run_id.clone(),
                status: run.status,
            });
            return Ok(run);
        }

        let limit = run.concurrency.max(1);
        log_run_start(&run, pending.len(), limit, self.options.failure_policy);
        self.store.save(&run).await?;

        let deps = self.deps();
        // 断点写失败时只取消本批次派发出去的任务
        let stop = cancel.child_token();
        let mut queue: VecDeque<_> = pending.into();
        let mut in_flight: JoinSet<JobReport> = JoinSet::new();
        let mut tasks: HashMap<Id, Job> = HashMap::new();
        let mut halted = false;
        let mut skipped_accounts: HashSet<String> = HashSet::new();

        loop {
            // 派发：未停止、未取消、未达上限
            while !halted && !stop.is_cancelled() && in_flight.len() < limit {
                let Some(job) = queue.pop_front() else { break };

                if skipped_accounts.contains(&job.account) {
                    warn!("[账号 {}] ⏭ 跳过任务 {} (该账号已有任务失败)", job.account, job.id);
                    run.record_skipped(&job.id, "同账号已有任务失败");
                    continue;
                }

                let index = run.position(&job.id).map_or(0, |p| p + 1);
                self.emit(ProgressEvent::JobStarted {
                    job_id: job.id.clone(),
                    index,
                    total,
                });

                let deps = Arc::clone(&deps);
                let token = stop.child_token();
                let tracked = job.clone();
                let handle = in_flight.spawn(async move {
                    let fallback = job.clone();
                    AssertUnwindSafe(job_runner::process_job(&deps, job, index, total, token))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            JobReport::failed(fallback, FailureKind::Internal, None, "任务执行时发生 panic")
                        })
                });
                tasks.insert(handle.id(), tracked);
            }

            let Some(joined) = in_flight.join_next_with_id().await else { break };
            let Some(report) = settle(joined, &mut tasks) else { continue };

            let job_id = report.job.id.clone();
            let succeeded = matches!(report.result, JobResult::Succeeded(_));
            self.fold(&mut run, report, &mut halted, &mut skipped_accounts)
                .await;
            if let Err(e) = self.store.save(&run).await {
                error!("💾 写断点失败，取消进行中的任务: {}", e);
                stop.cancel();
                // 等在途任务关闭浏览器后再返回
                while let Some(joined) = in_flight.join_next_with_id().await {
                    if let Some(report) = settle(joined, &mut tasks) {
                        self.fold(&mut run, report, &mut halted, &mut skipped_accounts)
                            .await;
                    }
                }
                return Err(e);
            }
            self.emit(ProgressEvent::JobFinished {
                job_id,
                succeeded,
                completed: run.completed_count(),
                total,
            });
        }

        run.finish();
        self.store.save(&run).await?;
        self.emit(ProgressEvent::RunFinished {
            run_id: run.run_id.clone(),
            status: run.status,
        });
        Ok(run)
    }

    /// 把单个任务的结果并入运行记录
    async fn fold(
        &self,
        run: &mut BatchRun,
        report: JobReport,
        halted: &mut bool,
        skipped_accounts: &mut HashSet<String>,
    ) {
        let JobReport { job, result } = report;
        match result {
            JobResult::Succeeded(artifacts) => {
                for artifact in &artifacts {
                    if let Err(e) = self.sink.handoff(artifact).await {
                        error!("[账号 {}] 文件交接失败 {}: {}", job.account, artifact.path.display(), e);
                    }
                }
                run.record_success(&job.id, artifacts);
            }
            JobResult::Failed(failure) => {
                error!(
                    "[账号 {}] ❌ 任务失败 {} [{}]: {}",
                    job.account,
                    job.id,
                    failure.step.as_deref().unwrap_or("-"),
                    failure.reason
                );
                run.record_failure(failure);
                match self.options.failure_policy {
                    FailurePolicy::Halt => {
                        if !*halted {
                            warn!("⛔ 已停止派发新任务，等待进行中的任务结束");
                        }
                        *halted = true;
                    }
                    FailurePolicy::SkipAccount => {
                        skipped_accounts.insert(job.account.clone());
                    }
                }
            }
            JobResult::Cancelled => run.record_cancelled(&job.id),
        }
    }
}

/// 取回任务结果；任务异常退出时按任务 id 找回对应的 Job
fn settle(joined: Result<(Id, JobReport), JoinError>, tasks: &mut HashMap<Id, Job>) -> Option<JobReport> {
    match joined {
        Ok((id, report)) => {
            tasks.remove(&id);
            Some(report)
        }
        Err(e) => {
            error!("任务执行失败: {}", e);
            let job = tasks.remove(&e.id())?;
            Some(JobReport::failed(
                job,
                FailureKind::Internal,
                None,
                format!("任务异常退出: {}", e),
            ))
        }
    }
}

fn log_run_start(run: &BatchRun, pending: usize, limit: usize, policy: FailurePolicy) {
    info!("\n{}", "=".repeat(60));
    info!("📦 批次 {} | 日期范围: {}", run.run_id, run.date_range);
    info!(
        "📄 待执行任务: {} / 共 {} (已完成 {})",
        pending,
        run.jobs.len(),
        run.completed_count()
    );
    info!("📊 最大并发数: {} | 失败策略: {}", limit, policy);
    info!("{}", "=".repeat(60));
}

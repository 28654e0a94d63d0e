//! 应用入口
//!
//! 负责装配各层组件：读取账号表、创建会话工厂/断点存储/下载捕获，
//! 再交给编排器执行新批次或续跑旧批次。

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{load_account_registry, AccountRegistry, BatchRun, DateRange, Job};
use crate::orchestrator::{BatchOrchestrator, OrchestratorOptions, ProgressEvent};
use crate::recipes::{PortalRecipes, RecipeSettings};
use crate::services::{
    ChromeSessionFactory, CheckpointStore, DownloadCapture, JsonCheckpointStore, ManifestSink,
};
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    registry: Arc<AccountRegistry>,
    store: Arc<JsonCheckpointStore>,
    orchestrator: BatchOrchestrator,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        let registry = Arc::new(load_account_registry(&config.accounts_file).await?);
        logging::log_startup(config.max_concurrent_jobs, registry.len());

        let store = Arc::new(JsonCheckpointStore::new(&config.checkpoint_dir));
        let capture = Arc::new(DownloadCapture::new(
            &config.download_dir,
            config.download_timeout(),
        ));
        let sink = Arc::new(ManifestSink::in_dir(&config.download_dir));
        info!(
            "💾 断点目录: {} | 文件清单: {}",
            store.dir().display(),
            sink.path().display()
        );
        let sessions = Arc::new(ChromeSessionFactory::from_config(&config));
        let recipes = Arc::new(PortalRecipes::new(RecipeSettings {
            policy: config.step_policy(),
            max_recoveries: config.recipe_recoveries,
        }));

        let orchestrator = BatchOrchestrator::new(
            Arc::clone(&registry),
            sessions,
            recipes,
            capture,
            store.clone(),
            sink,
        )
        .with_options(OrchestratorOptions {
            failure_policy: config.failure_policy()?,
            pause_between_jobs: config.wait_between_jobs(),
            diagnostics_dir: Some(config.diagnostics_dir.clone()),
        })
        .with_progress(spawn_progress_logger());

        Ok(Self {
            config,
            registry,
            store,
            orchestrator,
        })
    }

    /// 按品牌/Profile 选择账号并规划新批次（空选择 = 全部账号）
    pub fn plan(&self, selection: &[String], range: DateRange) -> AppResult<BatchRun> {
        let accounts = self.registry.select(selection)?;
        let jobs = Job::plan(&accounts, range);
        logging::log_jobs_planned(jobs.len(), accounts.len(), self.config.max_concurrent_jobs);
        Ok(BatchRun::new(jobs, range, self.config.max_concurrent_jobs))
    }

    /// 执行新批次
    pub async fn start(&self, selection: &[String], range: DateRange) -> AppResult<BatchRun> {
        let run = self.plan(selection, range)?;
        info!("📅 下载日期范围: {}", range);
        self.execute(run).await
    }

    /// 续跑指定批次；未指定时续跑最近的批次
    pub async fn resume(&self, run_id: Option<&str>) -> AppResult<BatchRun> {
        let run = match run_id {
            Some(id) => self.store.load(id).await?,
            None => self
                .store
                .latest()
                .await?
                .ok_or_else(|| AppError::Other("没有可续跑的批次".to_string()))?,
        };
        info!(
            "🔁 续跑批次 {} (已完成 {}/{})",
            run.run_id,
            run.completed_count(),
            run.jobs.len()
        );
        self.execute(run).await
    }

    async fn execute(&self, run: BatchRun) -> AppResult<BatchRun> {
        let cancel = CancellationToken::new();

        // Ctrl+C：停止派发新任务，等待在途任务关闭浏览器
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⏹ 收到中断信号，等待进行中的任务关闭浏览器...");
                    cancel.cancel();
                }
            })
        };

        let result = self.orchestrator.run_batch(run, cancel).await;
        ctrl_c.abort();

        let run = result?;
        logging::print_final_stats(&run, &self.config.output_log_file);
        Ok(run)
    }
}

/// 进度事件写入日志
fn spawn_progress_logger() -> UnboundedSender<ProgressEvent> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProgressEvent::JobStarted { job_id, index, total } => {
                    debug!("▶ 派发任务 {}/{}: {}", index, total, job_id);
                }
                ProgressEvent::JobFinished {
                    job_id,
                    succeeded,
                    completed,
                    total,
                } => {
                    let mark = if succeeded { "✓" } else { "✗" };
                    info!("📈 进度 {}/{} {} {}", completed, total, mark, job_id);
                }
                ProgressEvent::RunFinished { run_id, status } => {
                    debug!("批次 {} 结束: {:?}", run_id, status);
                }
            }
        }
    });
    tx
}

//! # Portal Extract
//!
//! 一个用于批量抓取美团商家门户报表的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Browser / Page），只暴露能力
//! - `PageDriver` - 定位、点击、填写、等待下载、截图
//! - `ChromeDriver` - 基于 chromiumoxide 的实现，可进入任意层级的 iframe
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `Session` - 账号隔离的浏览器会话（工作副本 + 账号锁）
//! - `DownloadCapture` - 捕获下载并落到规范路径
//! - `CheckpointStore` - 断点读写
//! - `ArtifactSink` - 把文件交给下游
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个配方"如何逐步执行
//! - `NavigationStep` - 多策略定位 + 动作 + 后置条件 + 重试
//! - `ExtractionRecipe` - 步骤序列 + 恢复序列
//! - `recipes/` - 推广通小时报表、经营数据报表两个配方
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批次编排，管理并发、断点与失败策略
//! - `orchestrator/job_runner` - 单个任务处理器，打开会话、执行配方、关闭会话
//!
//! ## 模块结构

pub mod app;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod recipes;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{ChromeDriver, FramePath, Locator, PageDriver};
pub use models::{Account, AccountRegistry, Artifact, BatchRun, DateRange, Job, Platform};
pub use orchestrator::{BatchOrchestrator, FailurePolicy};
pub use workflow::{ExtractionRecipe, NavigationStep, StepPolicy};

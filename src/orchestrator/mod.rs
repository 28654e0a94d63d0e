//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量任务的调度、断点与并发控制，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量任务编排器
//! - 只派发未完成的任务（断点续跑）
//! - 控制同时打开的会话数量
//! - 每个任务结束后写断点
//! - 按失败策略停止或跳过
//! - 响应取消信号
//!
//! ### `job_runner` - 单个任务处理器
//! - 打开账号会话
//! - 执行配方
//! - 失败截图
//! - 关闭会话
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Job>)
//!     ↓
//! job_runner (处理单个 Job)
//!     ↓
//! workflow::ExtractionRecipe (逐步执行 NavigationStep)
//!     ↓
//! services (能力层：session / download / checkpoint / sink)
//!     ↓
//! infrastructure (基础设施：PageDriver)
//! ```

pub mod batch_processor;
pub mod job_runner;

// 重新导出主要类型
pub use batch_processor::{BatchOrchestrator, FailurePolicy, OrchestratorOptions, ProgressEvent};
pub use job_runner::{process_job, JobDeps, JobReport, JobResult};

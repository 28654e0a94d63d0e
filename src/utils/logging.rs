/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};
use crate::models::{BatchRun, JobRecord, RunStatus};

/// 初始化日志：终端 + 日志文件（不带颜色）
///
/// `RUST_LOG` 优先；否则 verbose 时为 debug，默认 info
pub fn init(verbose: bool, log_file_path: Option<&str>) -> AppResult<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match log_file_path {
        Some(path) => {
            init_log_file(path)?;
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .map_err(|e| AppError::io(path, e))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Other(format!("日志初始化失败: {}", e)))
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n门户数据抓取日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    if let Some(parent) = Path::new(log_file_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
        }
    }
    fs::write(log_file_path, log_header).map_err(|e| AppError::io(log_file_path, e))?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发数
/// - `accounts`: 账号总数
pub fn log_startup(max_concurrent: usize, accounts: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 多账号并发抓取模式");
    info!("👥 账号数量: {}", accounts);
    info!("📊 最大并发数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录任务规划信息
pub fn log_jobs_planned(total: usize, accounts: usize, max_concurrent: usize) {
    info!("✓ 为 {} 个账号规划了 {} 个任务", accounts, total);
    info!("📋 最多同时运行 {} 个浏览器会话\n", max_concurrent);
}

/// 打印最终统计信息
///
/// # 参数
/// - `run`: 批次运行记录
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(run: &BatchRun, log_file_path: &str) {
    let failed = run
        .records
        .values()
        .filter(|r| matches!(r, JobRecord::Failed { .. }))
        .count();
    let skipped = run
        .records
        .values()
        .filter(|r| matches!(r, JobRecord::Skipped { .. }))
        .count();

    info!("\n{}", "=".repeat(60));
    info!("📊 批次 {} 统计", run.run_id);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 完成: {}/{}", run.completed_count(), run.jobs.len());
    info!("❌ 失败: {}", failed);
    if skipped > 0 {
        info!("⏭ 跳过: {}", skipped);
    }
    info!("💾 文件: {}", run.artifacts.len());
    match run.status {
        RunStatus::Succeeded => info!("🎉 全部任务完成"),
        _ => {
            if let Some(failure) = &run.failure {
                info!(
                    "⚠️ 首个失败: {} [{}] {}",
                    failure.job_id,
                    failure.step.as_deref().unwrap_or("-"),
                    truncate_text(&failure.reason, 80)
                );
            }
            if let Some(next) = &run.resume_from {
                info!("🔁 续跑命令: resume {} (将从 {} 开始)", run.run_id, next);
            }
        }
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_by_chars() {
        assert_eq!(truncate_text("推广分析未找到", 4), "推广分析...");
        assert_eq!(truncate_text("短", 4), "短");
    }
}

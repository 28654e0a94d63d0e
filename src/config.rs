use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppResult, ConfigError};
use crate::workflow::StepPolicy;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时运行的浏览器会话数量（受门户对并发会话的容忍度限制）
    pub max_concurrent_jobs: usize,
    /// 只读的 Chrome 用户数据目录（已登录的基线快照）
    pub baseline_profile_dir: PathBuf,
    /// 每个账号的工作副本存放目录
    pub workspace_dir: PathBuf,
    /// 任务结束后是否保留工作副本（缓存，下次免复制）
    pub keep_workspace: bool,
    /// 下载文件根目录
    pub download_dir: PathBuf,
    /// 断点文件目录
    pub checkpoint_dir: PathBuf,
    /// 失败截图目录
    pub diagnostics_dir: PathBuf,
    /// 账号表 TOML 文件
    pub accounts_file: PathBuf,
    /// 自定义浏览器可执行文件
    pub chrome_executable: Option<PathBuf>,
    /// 是否无头运行
    pub headless: bool,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    // --- 步骤重试配置 ---
    pub step_max_attempts: u32,
    pub locate_timeout_ms: u64,
    pub verify_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub download_timeout_secs: u64,
    /// 配方级恢复次数
    pub recipe_recoveries: u32,
    /// 每个任务结束后的等待时间
    pub wait_between_jobs_secs: u64,
    /// 失败策略: halt / skip-account
    pub failure_policy: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            baseline_profile_dir: PathBuf::from("chrome_user_data"),
            workspace_dir: PathBuf::from("chrome_workspace"),
            keep_workspace: true,
            download_dir: PathBuf::from("downloads"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            diagnostics_dir: PathBuf::from("diagnostics"),
            accounts_file: PathBuf::from("accounts.toml"),
            chrome_executable: None,
            headless: false,
            verbose_logging: false,
            output_log_file: "extract_log.txt".to_string(),
            step_max_attempts: 3,
            locate_timeout_ms: 3000,
            verify_timeout_ms: 5000,
            retry_backoff_ms: 2000,
            download_timeout_secs: 15,
            recipe_recoveries: 2,
            wait_between_jobs_secs: 3,
            failure_policy: "halt".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(default.max_concurrent_jobs),
            baseline_profile_dir: env_path("CHROME_USER_DATA").unwrap_or(default.baseline_profile_dir),
            workspace_dir: env_path("PROFILE_WORKSPACE").unwrap_or(default.workspace_dir),
            keep_workspace: env_parse("KEEP_WORKSPACE").unwrap_or(default.keep_workspace),
            download_dir: env_path("DOWNLOAD_DIR").unwrap_or(default.download_dir),
            checkpoint_dir: env_path("CHECKPOINT_DIR").unwrap_or(default.checkpoint_dir),
            diagnostics_dir: env_path("DIAGNOSTICS_DIR").unwrap_or(default.diagnostics_dir),
            accounts_file: env_path("ACCOUNTS_FILE").unwrap_or(default.accounts_file),
            chrome_executable: env_path("CHROME_EXECUTABLE").or(default.chrome_executable),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            step_max_attempts: env_parse("STEP_MAX_ATTEMPTS").unwrap_or(default.step_max_attempts),
            locate_timeout_ms: env_parse("LOCATE_TIMEOUT_MS").unwrap_or(default.locate_timeout_ms),
            verify_timeout_ms: env_parse("VERIFY_TIMEOUT_MS").unwrap_or(default.verify_timeout_ms),
            retry_backoff_ms: env_parse("RETRY_BACKOFF_MS").unwrap_or(default.retry_backoff_ms),
            download_timeout_secs: env_parse("DOWNLOAD_TIMEOUT_SECS").unwrap_or(default.download_timeout_secs),
            recipe_recoveries: env_parse("RECIPE_RECOVERIES").unwrap_or(default.recipe_recoveries),
            wait_between_jobs_secs: env_parse("WAIT_BETWEEN_JOBS_SECS").unwrap_or(default.wait_between_jobs_secs),
            failure_policy: std::env::var("FAILURE_POLICY").unwrap_or(default.failure_policy),
        }
    }

    /// 步骤级重试策略
    pub fn step_policy(&self) -> StepPolicy {
        StepPolicy {
            max_attempts: self.step_max_attempts.max(1),
            locate_timeout: Duration::from_millis(self.locate_timeout_ms),
            verify_timeout: Duration::from_millis(self.verify_timeout_ms),
            backoff: Duration::from_millis(self.retry_backoff_ms),
            ..StepPolicy::default()
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn wait_between_jobs(&self) -> Duration {
        Duration::from_secs(self.wait_between_jobs_secs)
    }

    /// 解析失败策略
    pub fn failure_policy(&self) -> AppResult<crate::orchestrator::FailurePolicy> {
        self.failure_policy
            .parse()
            .map_err(|_| ConfigError::UnknownFailurePolicy(self.failure_policy.clone()).into())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::FailurePolicy;

    #[test]
    fn default_policy_is_halt() {
        let config = Config::default();
        assert_eq!(config.failure_policy().unwrap(), FailurePolicy::Halt);
        assert_eq!(config.max_concurrent_jobs, 2);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let config = Config {
            failure_policy: "whatever".to_string(),
            ..Config::default()
        };
        assert!(config.failure_policy().is_err());
    }

    #[test]
    fn step_policy_never_has_zero_attempts() {
        let config = Config {
            step_max_attempts: 0,
            ..Config::default()
        };
        assert_eq!(config.step_policy().max_attempts, 1);
    }
}

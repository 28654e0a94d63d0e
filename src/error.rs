use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误
    #[error("浏览器错误: {0}")]
    Browser(#[from] BrowserError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 会话打开失败（需要人工重新登录，不重试）
    #[error("会话打开失败 [{account}]: {reason}")]
    SessionOpenFailed { account: String, reason: String },
    /// 等待下载超时
    #[error("等待下载超时 ({platform}, {timeout_secs}秒)")]
    DownloadTimeout { platform: String, timeout_secs: u64 },
    /// 日期范围不合法
    #[error("日期范围不合法: {0}")]
    InvalidDateRange(String),
    /// 断点不存在
    #[error("找不到断点记录: {run_id}")]
    CheckpointNotFound { run_id: String },
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("启动浏览器失败 ({profile}): {reason}")]
    LaunchFailed { profile: String, reason: String },
    /// 浏览器配置失败
    #[error("浏览器配置失败: {0}")]
    ConfigurationFailed(String),
    /// 导航失败
    #[error("导航到 {url} 失败: {reason}")]
    NavigationFailed { url: String, reason: String },
    /// 找不到目标 iframe
    #[error("找不到 iframe: {0}")]
    FrameNotFound(String),
    /// 元素已失效（页面刷新后引用丢失）
    #[error("元素引用已失效: {0}")]
    StaleElement(String),
    /// 下载被浏览器取消
    #[error("下载被取消: {0}")]
    DownloadCanceled(String),
    /// CDP 协议错误
    #[error("CDP 调用失败: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// IO 失败
    #[error("文件读写失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// JSON 读写失败
    #[error("JSON处理失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 账号表为空
    #[error("账号表为空")]
    EmptyRegistry,
    /// 账号字段缺失或非法
    #[error("账号配置非法 (第 {index} 条): {reason}")]
    InvalidAccount { index: usize, reason: String },
    /// 账号重复
    #[error("账号重复: {0}")]
    DuplicateAccount(String),
    /// 未知品牌或账号
    #[error("未找到对应的品牌或账号: {0}")]
    UnknownSelection(String),
    /// 失败策略无法识别
    #[error("无法识别的失败策略: {0}")]
    UnknownFailurePolicy(String),
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::Cdp(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::File(FileError::Json(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::Io {
            path: String::new(),
            source: err,
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建会话打开失败错误
    pub fn session_open_failed(account: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::SessionOpenFailed {
            account: account.into(),
            reason: reason.into(),
        }
    }

    /// 创建带路径的 IO 错误
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        AppError::File(FileError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })
    }

    /// 创建浏览器启动失败错误
    pub fn launch_failed(profile: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            profile: profile.into(),
            reason: reason.to_string(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 远程分析（webhook）调用错误
    Api(ApiError),
    /// 数据层错误
    Store(StoreError),
    /// 麦克风 / 播放器错误
    Media(MediaError),
    /// 文件操作错误
    File(FileError),
    /// 业务逻辑错误
    Business(BusinessError),
    /// 配置错误
    Config(ConfigError),
    /// 操作已被取消（会话结束或用户离开）
    Cancelled,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Api(e) => write!(f, "API错误: {}", e),
            AppError::Store(e) => write!(f, "数据层错误: {}", e),
            AppError::Media(e) => write!(f, "媒体错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Business(e) => write!(f, "业务错误: {}", e),
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Cancelled => write!(f, "操作已取消"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Api(e) => Some(e),
            AppError::Store(e) => Some(e),
            AppError::Media(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Business(e) => Some(e),
            AppError::Config(e) => Some(e),
            AppError::Cancelled => None,
        }
    }
}

/// 远程分析调用错误
#[derive(Debug)]
pub enum ApiError {
    /// 网络请求失败
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回非 2xx 状态
    BadResponse {
        endpoint: String,
        status: u16,
        body: Option<String>,
    },
    /// 返回内容里没有任何可用字段
    EmptyResponse { endpoint: String },
    /// 请求超时
    Timeout { endpoint: String, secs: u64 },
    /// resumeUrl 无法解析
    InvalidResumeUrl { url: String },
    /// JSON 解析失败
    JsonParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::RequestFailed { endpoint, source } => {
                write!(f, "API请求失败 ({}): {}", endpoint, source)
            }
            ApiError::BadResponse {
                endpoint,
                status,
                body,
            } => {
                write!(
                    f,
                    "API返回错误响应 ({}): status={}, body={:?}",
                    endpoint, status, body
                )
            }
            ApiError::EmptyResponse { endpoint } => {
                write!(f, "API返回空结果: {}", endpoint)
            }
            ApiError::Timeout { endpoint, secs } => {
                write!(f, "API请求超时 ({}), 超过 {} 秒", endpoint, secs)
            }
            ApiError::InvalidResumeUrl { url } => {
                write!(f, "无效的 resumeUrl: {}", url)
            }
            ApiError::JsonParseFailed { source } => {
                write!(f, "JSON解析失败: {}", source)
            }
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::RequestFailed { source, .. } | ApiError::JsonParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 数据层错误（托管关系库）
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("请求表 {table} 失败: {message}")]
    RequestFailed { table: String, message: String },

    #[error("表 {table} 返回错误响应: status={status}, body={body}")]
    BadResponse {
        table: String,
        status: u16,
        body: String,
    },

    #[error("表 {table} 中的行无法解析: {message}")]
    MalformedRow { table: String, message: String },

    #[error("未找到记录: {table} ({filter})")]
    NotFound { table: String, filter: String },
}

/// 麦克风 / 音频错误
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("麦克风权限被拒绝: {0}")]
    PermissionDenied(String),

    #[error("找不到录音设备: {0}")]
    DeviceNotFound(String),

    #[error("录音为空")]
    EmptyRecording,

    #[error("录音器状态错误: 无法从 {from} 执行 {action}")]
    InvalidRecorderState { from: String, action: String },

    #[error("录音进程异常: {0}")]
    CaptureFailed(String),
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 目录不存在
    DirectoryNotFound { path: String },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "写入文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
            FileError::DirectoryNotFound { path } => write!(f, "目录不存在: {}", path),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::WriteFailed { source, .. }
            | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            FileError::DirectoryNotFound { .. } => None,
        }
    }
}

/// 业务逻辑错误
#[derive(Debug)]
pub enum BusinessError {
    /// 等级超出 1..=5
    InvalidLevel { level: u8 },
    /// 学生姓名为空
    EmptyStudentName,
    /// 状态机不允许的转换
    InvalidTransition { phase: String, event: String },
    /// 等级计划里没有任何单元
    EmptyPlan { level: u8 },
    /// 找不到等级计划
    PlanNotFound { level: u8 },
    /// 没有登录的会话
    NotLoggedIn,
}

impl fmt::Display for BusinessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusinessError::InvalidLevel { level } => {
                write!(f, "等级 {} 超出范围 [1, 5]", level)
            }
            BusinessError::EmptyStudentName => write!(f, "学生姓名不能为空"),
            BusinessError::InvalidTransition { phase, event } => {
                write!(f, "阶段 {} 不接受事件 {}", phase, event)
            }
            BusinessError::EmptyPlan { level } => {
                write!(f, "等级 {} 的计划没有任何单元", level)
            }
            BusinessError::PlanNotFound { level } => {
                write!(f, "找不到等级 {} 的计划", level)
            }
            BusinessError::NotLoggedIn => write!(f, "当前没有登录的会话"),
        }
    }
}

impl std::error::Error for BusinessError {}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 未知的 API 环境
    UnknownApiEnv { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::UnknownApiEnv { value } => {
                write!(f, "未知的 API 环境 '{}', 只支持 test / product", value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ========== 从常见错误类型转换 ==========

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError::Api(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        AppError::Media(err)
    }
}

impl From<BusinessError> for AppError {
    fn from(err: BusinessError) -> Self {
        AppError::Business(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Api(ApiError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_default();
        AppError::Api(ApiError::RequestFailed {
            endpoint,
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建API请求失败错误
    pub fn api_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建数据行解析错误
    pub fn malformed_row(table: impl Into<String>, err: impl fmt::Display) -> Self {
        AppError::Store(StoreError::MalformedRow {
            table: table.into(),
            message: err.to_string(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

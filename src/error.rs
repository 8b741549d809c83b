use std::fmt;

/// 论文处理错误类型
///
/// 覆盖流水线各阶段的失败原因。错误信息会作为 `failure_reason`
/// 持久化并展示给用户，因此 `Display` 输出使用面向用户的英文描述。
#[derive(Debug)]
pub enum AppError {
    /// 两个检索源都没有找到论文（终态）
    NotFound,
    /// 检索结果中没有 PDF 链接
    PdfUrlMissing,
    /// PDF 下载失败（网络错误、HTML 响应或魔数校验失败）
    DownloadFailed,
    /// 模板不存在
    TemplateMissing,
    /// 远程缓存过期且源文件丢失，对话无法继续
    CacheUnrecoverable {
        display_name: String,
    },
    /// 模型调用失败
    UpstreamCall {
        message: String,
    },
    /// 其他系统错误（兜底）
    System(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound => {
                write!(
                    f,
                    "Paper not found in Arxiv or OpenReview (ICLR/NeurIPS/ICML 2023-2026)"
                )
            }
            AppError::PdfUrlMissing => write!(f, "PDF URL not found"),
            AppError::DownloadFailed => write!(f, "Failed to download PDF"),
            AppError::TemplateMissing => write!(f, "Template not found"),
            AppError::CacheUnrecoverable { display_name } => {
                write!(
                    f,
                    "Cache expired and source file '{}' not found. Cannot reload context.",
                    display_name
                )
            }
            AppError::UpstreamCall { message } => write!(f, "LLM call failed: {}", message),
            AppError::System(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

// ========== 从常见错误类型转换 ==========

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamCall {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::System(format!("JSON parse error: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::System(format!("IO error: {}", err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建模型调用失败错误
    pub fn upstream(message: impl Into<String>) -> Self {
        AppError::UpstreamCall {
            message: message.into(),
        }
    }

    /// 创建系统错误
    pub fn system(message: impl Into<String>) -> Self {
        AppError::System(message.into())
    }

    /// 创建缓存不可恢复错误
    pub fn cache_unrecoverable(display_name: impl Into<String>) -> Self {
        AppError::CacheUnrecoverable {
            display_name: display_name.into(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 同时处理的论文数量
    pub max_concurrent_papers: usize,
    /// 队列为空时的轮询间隔（秒）
    pub idle_poll_secs: u64,
    /// 调度循环出错后的退避时间（秒）
    pub error_backoff_secs: u64,
    /// 数据目录（PDF 文件的根目录）
    pub data_dir: String,
    /// 任务定义文件路径
    pub task_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- Gemini 配置 ---
    pub gemini_api_key: String,
    pub gemini_api_base_url: String,
    /// 任务未指定模型时的默认模型
    pub default_model_name: String,
    /// 远程缓存的 TTL（秒）
    pub cache_ttl_secs: u64,
    /// 单轮回复的最大输出 token 数
    pub max_output_tokens: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_papers: 3,
            idle_poll_secs: 2,
            error_backoff_secs: 5,
            data_dir: "data".to_string(),
            task_file: "tasks.toml".to_string(),
            verbose_logging: false,
            gemini_api_key: String::new(),
            gemini_api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            default_model_name: "gemini-3-flash-preview".to_string(),
            cache_ttl_secs: 600,
            max_output_tokens: 4096,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_papers: std::env::var("MAX_CONCURRENT_PAPERS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_papers),
            idle_poll_secs: std::env::var("IDLE_POLL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.idle_poll_secs),
            error_backoff_secs: std::env::var("ERROR_BACKOFF_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.error_backoff_secs),
            data_dir: std::env::var("DATA_DIR").unwrap_or(default.data_dir),
            task_file: std::env::var("TASK_FILE").unwrap_or(default.task_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or(default.gemini_api_key),
            gemini_api_base_url: std::env::var("GEMINI_API_BASE_URL").unwrap_or(default.gemini_api_base_url),
            default_model_name: std::env::var("DEFAULT_MODEL_NAME").unwrap_or(default.default_model_name),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.cache_ttl_secs),
            max_output_tokens: std::env::var("MAX_OUTPUT_TOKENS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_output_tokens),
        }
    }
}

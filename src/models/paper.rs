use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 论文状态
///
/// 合法迁移：queued → processing → {done, failed, skipped}；
/// 显式重试可将 failed/done 重置回 queued，其余迁移一律非法。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperStatus {
    Queued,
    Processing,
    Done,
    Failed,
    Skipped,
}

impl PaperStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaperStatus::Queued => "queued",
            PaperStatus::Processing => "processing",
            PaperStatus::Done => "done",
            PaperStatus::Failed => "failed",
            PaperStatus::Skipped => "skipped",
        }
    }

    /// 是否为终态（不再被调度器选取）
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaperStatus::Done | PaperStatus::Failed | PaperStatus::Skipped
        )
    }
}

impl std::fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
}

/// 论文记录
///
/// 由摄取层创建；入队后只有流水线可以修改（显式重试除外）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub task_id: String,
    pub title: String,
    /// PDF 的相对路径（相对数据目录，保证可移植）
    pub pdf_path: Option<String>,
    /// 检索来源：arxiv / openreview
    pub source: Option<String>,
    pub source_url: Option<String>,
    pub status: PaperStatus,
    pub failure_reason: Option<String>,
    /// 论文级模板覆盖（优先于任务默认模板）
    pub template_id: Option<String>,
    /// 论文级模型覆盖（优先于任务默认模型）
    pub model_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Paper {
    pub fn new(task_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            title: title.into(),
            pdf_path: None,
            source: None,
            source_url: None,
            status: PaperStatus::Queued,
            failure_reason: None,
            template_id: None,
            model_name: None,
            created_at: Utc::now(),
        }
    }
}

/// 处理任务（对核心只读）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub template_id: Option<String>,
    pub model_name: Option<String>,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            template_id: None,
            model_name: None,
            status: TaskStatus::Created,
        }
    }
}

/// 解读模板（对核心只读）
///
/// content 持久化为单个字符串：JSON 数组表示有序提示词列表，
/// 解析失败时整体视为一条提示词。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
}

impl Template {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// 解析为有序提示词列表
    pub fn prompts(&self) -> Vec<String> {
        match serde_json::from_str::<Vec<String>>(&self.content) {
            Ok(prompts) => prompts,
            Err(_) => vec![self.content.clone()],
        }
    }
}

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// 持久化的聊天消息（每条用户消息和模型回复各一行）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub paper_id: String,
    pub role: ChatRole,
    pub content: String,
    /// 本条消息对应的成本（美元），始终 >= 0
    pub cost: f64,
    /// 本条消息对应的耗时（秒），始终 >= 0
    pub time_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(paper_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_meta(paper_id, ChatRole::User, content, 0.0, 0.0)
    }

    pub fn assistant(
        paper_id: impl Into<String>,
        content: impl Into<String>,
        cost: f64,
        time_cost: f64,
    ) -> Self {
        Self::with_meta(paper_id, ChatRole::Assistant, content, cost, time_cost)
    }

    pub fn with_meta(
        paper_id: impl Into<String>,
        role: ChatRole,
        content: impl Into<String>,
        cost: f64,
        time_cost: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            paper_id: paper_id.into(),
            role,
            content: content.into(),
            cost,
            time_cost,
            created_at: Utc::now(),
        }
    }
}

/// 自动解读结果（每次成功解读写入一条）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interpretation {
    pub id: String,
    pub paper_id: String,
    pub content: String,
    /// 解读时使用的模板内容快照
    pub template_used: String,
    pub created_at: DateTime<Utc>,
}

impl Interpretation {
    pub fn new(
        paper_id: impl Into<String>,
        content: impl Into<String>,
        template_used: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            paper_id: paper_id.into(),
            content: content.into(),
            template_used: template_used.into(),
            created_at: Utc::now(),
        }
    }
}

/// 检索到的论文元数据（Resolver 输出）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperMeta {
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub pdf_url: Option<String>,
    pub source: String,
    pub source_url: String,
    pub published: Option<DateTime<Utc>>,
}

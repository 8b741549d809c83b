use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::paper::{ChatMessage, ChatRole};

/// 远程缓存句柄
///
/// `display_name` 由源文件名确定，是跨重启的唯一稳定标识；
/// `remote_name` 是服务端分配的临时名称，重建后会变化。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHandle {
    pub remote_name: String,
    pub display_name: String,
}

/// 缓存状态（固定形状的变体类型）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CacheState {
    #[default]
    None,
    Active(CacheHandle),
}

impl CacheState {
    pub fn handle(&self) -> Option<&CacheHandle> {
        match self {
            CacheState::None => None,
            CacheState::Active(handle) => Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, CacheState::Active(_))
    }
}

/// 单轮对话的计费元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMeta {
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub time_cost: f64,
    pub model_name: String,
}

impl Default for TurnMeta {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            cost: 0.0,
            time_cost: 0.0,
            model_name: String::new(),
        }
    }
}

/// 一轮对话：用户消息 + 模型回复 + 元数据
///
/// 从持久化消息重建的未完成轮次 `model` 为空字符串，
/// 展平为 API 消息时会跳过空的模型部分。
#[derive(Debug, Clone)]
pub struct Turn {
    pub user: String,
    pub model: String,
    pub meta: TurnMeta,
}

/// 对话历史：至多一个缓存句柄 + 有序轮次列表
///
/// 每次处理运行（或每篇论文的交互式聊天）恰好持有一个实例。
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    pub cache: CacheState,
    pub turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从持久化的扁平消息列表重建轮次
    ///
    /// 配对规则：user 消息与紧随其后的 assistant 消息组成一轮；
    /// 没有前置 user 消息的 assistant 消息被跳过；
    /// 出现第二条未配对的 user 消息时丢弃前一条（有损重同步）；
    /// 末尾未配对的 user 消息保留为一轮未完成的轮次。
    pub fn from_messages(messages: &[ChatMessage]) -> Self {
        let mut turns = Vec::new();
        let mut pending_user: Option<String> = None;

        for msg in messages {
            match msg.role {
                ChatRole::User => {
                    if pending_user.is_some() {
                        tracing::debug!("丢弃未配对的用户消息，重新开始一轮");
                    }
                    pending_user = Some(msg.content.clone());
                }
                ChatRole::Assistant => {
                    if let Some(user) = pending_user.take() {
                        turns.push(Turn {
                            user,
                            model: msg.content.clone(),
                            meta: TurnMeta::default(),
                        });
                    }
                }
                ChatRole::System => {}
            }
        }

        if let Some(user) = pending_user {
            turns.push(Turn {
                user,
                model: String::new(),
                meta: TurnMeta::default(),
            });
        }

        Self {
            cache: CacheState::None,
            turns,
        }
    }
}

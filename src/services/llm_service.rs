//! LLM 对话引擎
//!
//! 在远程上下文缓存之上执行多轮对话：自动解读流水线
//! 逐条跑模板提示词，交互式聊天从持久化消息重建历史。

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::clients::gemini_client::{Content, GeminiBackend};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{ChatMessage, ConversationHistory, Turn, TurnMeta};
use crate::services::cache_service::CacheService;
use crate::services::pricing;
use crate::store::PaperStore;

/// 单轮对话的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    /// 本轮成本（美元）
    pub cost: f64,
    /// 本轮耗时（秒）
    pub time_cost: f64,
}

pub struct LlmService {
    backend: Arc<dyn GeminiBackend>,
    cache: CacheService,
    max_output_tokens: u32,
}

impl LlmService {
    pub fn new(backend: Arc<dyn GeminiBackend>, config: &Config) -> Self {
        Self {
            cache: CacheService::new(backend.clone(), config.cache_ttl_secs),
            backend,
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// 把历史轮次展平为 API 消息序列并追加本轮用户消息
    ///
    /// 未完成轮次的空模型回复会被跳过（API 不接受空消息）。
    fn build_contents(history: &ConversationHistory, user_text: &str) -> Vec<Content> {
        let mut contents = Vec::with_capacity(history.turns.len() * 2 + 1);
        for turn in &history.turns {
            contents.push(Content::user(&turn.user));
            if !turn.model.is_empty() {
                contents.push(Content::model(&turn.model));
            }
        }
        contents.push(Content::user(user_text));
        contents
    }

    /// 执行一轮对话：校验缓存、调用模型、计费并写回历史
    pub async fn chat(
        &self,
        model: &str,
        pdf_path: Option<&Path>,
        text: &str,
        history: &mut ConversationHistory,
    ) -> AppResult<TurnOutcome> {
        let started = Instant::now();

        let cache_created = self.cache.ensure_cache(model, history, pdf_path).await?;

        let contents = Self::build_contents(history, text);
        let cached_name = history.cache.handle().map(|h| h.remote_name.clone());

        let outcome = self
            .backend
            .generate_content(
                model,
                &contents,
                cached_name.as_deref(),
                self.max_output_tokens,
            )
            .await?;

        let cost = pricing::calculate_cost(
            outcome.usage.cached_content_token_count,
            outcome.usage.non_cached_prompt_tokens(),
            outcome.usage.candidates_token_count,
            model,
            cache_created,
        );
        let time_cost = started.elapsed().as_secs_f64();

        debug!(
            "本轮用量: cached={} input={} output={} cost=${:.6} ({:.1}s)",
            outcome.usage.cached_content_token_count,
            outcome.usage.non_cached_prompt_tokens(),
            outcome.usage.candidates_token_count,
            cost,
            time_cost
        );

        history.turns.push(Turn {
            user: text.to_string(),
            model: outcome.text.clone(),
            meta: TurnMeta {
                timestamp: chrono::Utc::now(),
                cost,
                time_cost,
                model_name: model.to_string(),
            },
        });

        Ok(TurnOutcome {
            response: outcome.text,
            cost,
            time_cost,
        })
    }

    /// 自动解读：逐条执行模板提示词，拼装 Markdown 报告
    ///
    /// 任一步骤失败则整体失败，已完成的步骤不保留。
    pub async fn interpret_paper(
        &self,
        model: &str,
        pdf_path: &Path,
        prompts: &[String],
    ) -> AppResult<(String, ConversationHistory)> {
        let mut history = ConversationHistory::new();
        let mut report = String::new();

        for (i, prompt) in prompts.iter().enumerate() {
            info!("📝 解读步骤 {}/{}", i + 1, prompts.len());
            let outcome = self.chat(model, Some(pdf_path), prompt, &mut history).await?;
            report.push_str(&format!(
                "## Step {}\n\n**Prompt:** {}\n\n**Response:**\n{}\n\n---\n\n",
                i + 1,
                prompt,
                outcome.response
            ));
        }

        Ok((report, history))
    }

    /// 交互式聊天：从持久化消息重建历史后执行一轮
    pub async fn chat_with_paper(
        &self,
        model: &str,
        pdf_path: Option<&Path>,
        messages: &[ChatMessage],
        message: &str,
    ) -> AppResult<TurnOutcome> {
        let mut history = ConversationHistory::from_messages(messages);
        self.chat(model, pdf_path, message, &mut history).await
    }

    /// 交互式聊天并持久化双方消息
    ///
    /// 用户消息先落库；模型出错时错误文本作为 assistant 消息
    /// 写入并返回，不向调用方抛错。
    pub async fn chat_and_persist(
        &self,
        store: &dyn PaperStore,
        paper_id: &str,
        model: &str,
        pdf_path: Option<&Path>,
        message: &str,
    ) -> AppResult<String> {
        let existing = store.list_chat_messages(paper_id).await?;
        store
            .add_chat_message(ChatMessage::user(paper_id, message))
            .await?;

        match self.chat_with_paper(model, pdf_path, &existing, message).await {
            Ok(outcome) => {
                store
                    .add_chat_message(ChatMessage::assistant(
                        paper_id,
                        &outcome.response,
                        outcome.cost,
                        outcome.time_cost,
                    ))
                    .await?;
                Ok(outcome.response)
            }
            Err(e) => {
                let error_text = format!("**Error:** {}", e);
                store
                    .add_chat_message(ChatMessage::assistant(paper_id, &error_text, 0.0, 0.0))
                    .await?;
                Ok(error_text)
            }
        }
    }
}

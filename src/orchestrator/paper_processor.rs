//! 单篇论文处理流水线
//!
//! 标题检索 → PDF 下载 → 模板化多轮解读 → 结果落库。
//! 任一环节失败都会把面向用户的原因写回论文记录。

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, Interpretation, Paper, PaperStatus, Template};
use crate::services::{LlmService, PdfService, SearchService};
use crate::store::PaperStore;

/// 流水线依赖集合（调度器按论文分发时共享）
pub struct Pipeline {
    pub search: SearchService,
    pub pdf: PdfService,
    pub llm: LlmService,
}

/// 处理一篇论文（调度器的工作单元入口）
///
/// 通过 `try_mark_processing` 做幂等保护：同一论文被并发
/// 派发两次时，后到者直接返回。
pub async fn process_paper(
    store: Arc<dyn PaperStore>,
    pipeline: Arc<Pipeline>,
    paper_id: String,
    config: Arc<Config>,
) {
    let paper = match store.get_paper(&paper_id).await {
        Ok(Some(paper)) => paper,
        Ok(None) => {
            warn!("⚠️ 论文不存在，跳过: {}", paper_id);
            return;
        }
        Err(e) => {
            error!("❌ 读取论文失败 {}: {}", paper_id, e);
            return;
        }
    };

    match store.try_mark_processing(&paper_id).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!("论文已被其他工作单元接手: {}", paper_id);
            return;
        }
        Err(e) => {
            error!("❌ 状态迁移失败 {}: {}", paper_id, e);
            return;
        }
    }

    info!("🚀 开始处理论文: {}", paper.title);

    // 重新解读前清掉旧的聊天与解读记录
    if let Err(e) = store.clear_paper_artifacts(&paper_id).await {
        error!("❌ 清理历史记录失败 {}: {}", paper_id, e);
    }

    match run_pipeline(&store, &pipeline, &paper, &config).await {
        Ok(()) => {
            if let Err(e) = store.set_status(&paper_id, PaperStatus::Done).await {
                error!("❌ 写入完成状态失败 {}: {}", paper_id, e);
                return;
            }
            info!("✅ 论文处理完成: {}", paper.title);
        }
        Err(e) => {
            let reason = e.to_string();
            error!("❌ 论文处理失败 '{}': {}", paper.title, reason);
            fail_paper(&store, &paper_id, &reason).await;
        }
    }
}

/// 标记失败，并把错误以聊天消息的形式暴露给阅读界面
async fn fail_paper(store: &Arc<dyn PaperStore>, paper_id: &str, reason: &str) {
    if let Err(e) = store.set_failure(paper_id, reason).await {
        error!("❌ 写入失败状态失败 {}: {}", paper_id, e);
    }
    let notice = format!("**Error Processing Paper:** {}", reason);
    if let Err(e) = store
        .add_chat_message(ChatMessage::assistant(paper_id, &notice, 0.0, 0.0))
        .await
    {
        error!("❌ 写入错误消息失败 {}: {}", paper_id, e);
    }
}

async fn run_pipeline(
    store: &Arc<dyn PaperStore>,
    pipeline: &Arc<Pipeline>,
    paper: &Paper,
    config: &Config,
) -> AppResult<()> {
    // 1. 标题检索
    let meta = pipeline
        .search
        .resolve(&paper.title)
        .await
        .ok_or(AppError::NotFound)?;
    store
        .set_source_metadata(&paper.id, &meta.source, &meta.source_url)
        .await?;

    // 2. PDF 下载（相对路径入库，绝对路径落盘）
    let pdf_url = meta
        .pdf_url
        .filter(|u| !u.is_empty())
        .ok_or(AppError::PdfUrlMissing)?;
    let rel_path = format!("pdfs/{}/{}.pdf", paper.task_id, paper.id);
    let abs_path: PathBuf = PathBuf::from(&config.data_dir).join(&rel_path);

    if !pipeline.pdf.download(&pdf_url, &abs_path).await {
        return Err(AppError::DownloadFailed);
    }
    store.set_pdf_path(&paper.id, &rel_path).await?;

    // 3. 模板与模型解析（论文级覆盖优先）
    let task = store
        .get_task(&paper.task_id)
        .await?
        .ok_or_else(|| AppError::system(format!("Task not found: {}", paper.task_id)))?;

    let template = resolve_template(store, paper, &task.template_id).await?;
    let model = paper
        .model_name
        .clone()
        .or_else(|| task.model_name.clone())
        .unwrap_or_else(|| config.default_model_name.clone());

    // 4. 多轮解读
    let prompts = template.prompts();
    info!(
        "📖 使用模型 '{}' 解读，共 {} 个步骤",
        model,
        prompts.len()
    );
    let (report, history) = pipeline
        .llm
        .interpret_paper(&model, &abs_path, &prompts)
        .await?;

    // 5. 结果落库：报告 + 逐轮对话记录
    store
        .add_interpretation(Interpretation::new(&paper.id, &report, &template.content))
        .await?;

    for turn in &history.turns {
        if turn.model.is_empty() {
            continue;
        }
        store
            .add_chat_message(ChatMessage::user(&paper.id, &turn.user))
            .await?;
        store
            .add_chat_message(ChatMessage::assistant(
                &paper.id,
                &turn.model,
                turn.meta.cost,
                turn.meta.time_cost,
            ))
            .await?;
    }

    Ok(())
}

async fn resolve_template(
    store: &Arc<dyn PaperStore>,
    paper: &Paper,
    task_template_id: &Option<String>,
) -> AppResult<Template> {
    let template_id = paper
        .template_id
        .as_ref()
        .or(task_template_id.as_ref())
        .ok_or(AppError::TemplateMissing)?;
    store
        .get_template(template_id)
        .await?
        .ok_or(AppError::TemplateMissing)
}

//! 持久层契约与内存实现
//!
//! 核心流水线只通过 [`PaperStore`] 读写记录，不关心具体存储；
//! 真实部署中由数据库实现，本 crate 附带 [`MemoryStore`] 用于运行与测试。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::paper::{
    ChatMessage, Interpretation, Paper, PaperStatus, Task, TaskStatus, Template,
};

/// 持久层接口（外部协作者契约）
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// 选取所属任务处于 running 状态的 queued 论文（按创建顺序，至多 limit 个）
    async fn select_queued(&self, limit: usize) -> AppResult<Vec<Paper>>;

    /// 原子地将论文从 queued 迁移到 processing，返回是否成功
    ///
    /// 对同一篇论文的并发二次派发会拿到 false（幂等保护）。
    async fn try_mark_processing(&self, paper_id: &str) -> AppResult<bool>;

    async fn get_paper(&self, paper_id: &str) -> AppResult<Option<Paper>>;

    async fn set_status(&self, paper_id: &str, status: PaperStatus) -> AppResult<()>;

    /// 标记失败并记录面向用户的原因
    async fn set_failure(&self, paper_id: &str, reason: &str) -> AppResult<()>;

    async fn set_source_metadata(
        &self,
        paper_id: &str,
        source: &str,
        source_url: &str,
    ) -> AppResult<()>;

    async fn set_pdf_path(&self, paper_id: &str, path: &str) -> AppResult<()>;

    async fn get_task(&self, task_id: &str) -> AppResult<Option<Task>>;

    async fn get_template(&self, template_id: &str) -> AppResult<Option<Template>>;

    async fn add_chat_message(&self, message: ChatMessage) -> AppResult<()>;

    /// 按创建顺序返回一篇论文的全部聊天消息
    async fn list_chat_messages(&self, paper_id: &str) -> AppResult<Vec<ChatMessage>>;

    async fn add_interpretation(&self, interpretation: Interpretation) -> AppResult<()>;

    async fn list_interpretations(&self, paper_id: &str) -> AppResult<Vec<Interpretation>>;

    /// 清除论文已有的聊天与解读记录（重新解读前调用）
    async fn clear_paper_artifacts(&self, paper_id: &str) -> AppResult<()>;

    /// 显式重试：failed/done → queued，清空失败原因，可覆盖模板/模型
    ///
    /// 幂等：对已是 queued 的论文再次调用是空操作，返回 true；
    /// 对 processing 状态的论文返回 false。
    async fn retry_paper(
        &self,
        paper_id: &str,
        template_id: Option<String>,
        model_name: Option<String>,
    ) -> AppResult<bool>;
}

#[derive(Default)]
struct StoreInner {
    papers: HashMap<String, Paper>,
    tasks: HashMap<String, Task>,
    templates: HashMap<String, Template>,
    chat_messages: Vec<ChatMessage>,
    interpretations: Vec<Interpretation>,
}

/// 内存存储实现
///
/// 单进程、单调度器场景下 `try_mark_processing` 的条件更新在
/// Mutex 内完成，因此是原子的；多实例部署不在支持范围内。
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // 锁中毒只可能发生在持锁代码 panic 之后，数据本身仍然可用
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ========== 摄取辅助（供任务装载与测试使用） ==========

    pub fn insert_task(&self, task: Task) {
        self.lock().tasks.insert(task.id.clone(), task);
    }

    pub fn insert_template(&self, template: Template) {
        self.lock().templates.insert(template.id.clone(), template);
    }

    pub fn insert_paper(&self, paper: Paper) {
        self.lock().papers.insert(paper.id.clone(), paper);
    }
}

#[async_trait]
impl PaperStore for MemoryStore {
    async fn select_queued(&self, limit: usize) -> AppResult<Vec<Paper>> {
        let inner = self.lock();
        let mut queued: Vec<Paper> = inner
            .papers
            .values()
            .filter(|p| p.status == PaperStatus::Queued)
            .filter(|p| {
                inner
                    .tasks
                    .get(&p.task_id)
                    .map(|t| t.status == TaskStatus::Running)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        queued.truncate(limit);
        Ok(queued)
    }

    async fn try_mark_processing(&self, paper_id: &str) -> AppResult<bool> {
        let mut inner = self.lock();
        match inner.papers.get_mut(paper_id) {
            Some(paper) if paper.status == PaperStatus::Queued => {
                paper.status = PaperStatus::Processing;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_paper(&self, paper_id: &str) -> AppResult<Option<Paper>> {
        Ok(self.lock().papers.get(paper_id).cloned())
    }

    async fn set_status(&self, paper_id: &str, status: PaperStatus) -> AppResult<()> {
        if let Some(paper) = self.lock().papers.get_mut(paper_id) {
            paper.status = status;
        }
        Ok(())
    }

    async fn set_failure(&self, paper_id: &str, reason: &str) -> AppResult<()> {
        if let Some(paper) = self.lock().papers.get_mut(paper_id) {
            paper.status = PaperStatus::Failed;
            paper.failure_reason = Some(reason.to_string());
        }
        Ok(())
    }

    async fn set_source_metadata(
        &self,
        paper_id: &str,
        source: &str,
        source_url: &str,
    ) -> AppResult<()> {
        if let Some(paper) = self.lock().papers.get_mut(paper_id) {
            paper.source = Some(source.to_string());
            paper.source_url = Some(source_url.to_string());
        }
        Ok(())
    }

    async fn set_pdf_path(&self, paper_id: &str, path: &str) -> AppResult<()> {
        if let Some(paper) = self.lock().papers.get_mut(paper_id) {
            paper.pdf_path = Some(path.to_string());
        }
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> AppResult<Option<Task>> {
        Ok(self.lock().tasks.get(task_id).cloned())
    }

    async fn get_template(&self, template_id: &str) -> AppResult<Option<Template>> {
        Ok(self.lock().templates.get(template_id).cloned())
    }

    async fn add_chat_message(&self, message: ChatMessage) -> AppResult<()> {
        self.lock().chat_messages.push(message);
        Ok(())
    }

    async fn list_chat_messages(&self, paper_id: &str) -> AppResult<Vec<ChatMessage>> {
        Ok(self
            .lock()
            .chat_messages
            .iter()
            .filter(|m| m.paper_id == paper_id)
            .cloned()
            .collect())
    }

    async fn add_interpretation(&self, interpretation: Interpretation) -> AppResult<()> {
        self.lock().interpretations.push(interpretation);
        Ok(())
    }

    async fn list_interpretations(&self, paper_id: &str) -> AppResult<Vec<Interpretation>> {
        Ok(self
            .lock()
            .interpretations
            .iter()
            .filter(|i| i.paper_id == paper_id)
            .cloned()
            .collect())
    }

    async fn clear_paper_artifacts(&self, paper_id: &str) -> AppResult<()> {
        let mut inner = self.lock();
        inner.chat_messages.retain(|m| m.paper_id != paper_id);
        inner.interpretations.retain(|i| i.paper_id != paper_id);
        Ok(())
    }

    async fn retry_paper(
        &self,
        paper_id: &str,
        template_id: Option<String>,
        model_name: Option<String>,
    ) -> AppResult<bool> {
        let mut inner = self.lock();
        let Some(paper) = inner.papers.get_mut(paper_id) else {
            return Ok(false);
        };
        match paper.status {
            PaperStatus::Failed | PaperStatus::Done | PaperStatus::Skipped => {
                paper.status = PaperStatus::Queued;
                paper.failure_reason = None;
                if template_id.is_some() {
                    paper.template_id = template_id;
                }
                if model_name.is_some() {
                    paper.model_name = model_name;
                }
                Ok(true)
            }
            // 已在队列中：幂等空操作
            PaperStatus::Queued => Ok(true),
            PaperStatus::Processing => Ok(false),
        }
    }
}

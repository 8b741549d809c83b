use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

use crate::models::paper::{Paper, Task, TaskStatus, Template};
use crate::store::MemoryStore;

/// 任务定义文件结构
///
/// ```toml
/// [task]
/// name = "ICLR 2025 精读"
/// model_name = "gemini-3-flash-preview"   # 可选
///
/// [template]
/// name = "默认模板"
/// prompts = ["请总结这篇论文的核心贡献", "请分析实验设计的不足"]
///
/// [[papers]]
/// title = "Attention Is All You Need"
/// ```
#[derive(Debug, Deserialize)]
pub struct TaskFile {
    pub task: TaskDef,
    pub template: TemplateDef,
    #[serde(default)]
    pub papers: Vec<PaperDef>,
}

#[derive(Debug, Deserialize)]
pub struct TaskDef {
    pub name: String,
    pub model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateDef {
    #[serde(default = "default_template_name")]
    pub name: String,
    pub prompts: Vec<String>,
}

fn default_template_name() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub struct PaperDef {
    pub title: String,
    /// 论文级模型覆盖
    pub model_name: Option<String>,
}

/// 从 TOML 文件加载任务定义并写入存储，返回任务 id
///
/// 任务直接以 running 状态入库，论文全部为 queued，
/// 调度器下一次轮询即开始处理。
pub async fn load_task_file(path: &Path, store: &MemoryStore) -> Result<String> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取任务文件: {}", path.display()))?;

    let task_file: TaskFile = toml::from_str(&content)
        .with_context(|| format!("无法解析任务文件: {}", path.display()))?;

    // 模板内容持久化为 JSON 数组字符串
    let template = Template::new(
        &task_file.template.name,
        serde_json::to_string(&task_file.template.prompts)?,
    );

    let mut task = Task::new(&task_file.task.name);
    task.template_id = Some(template.id.clone());
    task.model_name = task_file.task.model_name.clone();
    task.status = TaskStatus::Running;
    let task_id = task.id.clone();

    tracing::info!(
        "已加载任务 '{}'：{} 篇论文，{} 条提示词",
        task_file.task.name,
        task_file.papers.len(),
        task_file.template.prompts.len()
    );

    store.insert_template(template);
    store.insert_task(task);

    for paper_def in &task_file.papers {
        let mut paper = Paper::new(&task_id, &paper_def.title);
        paper.model_name = paper_def.model_name.clone();
        store.insert_paper(paper);
    }

    Ok(task_id)
}

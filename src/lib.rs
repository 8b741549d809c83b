//! 论文自动解读服务
//!
//! 按任务批量处理论文：标题检索（arXiv / OpenReview）→ PDF 下载 →
//! 基于 Gemini 上下文缓存的多轮模板解读 → 结果与逐轮对话落库，
//! 并支持针对单篇论文的交互式追问。
//!
//! # 架构
//!
//! ```text
//! orchestrator/   调度器与单篇流水线
//!   batch_processor   轮询 + 信号量并发 + 停机信号
//!   paper_processor   检索 → 下载 → 解读 → 落库
//! services/       领域服务
//!   search_service    数据源组合与标题精确匹配
//!   arxiv_service     arXiv Atom API
//!   openreview_service  OpenReview v2/v1 API
//!   pdf_service       PDF 下载与魔数校验
//!   cache_service     远程上下文缓存的建立 / 挂接 / 重建
//!   llm_service       多轮对话、计费与报告拼装
//!   pricing           分档计费表
//! clients/        外部接口封装
//!   gemini_client     v1beta REST（files / cachedContents / generate）
//! models/         数据模型与任务文件装载
//! store           持久层契约与内存实现
//! ```

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use orchestrator::{Pipeline, Scheduler};
pub use store::{MemoryStore, PaperStore};

//! 端到端集成测试
//!
//! 用内存存储 + 桩数据源 + 模拟模型后端跑完整流水线，
//! 校验状态迁移、失败原因与产物落库。

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use paper_reader::clients::gemini_client::{
    CacheInfo, Content, GeminiBackend, GenerateOutcome, UsageMetadata,
};
use paper_reader::error::{AppError, AppResult};
use paper_reader::models::paper::{
    ChatRole, Paper, PaperMeta, PaperStatus, Task, TaskStatus, Template,
};
use paper_reader::orchestrator::{Pipeline, Scheduler};
use paper_reader::services::{
    LlmService, PdfService, SearchProvider, SearchService,
};
use paper_reader::store::{MemoryStore, PaperStore};
use paper_reader::Config;

// ========== 测试桩 ==========

/// 固定返回一条元数据（或永远未命中）的数据源
struct StubProvider {
    meta: Option<PaperMeta>,
}

#[async_trait]
impl SearchProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn search(&self, _title: &str) -> AppResult<Option<PaperMeta>> {
        Ok(self.meta.clone())
    }
}

/// 模拟 Gemini 后端：内存缓存列表 + 固定回复
#[derive(Default)]
struct FakeBackend {
    caches: Mutex<Vec<CacheInfo>>,
    create_calls: AtomicUsize,
    counter: AtomicUsize,
}

#[async_trait]
impl GeminiBackend for FakeBackend {
    async fn list_caches(&self) -> AppResult<Vec<CacheInfo>> {
        Ok(self.caches.lock().unwrap().clone())
    }

    async fn create_pdf_cache(
        &self,
        _model: &str,
        pdf_path: &Path,
        _ttl_secs: u64,
    ) -> AppResult<CacheInfo> {
        if !pdf_path.exists() {
            return Err(AppError::system("missing pdf"));
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let cache = CacheInfo {
            name: format!("cachedContents/test-{}", n),
            display_name: pdf_path
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default(),
        };
        self.caches.lock().unwrap().push(cache.clone());
        Ok(cache)
    }

    async fn generate_content(
        &self,
        _model: &str,
        contents: &[Content],
        _cached_content: Option<&str>,
        _max_output_tokens: u32,
    ) -> AppResult<GenerateOutcome> {
        // 回复里带上轮次序号，便于断言报告内容
        let text = format!("对第 {} 条消息的回复", contents.len());
        Ok(GenerateOutcome {
            text,
            usage: UsageMetadata {
                prompt_token_count: 10_000,
                cached_content_token_count: 9_000,
                candidates_token_count: 500,
            },
        })
    }
}

/// 起一个回应固定 PDF 字节的本地 HTTP 服务
async fn serve_pdf_once() -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let body = b"%PDF-1.5 integration test body";
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        if let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(body).await;
            let _ = stream.shutdown().await;
        }
    });
    format!("http://{}/paper.pdf", addr)
}

fn found_meta(pdf_url: Option<String>) -> PaperMeta {
    PaperMeta {
        title: "Attention Is All You Need".to_string(),
        authors: vec!["Ashish Vaswani".to_string()],
        abstract_text: "The dominant sequence transduction models...".to_string(),
        pdf_url,
        source: "arxiv".to_string(),
        source_url: "http://arxiv.org/abs/1706.03762".to_string(),
        published: None,
    }
}

struct TestEnv {
    store: Arc<MemoryStore>,
    scheduler: Scheduler,
    paper_id: String,
    backend: Arc<FakeBackend>,
    _data_dir: tempfile::TempDir,
}

/// 组装一套完整环境：一个 running 任务、两条提示词、一篇 queued 论文
fn build_env(meta: Option<PaperMeta>) -> TestEnv {
    let data_dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: data_dir.path().to_string_lossy().to_string(),
        ..Config::default()
    };

    let store = Arc::new(MemoryStore::new());
    let template = Template::new("默认模板", r#"["请总结论文", "请分析不足"]"#);
    let mut task = Task::new("集成测试任务");
    task.template_id = Some(template.id.clone());
    task.status = TaskStatus::Running;
    let task_id = task.id.clone();
    store.insert_template(template);
    store.insert_task(task);

    let paper = Paper::new(&task_id, "Attention Is All You Need");
    let paper_id = paper.id.clone();
    store.insert_paper(paper);

    let backend = Arc::new(FakeBackend::default());
    let pipeline = Pipeline {
        search: SearchService::new(vec![Box::new(StubProvider { meta })]),
        pdf: PdfService::new(),
        llm: LlmService::new(backend.clone() as Arc<dyn GeminiBackend>, &config),
    };
    let scheduler = Scheduler::new(config, store.clone() as Arc<dyn PaperStore>, pipeline);

    TestEnv {
        store,
        scheduler,
        paper_id,
        backend,
        _data_dir: data_dir,
    }
}

// ========== 测试用例 ==========

#[tokio::test]
async fn test_full_pipeline_success() {
    let pdf_url = serve_pdf_once().await;
    let env = build_env(Some(found_meta(Some(pdf_url))));

    let processed = env.scheduler.run_once().await.unwrap();
    assert_eq!(processed, 1);

    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Done);
    assert!(paper.failure_reason.is_none());
    assert_eq!(paper.source.as_deref(), Some("arxiv"));
    assert!(paper
        .pdf_path
        .as_deref()
        .unwrap()
        .starts_with("pdfs/"));

    // 解读报告：每条提示词一个 Step 小节
    let interpretations = env.store.list_interpretations(&env.paper_id).await.unwrap();
    assert_eq!(interpretations.len(), 1);
    let report = &interpretations[0].content;
    assert!(report.contains("## Step 1"));
    assert!(report.contains("**Prompt:** 请总结论文"));
    assert!(report.contains("## Step 2"));

    // 逐轮对话落库：两轮 = 四条消息，user/assistant 交替
    let messages = env.store.list_chat_messages(&env.paper_id).await.unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, ChatRole::User);
    assert_eq!(messages[1].role, ChatRole::Assistant);
    assert!(messages[1].cost > 0.0);

    // 整个解读过程只建一次缓存
    assert_eq!(env.backend.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_paper_not_found_fails_with_reason() {
    let env = build_env(None);

    env.scheduler.run_once().await.unwrap();

    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Failed);
    assert_eq!(
        paper.failure_reason.as_deref(),
        Some("Paper not found in Arxiv or OpenReview (ICLR/NeurIPS/ICML 2023-2026)")
    );

    // 错误以 assistant 消息的形式暴露给阅读界面
    let messages = env.store.list_chat_messages(&env.paper_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, ChatRole::Assistant);
    assert!(messages[0]
        .content
        .starts_with("**Error Processing Paper:**"));

    assert!(env.store.list_interpretations(&env.paper_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_pdf_url_fails_with_reason() {
    let env = build_env(Some(found_meta(None)));

    env.scheduler.run_once().await.unwrap();

    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Failed);
    assert_eq!(paper.failure_reason.as_deref(), Some("PDF URL not found"));
    // 检索成功的元数据仍然保留
    assert_eq!(paper.source.as_deref(), Some("arxiv"));
}

#[tokio::test]
async fn test_download_failure_fails_with_reason() {
    // 无人监听的端口
    let env = build_env(Some(found_meta(Some(
        "http://127.0.0.1:1/paper.pdf".to_string(),
    ))));

    env.scheduler.run_once().await.unwrap();

    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Failed);
    assert_eq!(
        paper.failure_reason.as_deref(),
        Some("Failed to download PDF")
    );
}

#[tokio::test]
async fn test_run_once_leaves_papers_in_terminal_state() {
    let env = build_env(None);

    let processed = env.scheduler.run_once().await.unwrap();
    assert_eq!(processed, 1);

    // 一轮跑完后不存在停留在 processing 的论文
    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert!(paper.status.is_terminal());

    // 队列已空
    assert_eq!(env.scheduler.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_retry_after_failure_reprocesses() {
    let pdf_url = serve_pdf_once().await;
    let env = build_env(None);

    env.scheduler.run_once().await.unwrap();
    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Failed);

    // 重试会清空失败原因并重新入队；此时旧的错误消息仍在
    assert!(env.store.retry_paper(&env.paper_id, None, None).await.unwrap());
    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Queued);
    assert!(paper.failure_reason.is_none());
    assert_eq!(
        env.store.list_chat_messages(&env.paper_id).await.unwrap().len(),
        1
    );

    // 数据源恢复后重跑：成功，旧记录被清理重建
    let env2 = build_env(Some(found_meta(Some(pdf_url))));
    env2.scheduler.run_once().await.unwrap();
    let paper = env2.store.get_paper(&env2.paper_id).await.unwrap().unwrap();
    assert_eq!(paper.status, PaperStatus::Done);
}

#[tokio::test]
async fn test_interactive_chat_persists_history() {
    let pdf_url = serve_pdf_once().await;
    let env = build_env(Some(found_meta(Some(pdf_url))));
    env.scheduler.run_once().await.unwrap();

    let paper = env.store.get_paper(&env.paper_id).await.unwrap().unwrap();
    let abs_path = env._data_dir.path().join(paper.pdf_path.as_deref().unwrap());

    let config = Config {
        data_dir: env._data_dir.path().to_string_lossy().to_string(),
        ..Config::default()
    };
    let llm = LlmService::new(env.backend.clone() as Arc<dyn GeminiBackend>, &config);

    let before = env.store.list_chat_messages(&env.paper_id).await.unwrap().len();
    let reply = llm
        .chat_and_persist(
            env.store.as_ref(),
            &env.paper_id,
            "gemini-3-flash-preview",
            Some(&abs_path),
            "实验部分有什么亮点？",
        )
        .await
        .unwrap();
    assert!(!reply.is_empty());
    assert!(!reply.starts_with("**Error:**"));

    let messages = env.store.list_chat_messages(&env.paper_id).await.unwrap();
    assert_eq!(messages.len(), before + 2);
    assert_eq!(messages[messages.len() - 2].role, ChatRole::User);
    assert_eq!(messages[messages.len() - 1].role, ChatRole::Assistant);
}

#[tokio::test]
async fn test_chat_error_recorded_as_message() {
    let env = build_env(None);
    let config = Config::default();
    let llm = LlmService::new(env.backend.clone() as Arc<dyn GeminiBackend>, &config);

    // PDF 文件不存在，缓存建立失败
    let reply = llm
        .chat_and_persist(
            env.store.as_ref(),
            &env.paper_id,
            "gemini-3-flash-preview",
            Some(Path::new("/nonexistent/paper.pdf")),
            "你好",
        )
        .await
        .unwrap();
    assert!(reply.starts_with("**Error:**"));

    let messages = env.store.list_chat_messages(&env.paper_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[1].content.starts_with("**Error:**"));
}

#[tokio::test]
async fn test_scheduler_shutdown_stops_loop() {
    let env = build_env(None);
    let scheduler = Arc::new(env.scheduler);

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    // 让主循环至少跑过一轮
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    scheduler.shutdown();

    tokio::time::timeout(std::time::Duration::from_secs(5), runner)
        .await
        .expect("调度器应在停机信号后退出")
        .unwrap();
}

use std::path::Path;
use std::sync::Arc;

use paper_reader::clients::GeminiClient;
use paper_reader::models::load_task_file;
use paper_reader::orchestrator::{Pipeline, Scheduler};
use paper_reader::services::{
    ArxivProvider, LlmService, OpenReviewProvider, PdfService, SearchService,
};
use paper_reader::store::{MemoryStore, PaperStore};
use paper_reader::utils::logging;
use paper_reader::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    logging::init(&config);
    logging::log_startup(&config);

    if config.gemini_api_key.is_empty() {
        anyhow::bail!("GEMINI_API_KEY 未设置");
    }

    // 装载任务定义
    let store = Arc::new(MemoryStore::new());
    let task_id = load_task_file(Path::new(&config.task_file), store.as_ref()).await?;
    tracing::info!("📦 任务已入队: {}", task_id);

    // 组装流水线
    let backend = Arc::new(GeminiClient::new(&config));
    let pipeline = Pipeline {
        search: SearchService::new(vec![
            Box::new(ArxivProvider::new()),
            Box::new(OpenReviewProvider::new()),
        ]),
        pdf: PdfService::new(),
        llm: LlmService::new(backend, &config),
    };

    let scheduler = Arc::new(Scheduler::new(
        config,
        store.clone() as Arc<dyn PaperStore>,
        pipeline,
    ));

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("收到退出信号，等待当前批次完成...");
    scheduler.shutdown();
    runner.await?;

    Ok(())
}

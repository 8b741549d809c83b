//! 批量调度器
//!
//! 轮询存储中的待处理论文，受信号量约束并发处理，
//! 空轮次按空闲间隔休眠，出错按退避间隔休眠。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::orchestrator::paper_processor::{process_paper, Pipeline};
use crate::store::PaperStore;

pub struct Scheduler {
    config: Arc<Config>,
    store: Arc<dyn PaperStore>,
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(config: Config, store: Arc<dyn PaperStore>, pipeline: Pipeline) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_papers));
        Self {
            config: Arc::new(config),
            store,
            pipeline: Arc::new(pipeline),
            semaphore,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// 主循环：直到收到停机信号才返回
    pub async fn run(&self) {
        info!(
            "🚀 调度器启动（并发上限 {}，空闲轮询 {}s）",
            self.config.max_concurrent_papers, self.config.idle_poll_secs
        );

        let mut shutdown = self.shutdown_rx.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_secs = match self.run_once().await {
                Ok(0) => self.config.idle_poll_secs,
                Ok(count) => {
                    info!("📦 本轮处理了 {} 篇论文", count);
                    // 有产出时立即查看下一批
                    0
                }
                Err(e) => {
                    error!("❌ 调度轮次失败: {}", e);
                    self.config.error_backoff_secs
                }
            };

            if sleep_secs > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(sleep_secs)) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!("🛑 调度器已停止");
    }

    /// 执行一轮：选取待处理论文并全部跑完，返回处理数量
    pub async fn run_once(&self) -> AppResult<usize> {
        let batch = self
            .store
            .select_queued(self.config.max_concurrent_papers)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let count = batch.len();
        let mut handles = Vec::with_capacity(count);
        for paper in batch {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("⚠️ 信号量已关闭，停止派发");
                    break;
                }
            };
            let store = self.store.clone();
            let pipeline = self.pipeline.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                process_paper(store, pipeline, paper.id, config).await;
            }));
        }

        // 屏障：等本轮全部完成再进入下一轮
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("❌ 工作单元 panic: {}", e);
            }
        }

        Ok(count)
    }

    /// 请求停机：当前轮次跑完后主循环退出
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

//! 远程上下文缓存管理
//!
//! 每轮对话前核对远程缓存的存活状态：未建则建，
//! 过期则用本地 PDF 重建，源文件丢失则报不可恢复。

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clients::gemini_client::{CacheInfo, GeminiBackend};
use crate::error::{AppError, AppResult};
use crate::models::{CacheHandle, CacheState, ConversationHistory};

pub struct CacheService {
    backend: Arc<dyn GeminiBackend>,
    ttl_secs: u64,
}

impl CacheService {
    pub fn new(backend: Arc<dyn GeminiBackend>, ttl_secs: u64) -> Self {
        Self { backend, ttl_secs }
    }

    /// 确保会话持有一个存活的远程缓存
    ///
    /// 返回本轮是否创建（或重建）了缓存——创建轮的缓存 token
    /// 按输入价计费。没有 PDF 的会话不走缓存，直接返回 false。
    pub async fn ensure_cache(
        &self,
        model: &str,
        history: &mut ConversationHistory,
        pdf_path: Option<&Path>,
    ) -> AppResult<bool> {
        // 列表查询失败按"全部过期"处理，走重建路径兜底
        let alive = match self.backend.list_caches().await {
            Ok(caches) => caches,
            Err(e) => {
                warn!("⚠️ 缓存列表查询失败，按全部过期处理: {}", e);
                Vec::new()
            }
        };

        match history.cache.clone() {
            CacheState::None => {
                let Some(path) = pdf_path else {
                    // 无 PDF 的纯文本会话
                    return Ok(false);
                };
                let display_name = file_display_name(path)?;

                // 其他会话可能已为同一文件建过缓存，按 displayName 复用
                if let Some(existing) =
                    alive.iter().find(|c| c.display_name == display_name)
                {
                    debug!("挂接已有缓存: {} ({})", display_name, existing.name);
                    history.cache = CacheState::Active(handle_of(existing));
                    return Ok(false);
                }

                info!("🚀 创建上下文缓存: {}", display_name);
                let created = self
                    .backend
                    .create_pdf_cache(model, path, self.ttl_secs)
                    .await?;
                history.cache = CacheState::Active(handle_of(&created));
                Ok(true)
            }
            CacheState::Active(handle) => {
                if alive.iter().any(|c| c.name == handle.remote_name) {
                    if let Some(path) = pdf_path {
                        if let Ok(name) = file_display_name(path) {
                            if name != handle.display_name {
                                // 会话已绑定文档，后续传入的其他文档不生效
                                debug!(
                                    "会话已绑定 '{}'，忽略新文档 '{}'",
                                    handle.display_name, name
                                );
                            }
                        }
                    }
                    return Ok(false);
                }

                // 远程缓存已过期
                match pdf_path.filter(|p| p.exists()) {
                    Some(path) => {
                        info!("⚠️ 缓存已过期，重建: {}", handle.display_name);
                        let created = self
                            .backend
                            .create_pdf_cache(model, path, self.ttl_secs)
                            .await?;
                        history.cache = CacheState::Active(handle_of(&created));
                        Ok(true)
                    }
                    None => {
                        history.cache = CacheState::None;
                        Err(AppError::cache_unrecoverable(&handle.display_name))
                    }
                }
            }
        }
    }
}

fn file_display_name(path: &Path) -> AppResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| AppError::system(format!("Path has no file name: {}", path.display())))
}

fn handle_of(info: &CacheInfo) -> CacheHandle {
    CacheHandle {
        remote_name: info.name.clone(),
        display_name: info.display_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::gemini_client::mock::MockBackend;
    use std::io::Write;

    fn pdf_file(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"%PDF-1.5 test").unwrap();
        path
    }

    fn service(backend: &Arc<MockBackend>) -> CacheService {
        CacheService::new(backend.clone() as Arc<dyn GeminiBackend>, 600)
    }

    #[tokio::test]
    async fn test_first_turn_creates_cache() {
        let backend = Arc::new(MockBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let pdf = pdf_file(&dir, "paper.pdf");
        let mut history = ConversationHistory::default();

        let created = service(&backend)
            .ensure_cache("gemini-3-flash-preview", &mut history, Some(&pdf))
            .await
            .unwrap();

        assert!(created);
        assert!(history.cache.is_active());
        assert_eq!(
            backend.create_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_attaches_to_existing_cache_by_display_name() {
        let backend = Arc::new(MockBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let pdf = pdf_file(&dir, "paper.pdf");

        // 另一个会话先为同一文件建了缓存
        let mut other = ConversationHistory::default();
        service(&backend)
            .ensure_cache("gemini-3-flash-preview", &mut other, Some(&pdf))
            .await
            .unwrap();

        let mut history = ConversationHistory::default();
        let created = service(&backend)
            .ensure_cache("gemini-3-flash-preview", &mut history, Some(&pdf))
            .await
            .unwrap();

        assert!(!created);
        assert_eq!(
            history.cache.handle().unwrap().remote_name,
            other.cache.handle().unwrap().remote_name
        );
        assert_eq!(
            backend.create_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_alive_cache_is_noop() {
        let backend = Arc::new(MockBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let pdf = pdf_file(&dir, "paper.pdf");
        let mut history = ConversationHistory::default();

        let svc = service(&backend);
        svc.ensure_cache("m", &mut history, Some(&pdf)).await.unwrap();
        let created = svc.ensure_cache("m", &mut history, Some(&pdf)).await.unwrap();

        assert!(!created);
        assert_eq!(
            backend.create_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_expired_cache_is_rebuilt_from_source() {
        let backend = Arc::new(MockBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let pdf = pdf_file(&dir, "paper.pdf");
        let mut history = ConversationHistory::default();

        let svc = service(&backend);
        svc.ensure_cache("m", &mut history, Some(&pdf)).await.unwrap();
        let first = history.cache.handle().unwrap().remote_name.clone();

        backend.expire_all();
        let created = svc.ensure_cache("m", &mut history, Some(&pdf)).await.unwrap();

        assert!(created, "重建轮按创建计费");
        assert_ne!(history.cache.handle().unwrap().remote_name, first);
    }

    #[tokio::test]
    async fn test_expired_cache_without_source_is_unrecoverable() {
        let backend = Arc::new(MockBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let pdf = pdf_file(&dir, "paper.pdf");
        let mut history = ConversationHistory::default();

        let svc = service(&backend);
        svc.ensure_cache("m", &mut history, Some(&pdf)).await.unwrap();

        backend.expire_all();
        std::fs::remove_file(&pdf).unwrap();

        let err = svc
            .ensure_cache("m", &mut history, Some(&pdf))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cache expired and source file 'paper.pdf' not found. Cannot reload context."
        );
        // 状态回落到无缓存，后续若文件恢复可重新建立
        assert!(!history.cache.is_active());
    }

    #[tokio::test]
    async fn test_no_pdf_session_skips_caching() {
        let backend = Arc::new(MockBackend::new());
        let mut history = ConversationHistory::default();

        let created = service(&backend)
            .ensure_cache("m", &mut history, None)
            .await
            .unwrap();

        assert!(!created);
        assert!(!history.cache.is_active());
    }

    #[tokio::test]
    async fn test_second_document_is_ignored() {
        let backend = Arc::new(MockBackend::new());
        let dir = tempfile::tempdir().unwrap();
        let first = pdf_file(&dir, "first.pdf");
        let second = pdf_file(&dir, "second.pdf");
        let mut history = ConversationHistory::default();

        let svc = service(&backend);
        svc.ensure_cache("m", &mut history, Some(&first)).await.unwrap();
        let bound = history.cache.handle().unwrap().display_name.clone();

        svc.ensure_cache("m", &mut history, Some(&second)).await.unwrap();
        assert_eq!(history.cache.handle().unwrap().display_name, bound);
        assert_eq!(
            backend.create_calls.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }
}

//! 论文检索服务
//!
//! 按优先级依次向各数据源查询论文标题，返回第一个
//! 标准化标题精确匹配的结果。

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::PaperMeta;

/// 标准化标题：仅保留 ASCII 字母数字并转小写
///
/// 用于跨数据源的标题比对，抹平大小写、空格和标点差异。
pub fn normalize_title(title: &str) -> String {
    title
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// 单个论文数据源
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// 数据源名称（用于日志）
    fn name(&self) -> &'static str;

    /// 按标题检索，返回最相关的一条候选（可能标题不匹配）
    async fn search(&self, title: &str) -> AppResult<Option<PaperMeta>>;
}

/// 组合检索服务
pub struct SearchService {
    providers: Vec<Box<dyn SearchProvider>>,
}

impl SearchService {
    pub fn new(providers: Vec<Box<dyn SearchProvider>>) -> Self {
        Self { providers }
    }

    /// 依次查询各数据源，返回首个标题精确匹配的结果
    ///
    /// 单个数据源报错只记录警告并继续下一个，不中断整体检索。
    pub async fn resolve(&self, title: &str) -> Option<PaperMeta> {
        let wanted = normalize_title(title);

        for provider in &self.providers {
            match provider.search(title).await {
                Ok(Some(meta)) => {
                    if normalize_title(&meta.title) == wanted {
                        info!("✅ 在 {} 找到论文: {}", provider.name(), meta.title);
                        return Some(meta);
                    }
                    info!(
                        "{} 返回的候选标题不匹配: '{}' != '{}'",
                        provider.name(),
                        meta.title,
                        title
                    );
                }
                Ok(None) => {
                    info!("{} 未找到论文: {}", provider.name(), title);
                }
                Err(e) => {
                    warn!("⚠️ {} 检索失败: {}", provider.name(), e);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    struct StubProvider {
        name: &'static str,
        result: Result<Option<PaperMeta>, ()>,
    }

    fn meta(title: &str) -> PaperMeta {
        PaperMeta {
            title: title.to_string(),
            authors: vec!["A. Author".to_string()],
            abstract_text: String::new(),
            pdf_url: Some("https://example.org/p.pdf".to_string()),
            source: "stub".to_string(),
            source_url: "https://example.org/p".to_string(),
            published: None,
        }
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _title: &str) -> AppResult<Option<PaperMeta>> {
            match &self.result {
                Ok(m) => Ok(m.clone()),
                Err(()) => Err(AppError::upstream("stub failure")),
            }
        }
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(
            normalize_title("Attention Is All You Need!"),
            "attentionisallyouneed"
        );
        assert_eq!(normalize_title("  GPT-4: Tech Report "), "gpt4techreport");
        assert_eq!(normalize_title("注意力机制"), "");
    }

    #[tokio::test]
    async fn test_resolve_falls_through_to_second_provider() {
        let service = SearchService::new(vec![
            Box::new(StubProvider {
                name: "first",
                result: Ok(None),
            }),
            Box::new(StubProvider {
                name: "second",
                result: Ok(Some(meta("Attention Is All You Need"))),
            }),
        ]);

        let found = service.resolve("attention is all you need").await.unwrap();
        assert_eq!(found.source, "stub");
    }

    #[tokio::test]
    async fn test_resolve_rejects_mismatched_title() {
        let service = SearchService::new(vec![Box::new(StubProvider {
            name: "only",
            result: Ok(Some(meta("A Completely Different Paper"))),
        })]);

        assert!(service.resolve("Attention Is All You Need").await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_survives_provider_error() {
        let service = SearchService::new(vec![
            Box::new(StubProvider {
                name: "broken",
                result: Err(()),
            }),
            Box::new(StubProvider {
                name: "working",
                result: Ok(Some(meta("ResNet"))),
            }),
        ]);

        assert!(service.resolve("ResNet").await.is_some());
    }
}

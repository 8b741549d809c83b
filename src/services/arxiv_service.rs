//! arXiv 数据源
//!
//! 通过 arXiv 导出 API 按标题检索论文，解析 Atom feed
//! 提取元数据与 PDF 链接。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::PaperMeta;
use crate::services::search_service::SearchProvider;

const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY_SECS: u64 = 2;

pub struct ArxivProvider {
    http: reqwest::Client,
}

impl ArxivProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for ArxivProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// 还原 Atom feed 中的 XML 实体
fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// 提取指定标签的文本内容（取第一处）
fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?s)<{tag}[^>]*>(.*?)</{tag}>");
    let re = Regex::new(&pattern).ok()?;
    re.captures(xml)
        .map(|c| unescape_xml(c[1].trim()))
        .filter(|s| !s.is_empty())
}

/// 解析 Atom feed 的第一个 entry
fn parse_first_entry(feed: &str) -> Option<PaperMeta> {
    let entry_re = Regex::new(r"(?s)<entry>(.*?)</entry>").ok()?;
    let entry = entry_re.captures(feed)?.get(1)?.as_str();

    // Atom 标题内可能包含换行缩进
    let title = tag_text(entry, "title")?
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let abstract_text = tag_text(entry, "summary")
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let name_re = Regex::new(r"<name>([^<]+)</name>").ok()?;
    let authors: Vec<String> = name_re
        .captures_iter(entry)
        .map(|c| unescape_xml(c[1].trim()))
        .collect();

    let abs_url = tag_text(entry, "id").unwrap_or_default();

    // PDF 链接：优先取 title="pdf" 的 link，缺失时由 abs 地址推导
    let pdf_link_re =
        Regex::new(r#"<link[^>]*title="pdf"[^>]*href="([^"]+)""#).ok()?;
    let pdf_url = pdf_link_re
        .captures(entry)
        .map(|c| c[1].to_string())
        .or_else(|| {
            abs_url
                .contains("/abs/")
                .then(|| abs_url.replace("/abs/", "/pdf/"))
        });

    let published = tag_text(entry, "published")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Some(PaperMeta {
        title,
        authors,
        abstract_text,
        pdf_url,
        source: "arxiv".to_string(),
        source_url: abs_url,
        published,
    })
}

#[async_trait]
impl SearchProvider for ArxivProvider {
    fn name(&self) -> &'static str {
        "arXiv"
    }

    async fn search(&self, title: &str) -> AppResult<Option<PaperMeta>> {
        // 引号内的双引号会破坏查询语法
        let clean_title = title.replace('"', " ");
        let query = format!("ti:\"{}\"", clean_title);

        let mut last_error: Option<AppError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .http
                .get(ARXIV_API_URL)
                .query(&[
                    ("search_query", query.as_str()),
                    ("max_results", "1"),
                    ("sortBy", "relevance"),
                ])
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let feed = response.text().await?;
                    return Ok(parse_first_entry(&feed));
                }
                Ok(response) => {
                    warn!(
                        "arXiv 请求失败 (尝试 {}/{}): HTTP {}",
                        attempt,
                        MAX_ATTEMPTS,
                        response.status()
                    );
                    last_error = Some(AppError::upstream(format!(
                        "arXiv returned HTTP {}",
                        response.status()
                    )));
                }
                Err(e) => {
                    warn!("arXiv 请求失败 (尝试 {}/{}): {}", attempt, MAX_ATTEMPTS, e);
                    last_error = Some(e.into());
                }
            }

            if attempt < MAX_ATTEMPTS {
                debug!("{} 秒后重试 arXiv", RETRY_DELAY_SECS);
                tokio::time::sleep(std::time::Duration::from_secs(RETRY_DELAY_SECS)).await;
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::upstream("arXiv query failed")))
    }
}

//! OpenReview 数据源
//!
//! 覆盖 2023 年至今的 ICLR / NeurIPS / ICML 会议论文。
//! 先查 API v2，未命中再回退 v1（老会议的数据只在 v1）。

use async_trait::async_trait;
use chrono::Datelike;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppResult;
use crate::models::PaperMeta;
use crate::services::search_service::SearchProvider;

const API_V2_URL: &str = "https://api2.openreview.net";
const API_V1_URL: &str = "https://api.openreview.net";
const EARLIEST_YEAR: i32 = 2023;

pub struct OpenReviewProvider {
    http: reqwest::Client,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct NotesResponse {
    notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
struct Note {
    id: String,
    #[serde(default)]
    content: serde_json::Value,
}

impl OpenReviewProvider {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// 按年份降序展开候选 venue id
    fn venue_ids() -> Vec<String> {
        let current_year = chrono::Utc::now().year();
        let mut ids = Vec::new();
        for year in (EARLIEST_YEAR..=current_year).rev() {
            for conf in ["ICLR.cc", "NeurIPS.cc", "ICML.cc"] {
                ids.push(format!("{}/{}/Conference", conf, year));
            }
        }
        ids
    }

    /// 在单个 API 版本的单个 venue 下查询
    async fn query_venue(
        &self,
        api_base: &str,
        venue_id: &str,
        title: &str,
    ) -> AppResult<Option<Note>> {
        let url = format!("{}/notes", api_base);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("content.venueid", venue_id),
                ("content.title", title),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()
            .map_err(crate::error::AppError::from)?;

        let listing: NotesResponse = response.json().await?;
        Ok(listing.notes.into_iter().next())
    }

    /// 提取摘要：v2 的字段是 {"value": "..."}, v1 是裸字符串
    fn extract_abstract(content: &serde_json::Value) -> String {
        let field = &content["abstract"];
        field["value"]
            .as_str()
            .or_else(|| field.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn note_to_meta(note: Note, title: &str, venue_id: &str) -> PaperMeta {
        let pdf_url = format!("https://openreview.net/pdf?id={}", note.id);
        PaperMeta {
            title: title.to_string(),
            authors: Vec::new(),
            abstract_text: Self::extract_abstract(&note.content),
            source_url: pdf_url.replace("/pdf?", "/forum?"),
            pdf_url: Some(pdf_url),
            source: format!("openreview:{}", venue_id),
            published: None,
        }
    }
}

impl Default for OpenReviewProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for OpenReviewProvider {
    fn name(&self) -> &'static str {
        "OpenReview"
    }

    async fn search(&self, title: &str) -> AppResult<Option<PaperMeta>> {
        for venue_id in Self::venue_ids() {
            for api_base in [API_V2_URL, API_V1_URL] {
                match self.query_venue(api_base, &venue_id, title).await {
                    Ok(Some(note)) => {
                        debug!("在 {} 命中 (via {})", venue_id, api_base);
                        return Ok(Some(Self::note_to_meta(note, title, &venue_id)));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // 单个 venue 的故障不影响其余查询
                        warn!("⚠️ OpenReview 查询 {} 失败: {}", venue_id, e);
                    }
                }
            }
        }
        Ok(None)
    }
}

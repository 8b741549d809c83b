//! Gemini API 客户端
//!
//! 封装 v1beta REST 接口：文件上传、内容缓存（cachedContents）和生成调用。
//! 对话引擎只依赖 [`GeminiBackend`] 接口，便于在测试中替换。

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// 消息内容（API 格式）
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<FileData>,
}

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part {
                text: Some(text.into()),
                file_data: None,
            }],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part {
                text: Some(text.into()),
                file_data: None,
            }],
        }
    }
}

/// 使用量统计（来自响应的 usageMetadata）
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    /// 输入 token 总数（含缓存命中部分）
    pub prompt_token_count: u64,
    /// 命中远程缓存的输入 token 数
    pub cached_content_token_count: u64,
    /// 输出 token 数
    pub candidates_token_count: u64,
}

impl UsageMetadata {
    /// 未走缓存的输入 token 数（即本轮真正发送的查询部分）
    pub fn non_cached_prompt_tokens(&self) -> u64 {
        self.prompt_token_count
            .saturating_sub(self.cached_content_token_count)
    }
}

/// 远程缓存条目
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

/// 一次生成调用的结果
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub text: String,
    pub usage: UsageMetadata,
}

/// Gemini 后端能力接口
#[async_trait]
pub trait GeminiBackend: Send + Sync {
    /// 列出当前存活的远程缓存
    async fn list_caches(&self) -> AppResult<Vec<CacheInfo>>;

    /// 上传 PDF（按 display name 复用已上传文件）并创建内容缓存
    async fn create_pdf_cache(
        &self,
        model: &str,
        pdf_path: &Path,
        ttl_secs: u64,
    ) -> AppResult<CacheInfo>;

    /// 发起生成调用，返回回复文本与使用量
    async fn generate_content(
        &self,
        model: &str,
        contents: &[Content],
        cached_content: Option<&str>,
        max_output_tokens: u32,
    ) -> AppResult<GenerateOutcome>;
}

// ========== 响应结构 ==========

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ListCachesResponse {
    cached_contents: Vec<CacheInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    name: String,
    #[serde(default)]
    display_name: String,
    uri: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ListFilesResponse {
    files: Vec<FileInfo>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: FileInfo,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

/// Gemini REST 客户端
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.gemini_api_base_url.trim_end_matches('/').to_string(),
            api_key: config.gemini_api_key.clone(),
        }
    }

    /// 检查响应状态，非 2xx 时携带响应体报错
    async fn check_response(
        endpoint: &str,
        response: reqwest::Response,
    ) -> AppResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(AppError::upstream(format!(
            "{} returned {}: {}",
            endpoint, status, body
        )))
    }

    /// 按 display name 查找已上传的文件，不存在则上传
    async fn find_or_upload_file(&self, pdf_path: &Path, display_name: &str) -> AppResult<String> {
        let url = format!("{}/v1beta/files", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("pageSize", "100")])
            .send()
            .await?;
        let listing: ListFilesResponse = Self::check_response("files.list", response)
            .await?
            .json()
            .await?;

        if let Some(existing) = listing.files.iter().find(|f| f.display_name == display_name) {
            debug!("复用已上传文件: {} ({})", display_name, existing.name);
            return Ok(existing.uri.clone());
        }

        debug!("正在上传 PDF: {}", pdf_path.display());
        let bytes = tokio::fs::read(pdf_path).await?;

        let metadata = json!({ "file": { "display_name": display_name } });
        let form = reqwest::multipart::Form::new()
            .part(
                "metadata",
                reqwest::multipart::Part::text(metadata.to_string())
                    .mime_str("application/json")
                    .map_err(|e| AppError::system(e.to_string()))?,
            )
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes)
                    .file_name(display_name.to_string())
                    .mime_str("application/pdf")
                    .map_err(|e| AppError::system(e.to_string()))?,
            );

        let upload_url = format!("{}/upload/v1beta/files", self.base_url);
        let response = self
            .http
            .post(&upload_url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("uploadType", "multipart"),
            ])
            .multipart(form)
            .send()
            .await?;
        let uploaded: UploadResponse = Self::check_response("files.upload", response)
            .await?
            .json()
            .await?;

        debug!("上传完成: {}", uploaded.file.name);
        Ok(uploaded.file.uri)
    }
}

#[async_trait]
impl GeminiBackend for GeminiClient {
    async fn list_caches(&self) -> AppResult<Vec<CacheInfo>> {
        let url = format!("{}/v1beta/cachedContents", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("pageSize", "100")])
            .send()
            .await?;
        let listing: ListCachesResponse = Self::check_response("caches.list", response)
            .await?
            .json()
            .await?;
        Ok(listing.cached_contents)
    }

    async fn create_pdf_cache(
        &self,
        model: &str,
        pdf_path: &Path,
        ttl_secs: u64,
    ) -> AppResult<CacheInfo> {
        if !pdf_path.exists() {
            return Err(AppError::system(format!(
                "File not found: {}",
                pdf_path.display()
            )));
        }
        let is_pdf = pdf_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            return Err(AppError::system(
                "Only PDF files are supported for caching.",
            ));
        }

        // displayName 由文件名确定，是跨重启的稳定标识
        let display_name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| AppError::system("PDF path has no file name"))?;

        let file_uri = self.find_or_upload_file(pdf_path, &display_name).await?;

        let body = json!({
            "model": format!("models/{}", model),
            "displayName": display_name,
            "ttl": format!("{}s", ttl_secs),
            "contents": [{
                "role": "user",
                "parts": [{
                    "fileData": {
                        "mimeType": "application/pdf",
                        "fileUri": file_uri
                    }
                }]
            }]
        });

        let url = format!("{}/v1beta/cachedContents", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let cache: CacheInfo = Self::check_response("caches.create", response)
            .await?
            .json()
            .await?;

        debug!("缓存创建成功: {} ({})", cache.display_name, cache.name);
        Ok(cache)
    }

    async fn generate_content(
        &self,
        model: &str,
        contents: &[Content],
        cached_content: Option<&str>,
        max_output_tokens: u32,
    ) -> AppResult<GenerateOutcome> {
        let mut body = json!({
            "contents": contents,
            "generationConfig": { "maxOutputTokens": max_output_tokens }
        });
        if let Some(cache_name) = cached_content {
            body["cachedContent"] = json!(cache_name);
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, model
        );
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let generated: GenerateResponse = Self::check_response("generateContent", response)
            .await?
            .json()
            .await?;

        let text: String = generated
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(AppError::upstream("Model returned empty response"));
        }

        let usage = generated.usage_metadata.unwrap_or_else(|| {
            warn!("响应缺少 usageMetadata，本轮按零用量计费");
            UsageMetadata::default()
        });

        Ok(GenerateOutcome { text, usage })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_non_cached_prompt_tokens() {
        let usage = UsageMetadata {
            prompt_token_count: 120_000,
            cached_content_token_count: 100_000,
            candidates_token_count: 500,
        };
        assert_eq!(usage.non_cached_prompt_tokens(), 20_000);

        // 缓存计数异常大于总数时不下溢
        let odd = UsageMetadata {
            prompt_token_count: 10,
            cached_content_token_count: 20,
            candidates_token_count: 0,
        };
        assert_eq!(odd.non_cached_prompt_tokens(), 0);
    }

    #[test]
    fn test_content_serialization_shape() {
        let content = Content::user("你好");
        let value = serde_json::to_value(&content).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["parts"][0]["text"], "你好");
        // 未设置的 fileData 不应出现在序列化结果中
        assert!(value["parts"][0].get("fileData").is_none());
    }

    #[test]
    fn test_generate_response_parsing() {
        let raw = r#"{
            "candidates": [{
                "content": { "role": "model", "parts": [{"text": "论文摘要如下"}] }
            }],
            "usageMetadata": {
                "promptTokenCount": 1200,
                "cachedContentTokenCount": 1000,
                "candidatesTokenCount": 300
            }
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        let usage = parsed.usage_metadata.unwrap();
        assert_eq!(usage.cached_content_token_count, 1000);
        assert_eq!(usage.non_cached_prompt_tokens(), 200);
    }

    #[test]
    fn test_list_caches_response_parsing() {
        let raw = r#"{"cachedContents": [{"name": "cachedContents/abc", "displayName": "paper.pdf"}]}"#;
        let parsed: ListCachesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.cached_contents.len(), 1);
        assert_eq!(parsed.cached_contents[0].display_name, "paper.pdf");

        // 空列表时服务端会省略字段
        let empty: ListCachesResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.cached_contents.is_empty());
    }
}

//! PDF 下载服务
//!
//! 负责把论文 PDF 落盘，校验文件魔数，并在重复处理时
//! 复用已有的有效文件。

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppResult;

const DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

pub struct PdfService {
    http: reqwest::Client,
}

impl PdfService {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// 下载 PDF 到指定路径，返回是否成功
    ///
    /// 目标路径已有有效 PDF 时直接复用；下载失败或内容
    /// 不是 PDF 时清理半成品并返回 false。
    pub async fn download(&self, url: &str, save_path: &Path) -> bool {
        if save_path.exists() {
            if is_valid_pdf(save_path).await {
                info!("📦 复用已下载的 PDF: {}", save_path.display());
                return true;
            }
            warn!("⚠️ 已有文件不是有效 PDF，重新下载: {}", save_path.display());
        }

        match self.try_download(url, save_path).await {
            Ok(()) => {
                info!("✅ PDF 下载完成: {}", save_path.display());
                true
            }
            Err(e) => {
                warn!("❌ PDF 下载失败 ({}): {}", url, e);
                // 不留半成品文件
                let _ = tokio::fs::remove_file(save_path).await;
                false
            }
        }
    }

    async fn try_download(&self, url: &str, save_path: &Path) -> AppResult<()> {
        if let Some(parent) = save_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // arxiv.org 主站会对脚本限流，导出镜像更稳定
        let url = url.replace("://arxiv.org/", "://export.arxiv.org/");

        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(crate::error::AppError::from)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if content_type.contains("text/html") {
            return Err(crate::error::AppError::upstream(format!(
                "Expected PDF but got '{}'",
                content_type
            )));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(save_path, &bytes).await?;

        if !is_valid_pdf(save_path).await {
            return Err(crate::error::AppError::upstream(
                "Downloaded file is not a valid PDF",
            ));
        }
        Ok(())
    }
}

impl Default for PdfService {
    fn default() -> Self {
        Self::new()
    }
}

/// 校验文件魔数是否为 %PDF
pub async fn is_valid_pdf(path: &Path) -> bool {
    use tokio::io::AsyncReadExt;

    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return false;
    };
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic).await {
        Ok(_) => &magic == b"%PDF",
        Err(_) => false,
    }
}

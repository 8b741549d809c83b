pub mod arxiv_service;
pub mod cache_service;
pub mod llm_service;
pub mod openreview_service;
pub mod pdf_service;
pub mod pricing;
pub mod search_service;

pub use arxiv_service::ArxivProvider;
pub use cache_service::CacheService;
pub use llm_service::{LlmService, TurnOutcome};
pub use openreview_service::OpenReviewProvider;
pub use pdf_service::PdfService;
pub use search_service::{SearchProvider, SearchService};

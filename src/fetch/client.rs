use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam for every outbound HTTP request, so tests and wrappers can intercept them.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

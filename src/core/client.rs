use crate::domain::ports::ConfigProvider;
use crate::utils::error::{ProviderError, Result};
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://console.neon.tech/api/v2";

/// Neon 管理 API 的共用 HTTP 客戶端
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::ConfigValidationError {
                field: "api.api_key".to_string(),
                message: "API key is required (set api.api_key or NEON_API_KEY)".to_string(),
            });
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(10),
        })
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Result<Self> {
        Ok(Self::new(config.base_url(), config.api_key(), config.timeout())?
            .with_retry(config.retry_attempts(), config.retry_delay()))
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send(Method::GET, path, None).await?;
        decode(&body)
    }

    pub async fn post<B, T>(&self, path: &str, payload: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload)?;
        let body = self.send(Method::POST, path, Some(&payload)).await?;
        decode(&body)
    }

    /// POST without a request body (e.g. `reset_password`).
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.send(Method::POST, path, None).await?;
        decode(&body)
    }

    pub async fn patch<B, T>(&self, path: &str, payload: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_value(payload)?;
        let body = self.send(Method::PATCH, path, Some(&payload)).await?;
        decode(&body)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await?;
        Ok(())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let mut request = self
                .client
                .request(method.clone(), &url)
                .bearer_auth(&self.api_key)
                .header(header::ACCEPT, "application/json");
            if let Some(payload) = payload {
                request = request.json(payload);
            }

            tracing::debug!("📡 {} {}", method, path);
            let response = request.send().await?;
            let status = response.status();
            tracing::debug!("📡 {} {} -> {}", method, path, status);

            if status.is_success() {
                return Ok(response.text().await?);
            }

            let text = response.text().await.unwrap_or_default();
            let error = status_error(&method, path, status, &text);

            // 423：資源被其他操作鎖住，稍後重試
            if error.is_locked() && attempt < self.retry_attempts {
                attempt += 1;
                tracing::warn!(
                    "🔒 {} {} is locked, retrying in {:?} ({}/{})",
                    method,
                    path,
                    self.retry_delay,
                    attempt,
                    self.retry_attempts
                );
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            return Err(error);
        }
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    if body.trim().is_empty() {
        return Ok(serde_json::from_str("null")?);
    }
    Ok(serde_json::from_str(body)?)
}

fn status_error(method: &Method, path: &str, status: StatusCode, body: &str) -> ProviderError {
    if status == StatusCode::NOT_FOUND {
        return ProviderError::NotFoundError {
            path: path.to_string(),
        };
    }

    // API 錯誤格式：{"code": "...", "message": "..."}
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    ProviderError::HttpStatusError {
        method: method.to_string(),
        path: path.to_string(),
        status: status.as_u16(),
        message,
    }
}

/// 對單一路徑片段做百分比編碼（`/`、`?`、`#` 等都會被編碼）
pub fn encode_segment(segment: &str) -> Result<String> {
    let mut url =
        Url::parse("http://localhost/").map_err(|e| ProviderError::config(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ProviderError::config("URL cannot be a base"))?
        .pop_if_empty()
        .push(segment);
    Ok(url.path().trim_start_matches('/').to_string())
}

/// 將 404 轉成 `None`，其他錯誤照常回傳
pub fn not_found_as_none<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Storage-layer failure. `Conflict` is split out because the booking and
/// payment flows must react to a lost race differently from any other
/// failure (unique-index violations come back from PostgREST as 409).
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.service_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.service_key)).unwrap(),
        );

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DbError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::CONFLICT => DbError::Conflict(error_text),
                StatusCode::NOT_FOUND => DbError::NotFound(error_text),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DbError::Auth(error_text),
                _ => DbError::Api {
                    status: status.as_u16(),
                    message: error_text,
                },
            });
        }

        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Run a mutation whose response body is irrelevant (PostgREST answers
    /// 204 unless a representation is requested).
    pub async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<(), DbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Executing mutation on {}", url);

        let mut req = self.client.request(method, &url).headers(self.get_headers());
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);

            return Err(match status {
                StatusCode::CONFLICT => DbError::Conflict(error_text),
                StatusCode::NOT_FOUND => DbError::NotFound(error_text),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DbError::Auth(error_text),
                _ => DbError::Api {
                    status: status.as_u16(),
                    message: error_text,
                },
            });
        }

        Ok(())
    }

    /// Call a storage-side function. Used where a single REST mutation cannot
    /// cover the transactional contract (payment settlement, cancellation
    /// with refund). Void functions come back with an empty body.
    pub async fn rpc(&self, function: &str, args: Value) -> Result<Value, DbError> {
        let url = format!("{}/rest/v1/rpc/{}", self.base_url, function);
        debug!("Calling rpc {}", function);

        let response = self
            .client
            .post(&url)
            .headers(self.get_headers())
            .json(&args)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!("RPC error ({}): {}", status, text);
            return Err(match status {
                StatusCode::CONFLICT => DbError::Conflict(text),
                StatusCode::NOT_FOUND => DbError::NotFound(text),
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DbError::Auth(text),
                _ => DbError::Api {
                    status: status.as_u16(),
                    message: text,
                },
            });
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| DbError::Api {
            status: status.as_u16(),
            message: format!("Invalid RPC response: {}", e),
        })
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

//! HTTP client for the hosted backend's REST and auth endpoints

use crate::{ClientConfig, ClientError, ClientResult};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::{Arc, RwLock};

/// `Prefer` header asking the REST layer to echo written rows
pub const PREFER_REPRESENTATION: &str = "return=representation";

/// 登录令牌槽，HTTP 与 realtime 共用同一份
pub type SharedToken = Arc<RwLock<Option<String>>>;

/// HTTP client for making network requests to the backend
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    api_key: String,
    token: SharedToken,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| ClientError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            token: Arc::new(RwLock::new(config.token.clone())),
        })
    }

    /// Set or clear the user access token (shared by all clones)
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    /// Get the current token
    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Handle on the token slot, for transports that authenticate per connection
    pub fn token_handle(&self) -> SharedToken {
        self.token.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build authorization header value (user token, else the anon key)
    fn auth_header(&self) -> String {
        match self.token() {
            Some(t) => format!("Bearer {}", t),
            None => format!("Bearer {}", self.api_key),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// REST path for an entity table
    pub fn rest_path(table: &str) -> String {
        format!("rest/v1/{table}")
    }

    /// Start a request with auth headers applied
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("apikey", &self.api_key)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
    }

    /// Make a GET request with query filters
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let request = self.request(Method::GET, path).query(query);
        self.send(request).await
    }

    /// Make a POST request with JSON body, echoing written rows
    pub async fn post<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> ClientResult<T> {
        let request = self
            .request(Method::POST, path)
            .query(query)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(body);
        self.send(request).await
    }

    /// Make a PATCH request with JSON body, echoing written rows
    pub async fn patch<T: DeserializeOwned, B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> ClientResult<T> {
        let request = self
            .request(Method::PATCH, path)
            .query(query)
            .header("Prefer", PREFER_REPRESENTATION)
            .json(body);
        self.send(request).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str, query: &[(&str, String)]) -> ClientResult<()> {
        let request = self.request(Method::DELETE, path).query(query);
        self.send::<serde_json::Value>(request).await.map(|_| ())
    }

    /// Send a prepared request and decode the JSON body
    pub async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        Self::handle_response(response).await
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::debug!(status = %status, body = %text, "Backend request failed");
            return Err(match status {
                StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
                StatusCode::FORBIDDEN => ClientError::Forbidden(text),
                StatusCode::NOT_FOUND | StatusCode::NOT_ACCEPTABLE => ClientError::NotFound(text),
                StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                    ClientError::Validation(text)
                }
                _ => ClientError::Internal(format!("{status}: {text}")),
            });
        }

        let body = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(body).map_err(Into::into)
    }
}

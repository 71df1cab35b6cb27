//! Menu photo scanner
//!
//! The image-understanding service is a black box: it receives a photo of a
//! printed menu and answers with a list of candidate dishes. Candidates are
//! never imported directly; staff review them and each one is turned into a
//! create payload through [`MenuCandidate::into_new_item`].

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::models::MenuItemCreate;

use crate::{ClientError, ClientResult};

const DEFAULT_CATEGORY: &str = "Uncategorized";

/// One dish recognised on a menu photo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuCandidate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_price")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub dietary_tags: Vec<String>,
}

impl MenuCandidate {
    /// Turn a reviewed candidate into a create payload
    ///
    /// Returns `None` when the name is blank or the price is missing or
    /// negative.
    pub fn into_new_item(self, restaurant_id: &str) -> Option<MenuItemCreate> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return None;
        }
        let price = self.price.filter(|p| !p.is_sign_negative())?;
        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        Some(MenuItemCreate {
            id: None,
            restaurant_id: restaurant_id.to_string(),
            name,
            description: self.description.filter(|d| !d.trim().is_empty()),
            price,
            category,
            dietary_tags: self.dietary_tags,
            in_stock: true,
            image_url: None,
        })
    }
}

/// Prices come back as numbers or as strings like "₹120" / "12.50"
fn lenient_price<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }))
}

/// Parse the scanner's answer into candidates
///
/// Accepts a bare JSON array, an object with an `items` array, or either
/// wrapped in a markdown code fence.
pub fn parse_candidates(text: &str) -> ClientResult<Vec<MenuCandidate>> {
    let body = strip_code_fence(text.trim());
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ClientError::InvalidResponse(format!("scanner output is not JSON: {e}")))?;

    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut obj) => obj
            .remove("items")
            .ok_or_else(|| ClientError::InvalidResponse("scanner output has no items".into()))?,
        _ => {
            return Err(ClientError::InvalidResponse(
                "scanner output is not a list".into(),
            ));
        }
    };
    Ok(serde_json::from_value(items)?)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // 跳过语言标记 (```json)
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Image-understanding contract
#[async_trait]
pub trait MenuScanner: Send + Sync {
    async fn scan(&self, image: &[u8], mime_type: &str) -> ClientResult<Vec<MenuCandidate>>;
}

/// Scanner backed by an HTTP endpoint
///
/// Posts `{"mime_type", "data"}` with the image base64-encoded; the
/// response is either the candidate list itself or `{"text": "..."}`
/// holding it as model output.
#[derive(Debug, Clone)]
pub struct HttpMenuScanner {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMenuScanner {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ClientError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl MenuScanner for HttpMenuScanner {
    async fn scan(&self, image: &[u8], mime_type: &str) -> ClientResult<Vec<MenuCandidate>> {
        if image.is_empty() {
            return Err(ClientError::Validation("empty image".into()));
        }
        let body = json!({
            "mime_type": mime_type,
            "data": STANDARD.encode(image),
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::Internal(format!("scanner returned {status}: {text}")));
        }

        let value: Value = response.json().await?;
        let candidates = match value {
            Value::String(text) => parse_candidates(&text)?,
            Value::Object(ref obj) if obj.get("text").is_some_and(Value::is_string) => {
                parse_candidates(obj["text"].as_str().unwrap_or_default())?
            }
            other => parse_candidates(&other.to_string())?,
        };
        tracing::info!(count = candidates.len(), "Menu scan finished");
        Ok(candidates)
    }
}

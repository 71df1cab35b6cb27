//! Session Resolver
//!
//! 把页面地址解析为租户 / 桌台标识。解析是纯函数，不访问后端；
//! 桌台的创建是独立的员工操作 (见 `AppContext::ensure_table`)。
//!
//! 支持的参数:
//! - `rid` / `restaurantId`: 餐厅 ID
//! - `tableId`: 桌台唯一 ID (canonical)
//! - `table` / `tableNo`: 桌号 (展示用)
//!
//! 查询参数优先；旧版链接把查询串放在 hash 里 (`#/menu?rid=...`)，按键回退读取。

use std::str::FromStr;

use qrdine_client::Url;
use serde::{Deserialize, Serialize};

const RESTAURANT_KEYS: [&str; 2] = ["rid", "restaurantId"];
const TABLE_ID_KEYS: [&str; 1] = ["tableId"];
const TABLE_NUMBER_KEYS: [&str; 2] = ["tableNo", "table"];

/// Identifiers carried by a location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    pub restaurant_id: Option<String>,
    pub table_id: Option<String>,
    /// Display number as it appears on the link
    pub table_number: Option<String>,
}

impl SessionParams {
    /// No identifier of any kind
    pub fn is_empty(&self) -> bool {
        self.restaurant_id.is_none() && self.table_id.is_none() && self.table_number.is_none()
    }
}

impl FromStr for SessionParams {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| format!("invalid location {s}: {e}"))?;
        Ok(parse_location(&url))
    }
}

/// Parse a page location into session identifiers
pub fn parse_location(url: &Url) -> SessionParams {
    let query: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let hash = hash_query(url);

    let lookup = |keys: &[&str]| first_value(&query, keys).or_else(|| first_value(&hash, keys));

    SessionParams {
        restaurant_id: lookup(&RESTAURANT_KEYS),
        table_id: lookup(&TABLE_ID_KEYS),
        table_number: lookup(&TABLE_NUMBER_KEYS),
    }
}

/// Query pairs embedded after `?` in the fragment
fn hash_query(url: &Url) -> Vec<(String, String)> {
    let Some((_, query)) = url.fragment().and_then(|f| f.split_once('?')) else {
        return Vec::new();
    };
    // 借用 Url 的解码逻辑
    match Url::parse(&format!("http://hash.invalid/?{query}")) {
        Ok(parsed) => parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn first_value(pairs: &[(String, String)], keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.trim().to_string())
    })
}

/// Outcome of resolving a location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionResolution {
    /// Bound to one table; customer ordering allowed
    Guest {
        restaurant_id: String,
        table_id: String,
        table_number: Option<String>,
    },
    /// Restaurant known but no canonical table id; ordering is blocked
    Incomplete {
        restaurant_id: String,
        reason: String,
    },
    /// Nothing in the location identifies a restaurant
    NoSession,
}

impl SessionResolution {
    pub fn is_guest(&self) -> bool {
        matches!(self, SessionResolution::Guest { .. })
    }

    pub fn restaurant_id(&self) -> Option<&str> {
        match self {
            SessionResolution::Guest { restaurant_id, .. }
            | SessionResolution::Incomplete { restaurant_id, .. } => Some(restaurant_id),
            SessionResolution::NoSession => None,
        }
    }
}

/// Resolve identifiers into a session
///
/// Both the restaurant id and the canonical table id must be present.
/// A bare display number is never looked up or created here.
pub fn resolve(params: &SessionParams) -> SessionResolution {
    let Some(restaurant_id) = params.restaurant_id.clone() else {
        return SessionResolution::NoSession;
    };

    match &params.table_id {
        Some(table_id) => SessionResolution::Guest {
            restaurant_id,
            table_id: table_id.clone(),
            table_number: params.table_number.clone(),
        },
        None => {
            let reason = match &params.table_number {
                Some(number) => format!(
                    "table {number} is not linked to a table id; please rescan the QR code"
                ),
                None => "missing table id; please rescan the QR code".to_string(),
            };
            tracing::warn!(restaurant_id = %restaurant_id, "Incomplete session link");
            SessionResolution::Incomplete {
                restaurant_id,
                reason,
            }
        }
    }
}

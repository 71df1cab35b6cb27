//! 实时变更消息类型定义
//!
//! 后端推送的行级变更事件 (INSERT / UPDATE / DELETE)，以及订阅过滤条件。
//! 网关层负责从传输格式解析为 [`ChangeEvent`]，状态层只消费这些类型。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use chrono::{DateTime, Utc};

pub mod payload;
pub use payload::*;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "INSERT"),
            ChangeKind::Update => write!(f, "UPDATE"),
            ChangeKind::Delete => write!(f, "DELETE"),
        }
    }
}

/// 订阅的资源表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTable {
    Orders,
    OrderItems,
    ServiceRequests,
    MenuItems,
}

impl ResourceTable {
    pub const ALL: [ResourceTable; 4] = [
        ResourceTable::Orders,
        ResourceTable::OrderItems,
        ResourceTable::ServiceRequests,
        ResourceTable::MenuItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceTable::Orders => "orders",
            ResourceTable::OrderItems => "order_items",
            ResourceTable::ServiceRequests => "service_requests",
            ResourceTable::MenuItems => "menu_items",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for ResourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 行级变更事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: ResourceTable,
    pub kind: ChangeKind,
    /// 新行 (DELETE 时为 None)
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    /// 旧行 (仅 UPDATE / DELETE，可能只包含主键)
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
    #[serde(default)]
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    pub fn new(table: ResourceTable, kind: ChangeKind, record: Option<serde_json::Value>) -> Self {
        Self {
            table,
            kind,
            record,
            old_record: None,
            commit_timestamp: Some(Utc::now()),
        }
    }

    pub fn insert<T: Serialize>(table: ResourceTable, row: &T) -> Self {
        Self::new(table, ChangeKind::Insert, serde_json::to_value(row).ok())
    }

    pub fn update<T: Serialize>(table: ResourceTable, row: &T) -> Self {
        Self::new(table, ChangeKind::Update, serde_json::to_value(row).ok())
    }

    pub fn delete(table: ResourceTable, old_record: serde_json::Value) -> Self {
        Self {
            old_record: Some(old_record),
            ..Self::new(table, ChangeKind::Delete, None)
        }
    }

    fn field(&self, name: &str) -> Option<&str> {
        self.record
            .as_ref()
            .and_then(|r| r.get(name))
            .or_else(|| self.old_record.as_ref().and_then(|r| r.get(name)))
            .and_then(|v| v.as_str())
    }

    /// 行主键 (优先取新行)
    pub fn record_id(&self) -> Option<&str> {
        self.field("id")
    }

    /// 所属餐厅
    pub fn restaurant_id(&self) -> Option<&str> {
        self.field("restaurant_id")
    }

    /// 父订单 (order_items 行)
    pub fn order_id(&self) -> Option<&str> {
        self.field("order_id")
    }

    /// 解析新行为指定类型
    pub fn parse_record<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.record
            .as_ref()
            .map(|r| serde_json::from_value(r.clone()))
    }
}

/// 订阅过滤条件 - 单个餐厅范围内的多表订阅
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub restaurant_id: String,
    pub tables: Vec<ResourceTable>,
}

impl SubscriptionFilter {
    /// 餐厅范围内的全部资源表
    pub fn for_restaurant(restaurant_id: impl Into<String>) -> Self {
        Self {
            restaurant_id: restaurant_id.into(),
            tables: ResourceTable::ALL.to_vec(),
        }
    }

    /// 频道名称 (每个餐厅一个)
    pub fn topic(&self) -> String {
        format!("realtime:restaurant-{}", self.restaurant_id)
    }

    /// 行过滤表达式 (`restaurant_id=eq.<id>`)
    pub fn row_filter(&self) -> String {
        format!("restaurant_id=eq.{}", self.restaurant_id)
    }

    /// 某张表的行过滤；order_items 没有 restaurant_id 列，返回 None
    pub fn row_filter_for(&self, table: ResourceTable) -> Option<String> {
        match table {
            ResourceTable::OrderItems => None,
            _ => Some(self.row_filter()),
        }
    }

    /// 事件是否落在本订阅范围内
    ///
    /// order_items 行不带餐厅，全部放行，由接收方按已加载的订单 id 过滤。
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if !self.tables.contains(&event.table) {
            return false;
        }
        match event.table {
            ResourceTable::OrderItems => true,
            _ => event.restaurant_id() == Some(self.restaurant_id.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_ids_fall_back_to_old_record() {
        let ev = ChangeEvent::delete(
            ResourceTable::Orders,
            json!({"id": "o-1", "restaurant_id": "r-1"}),
        );
        assert_eq!(ev.record_id(), Some("o-1"));
        assert_eq!(ev.restaurant_id(), Some("r-1"));
        assert!(ev.parse_record::<serde_json::Value>().is_none());
    }

    #[test]
    fn test_filter_matches_restaurant_and_table() {
        let filter = SubscriptionFilter::for_restaurant("r-1");
        assert_eq!(filter.row_filter(), "restaurant_id=eq.r-1");
        assert_eq!(filter.topic(), "realtime:restaurant-r-1");

        let mine = ChangeEvent::new(
            ResourceTable::MenuItems,
            ChangeKind::Update,
            Some(json!({"id": "m-1", "restaurant_id": "r-1"})),
        );
        let other = ChangeEvent::new(
            ResourceTable::MenuItems,
            ChangeKind::Update,
            Some(json!({"id": "m-2", "restaurant_id": "r-2"})),
        );
        assert!(filter.matches(&mine));
        assert!(!filter.matches(&other));

        let narrow = SubscriptionFilter {
            restaurant_id: "r-1".into(),
            tables: vec![ResourceTable::Orders],
        };
        assert!(!narrow.matches(&mine));
    }

    #[test]
    fn test_order_items_pass_without_restaurant() {
        let filter = SubscriptionFilter::for_restaurant("r-1");
        let item = ChangeEvent::new(
            ResourceTable::OrderItems,
            ChangeKind::Insert,
            Some(json!({"id": "i-1", "order_id": "o-1", "quantity": 2})),
        );
        assert!(filter.matches(&item));
        assert_eq!(item.order_id(), Some("o-1"));
        assert_eq!(filter.row_filter_for(ResourceTable::OrderItems), None);
        assert_eq!(
            filter.row_filter_for(ResourceTable::Orders).as_deref(),
            Some("restaurant_id=eq.r-1")
        );
    }

    #[test]
    fn test_table_names() {
        for table in ResourceTable::ALL {
            assert_eq!(ResourceTable::from_name(table.as_str()), Some(table));
        }
        assert_eq!(ResourceTable::from_name("profiles"), None);
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

// ==================== Notification Level ====================

/// 通知级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    /// 普通信息
    Info,
    /// 操作成功
    Success,
    /// 警告
    Warning,
    /// 错误
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// 通知分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    /// 会话 / 登录
    Session,
    /// 订单
    Order,
    /// 菜单
    Menu,
    /// 服务请求 (呼叫服务员等)
    Service,
    /// 网络
    Network,
}

// ==================== Payloads ====================

/// 通知载荷 (状态层 -> 界面)
///
/// 用于向用户展示操作结果 (toast) 或错误提示。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// 标题
    pub title: String,
    /// 消息内容
    pub message: String,
    /// 通知级别
    pub level: NotificationLevel,
    /// 通知分类
    pub category: NotificationCategory,
}

// ==================== Convenience Constructors ====================

impl NotificationPayload {
    fn build(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            level,
            category: NotificationCategory::Session,
        }
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(NotificationLevel::Info, title, message)
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(NotificationLevel::Success, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(NotificationLevel::Error, title, message)
    }

    pub fn with_category(mut self, category: NotificationCategory) -> Self {
        self.category = category;
        self
    }

    pub fn is_error(&self) -> bool {
        self.level >= NotificationLevel::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_builders() {
        let n = NotificationPayload::success("Order placed", "Your order is on its way")
            .with_category(NotificationCategory::Order);
        assert_eq!(n.level, NotificationLevel::Success);
        assert_eq!(n.category, NotificationCategory::Order);
        assert!(!n.is_error());
        assert!(NotificationPayload::error("x", "y").is_error());

        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["level"], "success");
        assert_eq!(json["category"], "order");
    }
}

//! Service Request Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of ad-hoc request raised from a table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    CallWaiter,
    RequestBill,
    Other,
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::CallWaiter => write!(f, "call_waiter"),
            RequestType::RequestBill => write!(f, "request_bill"),
            RequestType::Other => write!(f, "other"),
        }
    }
}

/// Request status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    #[default]
    Pending,
    Completed,
}

/// Service request entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: String,
    pub restaurant_id: String,
    pub table_id: String,
    #[serde(default)]
    pub table_number: Option<String>,
    pub request_type: RequestType,
    pub status: RequestStatus,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create service request payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequestCreate {
    pub restaurant_id: String,
    pub table_id: String,
    pub table_number: Option<String>,
    pub request_type: RequestType,
    pub status: RequestStatus,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serde() {
        let json = r#"{
            "id": "s-1",
            "restaurant_id": "r-1",
            "table_id": "t-1",
            "request_type": "call_waiter",
            "status": "PENDING",
            "created_at": "2026-10-01T12:00:00Z"
        }"#;
        let req: ServiceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.request_type, RequestType::CallWaiter);
        assert_eq!(req.status, RequestStatus::Pending);
        assert_eq!(
            serde_json::to_string(&RequestStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }
}

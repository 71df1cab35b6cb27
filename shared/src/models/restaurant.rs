//! Restaurant Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Restaurant profile (tenant identity + display metadata)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantProfile {
    pub id: String,
    pub name: String,
    /// Free-form kind, e.g. "cafe", "bistro"
    #[serde(default, rename = "type")]
    pub restaurant_type: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Update restaurant payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestaurantUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub restaurant_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl RestaurantProfile {
    /// Apply a partial update in place
    pub fn apply(&mut self, update: &RestaurantUpdate) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(kind) = &update.restaurant_type {
            self.restaurant_type = Some(kind.clone());
        }
        if let Some(location) = &update.location {
            self.location = Some(location.clone());
        }
        if let Some(contact) = &update.contact {
            self.contact = Some(contact.clone());
        }
    }
}

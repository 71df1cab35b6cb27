//! Shared types for QRDine
//!
//! Data model, realtime change-event types and money helpers used by
//! both the backend gateway (`qrdine-client`) and the application store
//! (`qrdine-app`).

pub mod client;
pub mod message;
pub mod models;
pub mod money;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Realtime re-exports (for convenient access)
pub use message::{ChangeEvent, ChangeKind, ResourceTable, SubscriptionFilter};
pub use message::{NotificationCategory, NotificationLevel, NotificationPayload};

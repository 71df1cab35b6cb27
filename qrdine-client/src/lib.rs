//! QRDine Client - typed access to the hosted backend
//!
//! Provides the Backend Gateway (one call per entity operation), the
//! realtime change-feed subscription, and the contracts of the external
//! menu-scanner and QR image services.

pub mod config;
pub mod error;
pub mod external;
pub mod gateway;
pub mod http;
pub mod realtime;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use gateway::{Backend, FaultKind, GatewayOp, MemoryBackend, Page, RestBackend, PAGE_SIZE};
pub use http::{HttpClient, SharedToken};
pub use realtime::{
    MemoryRealtime, RealtimeError, RealtimeSource, Subscription, WebSocketRealtime,
};

// Re-export shared types for convenience
pub use reqwest::Url;
pub use shared::client::{AuthSession, AuthUser};
pub use shared::message::{ChangeEvent, ChangeKind, ResourceTable, SubscriptionFilter};

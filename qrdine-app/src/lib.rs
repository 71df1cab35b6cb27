//! QRDine application layer
//!
//! - `session`: 页面地址 → 租户 / 桌台标识 (纯解析 + 严格策略)
//! - `store`: `AppContext`，唯一的状态持有者
//! - `reconciler`: 实时变更 → store
//! - `menu_cache`: 菜单快照的本地 JSON 缓存
//! - `config` / `logger`: 运行配置与日志

pub mod config;
pub mod logger;
pub mod menu_cache;
pub mod reconciler;
pub mod session;
pub mod store;

pub use menu_cache::{CacheError, MenuCache};
pub use reconciler::Reconciler;
pub use session::{SessionParams, SessionResolution, parse_location, resolve};
pub use store::{AppContext, AppError, AppResult, AppState, LandingView, OrderReceipt};

// Re-export for binaries and tests
pub use qrdine_client;
pub use shared;

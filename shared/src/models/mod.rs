//! Data models
//!
//! Row shapes of the hosted backend's entities. All IDs are `String`
//! (UUIDs issued by the backend). Prices are `Decimal` in currency units.

pub mod dining_table;
pub mod menu_item;
pub mod order;
pub mod profile;
pub mod restaurant;
pub mod service_request;

// Re-exports
pub use dining_table::*;
pub use menu_item::*;
pub use order::*;
pub use profile::*;
pub use restaurant::*;
pub use service_request::*;

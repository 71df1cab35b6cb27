//! External services consumed as black boxes
//!
//! - [`scanner`]: image-understanding call that turns a menu photo into
//!   candidate menu entries
//! - [`qr`]: QR image service and canonical table links

pub mod qr;
pub mod scanner;

pub use qr::{qr_image_url, table_link};
pub use scanner::{HttpMenuScanner, MenuCandidate, MenuScanner, parse_candidates};

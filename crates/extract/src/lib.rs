pub mod adapter;
pub mod backend;
pub mod sanitize;

pub use adapter::{ExtractError, ExtractionAdapter};
pub use backend::{BackendError, ExtractionBackend, HttpBackend, MockBackend};
pub use sanitize::{neutralize, truncate_at_char_boundary, Sanitized};

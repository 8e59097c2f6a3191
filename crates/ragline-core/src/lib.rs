pub mod allowlist;
pub mod config;
pub mod error;
pub mod types;

pub use allowlist::DirectoryAllowList;
pub use config::RaglineConfig;
pub use error::{ErrorKind, RagError, Result};
pub use types::*;

pub mod client;
pub mod error;
pub mod types;

// Re-export common types
pub use client::{KeywordApiClient, SpyfuClient};
pub use error::{ErrorKind, FetchError};
pub use types::{PageRequest, RawKeyword};

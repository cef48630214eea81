// kegsmith-common/src/lib.rs
pub mod cache;
pub mod config;
pub mod error;
pub mod formulary;
pub mod keg;
pub mod model;
pub mod pipeline;

// Re-export key types
pub use cache::Cache;
pub use config::Config;
pub use error::{KegError, Result};
pub use model::{Formula, ResourceSpec};

// kegsmith-net/src/lib.rs
pub mod fetch;
pub mod http;
pub mod validation;

pub use fetch::{Fetcher, VerifiedArtifact};
pub use http::{ArtifactSource, MemorySource, UrlSource};
pub use validation::{sha256_hex, validate_url, verify_checksum};

//! Google Cloud plumbing: metadata server, OAuth2 tokens, object storage.

pub mod auth;
pub mod metadata;
pub mod storage;

pub use auth::TokenSource;
pub use metadata::{MetadataClient, MetadataProbe};
pub use storage::{GcsBucket, ObjectStore};

//! Vellum Storage Library
//!
//! Storage abstraction and backends (S3 via `object_store`, local filesystem).
//!
//! # Storage key format
//!
//! Keys are owner-scoped and derived only from server-generated identifiers:
//!
//! - **Originals**: `originals/{owner_id}/{image_id}.{ext}`
//! - **Variants**: `variants/{owner_id}/{image_id}/{class}.{ext}`
//!
//! Keys must not contain `..`, backslashes or a leading `/`. Key generation is
//! centralized in the `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{original_key, validate_key, variant_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
pub use vellum_core::StorageBackend;

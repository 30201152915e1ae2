//! Sequential multipart uploads to S3-compatible spaces.
//!
//! [`UploadManager`] splits a file into fixed-size parts, uploads them one at
//! a time with bounded per-part retries, and either completes the upload or
//! aborts it. [`UploadManager::cleanup_previous_attempts`] clears uploads left
//! in flight by earlier runs.

pub mod config;
pub mod content_type;
pub mod credentials;
pub mod error;
pub mod events;
pub mod manager;
pub mod parts;
pub mod progress;
pub mod session;
pub mod store;

pub use config::UploaderConfig;
pub use credentials::{Credentials, SecretBuffer};
pub use error::{Result, StoreError, StoreOperation, UploadError};
pub use events::{UploadEvent, UploadEvents, UploadFailure, UploadStatus};
pub use manager::UploadManager;
pub use parts::{PartDescriptor, PartPlan};
pub use progress::TrackableRequest;
pub use store::{MemoryStore, ObjectStore, S3StoreFactory, StoreFactory};

// Tracing target constants
pub const TRACING_TARGET_UPLOAD: &str = "spaces_uploader::upload";
pub const TRACING_TARGET_CLEANUP: &str = "spaces_uploader::cleanup";
pub const TRACING_TARGET_STORE: &str = "spaces_uploader::store";

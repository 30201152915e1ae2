//! Object store seam.
//!
//! [`ObjectStore`] covers the five multipart calls the coordinator needs;
//! [`StoreFactory`] builds one store per coordinator operation.

mod memory;
mod s3;

use std::path::Path;

use async_trait::async_trait;

pub use memory::{MemoryClient, MemoryStore, StoreCall, StoredObject};
pub use s3::{S3Store, S3StoreFactory};

use crate::credentials::Credentials;
use crate::error::{Result, StoreResult};
use crate::parts::PartDescriptor;

/// Part number and ETag pair sent on completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Multipart upload the store still lists as in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub key: String,
    pub upload_id: String,
}

/// Arguments of a single part upload. The store reads the byte range itself.
#[derive(Debug, Clone, Copy)]
pub struct PartRequest<'a> {
    pub bucket: &'a str,
    pub key: &'a str,
    pub upload_id: &'a str,
    pub file_path: &'a Path,
    pub part: PartDescriptor,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Starts a multipart upload and returns its upload id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StoreResult<String>;

    /// Uploads one part and returns its ETag.
    async fn upload_part(&self, request: PartRequest<'_>) -> StoreResult<String>;

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()>;

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()>;

    async fn list_multipart_uploads(&self, bucket: &str) -> StoreResult<Vec<PendingUpload>>;
}

/// Builds a store bound to an endpoint. No pooling, no retries.
pub trait StoreFactory: Send + Sync {
    type Store: ObjectStore;

    fn connect(&self, credentials: &Credentials, endpoint: &str) -> Result<Self::Store>;
}

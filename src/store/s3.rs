//! aws-sdk-s3 backed store.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Builder, Credentials as SdkCredentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as SdkCompletedPart};
use aws_smithy_http::byte_stream::Length;

use super::{CompletedPart, ObjectStore, PartRequest, PendingUpload, StoreFactory};
use crate::credentials::Credentials;
use crate::error::{Result, StoreError, StoreOperation, StoreResult};
use crate::progress::{TrackableRequest, TransferHook};
use crate::TRACING_TARGET_STORE;

const PROVIDER_NAME: &str = "spaces-uploader";

/// Builds [`S3Store`] clients for a fixed signing region.
#[derive(Debug, Clone)]
pub struct S3StoreFactory {
    region: String,
}

impl S3StoreFactory {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }
}

impl StoreFactory for S3StoreFactory {
    type Store = S3Store;

    fn connect(&self, credentials: &Credentials, endpoint: &str) -> Result<S3Store> {
        let access_key = credentials.expose_access_key()?;
        let secret_key = credentials.expose_secret_key()?;

        // Part retries are owned by the coordinator.
        let config = Builder::new()
            .endpoint_url(endpoint)
            .region(Region::new(self.region.clone()))
            .credentials_provider(SdkCredentials::new(
                access_key.as_str(),
                secret_key.as_str(),
                None,
                None,
                PROVIDER_NAME,
            ))
            .retry_config(RetryConfig::disabled())
            .build();

        tracing::debug!(
            target: TRACING_TARGET_STORE,
            endpoint,
            region = %self.region,
            "created s3 client"
        );

        Ok(S3Store {
            client: aws_sdk_s3::Client::from_conf(config),
        })
    }
}

/// Store backed by an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

fn sdk_error<E>(operation: StoreOperation) -> impl FnOnce(E) -> StoreError
where
    E: Into<aws_sdk_s3::Error>,
{
    move |err| StoreError::new(operation, err.into())
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StoreResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(sdk_error(StoreOperation::Initiate))?;

        output.upload_id().map(str::to_owned).ok_or_else(|| {
            StoreError::message(StoreOperation::Initiate, "response carried no upload id")
        })
    }

    async fn upload_part(&self, request: PartRequest<'_>) -> StoreResult<String> {
        let part = request.part;
        let part_number = i32::try_from(part.number).map_err(|_| {
            StoreError::message(
                StoreOperation::UploadPart,
                format!("part number {} out of range", part.number),
            )
        })?;
        let content_length = i64::try_from(part.length).map_err(|_| {
            StoreError::message(
                StoreOperation::UploadPart,
                format!("part length {} out of range", part.length),
            )
        })?;

        let body = if part.length == 0 {
            ByteStream::from_static(b"")
        } else {
            ByteStream::read_from()
                .path(request.file_path)
                .offset(part.offset)
                .length(Length::Exact(part.length))
                .build()
                .await
                .map_err(|e| StoreError::new(StoreOperation::UploadPart, e))?
        };

        let number = part.number;
        let hook: TransferHook = Arc::new(move |chunk, written, total| {
            tracing::trace!(
                target: TRACING_TARGET_STORE,
                part_number = number,
                chunk,
                written,
                total,
                "part bytes sent"
            );
        });

        let output = self
            .client
            .upload_part()
            .bucket(request.bucket)
            .key(request.key)
            .upload_id(request.upload_id)
            .part_number(part_number)
            .content_length(content_length)
            .body(body)
            .send_tracked(hook)
            .await
            .map_err(|e| StoreError::new(StoreOperation::UploadPart, e))?;

        output.e_tag().map(str::to_owned).ok_or_else(|| {
            StoreError::message(StoreOperation::UploadPart, "response carried no etag")
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let mut completed = Vec::with_capacity(parts.len());
        for part in parts {
            let part_number = i32::try_from(part.part_number).map_err(|_| {
                StoreError::message(
                    StoreOperation::Complete,
                    format!("part number {} out of range", part.part_number),
                )
            })?;
            completed.push(
                SdkCompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(part.etag.clone())
                    .build(),
            );
        }

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(sdk_error(StoreOperation::Complete))?;

        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(sdk_error(StoreOperation::Abort))?;

        Ok(())
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> StoreResult<Vec<PendingUpload>> {
        let mut pending = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut upload_id_marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_multipart_uploads()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_upload_id_marker(upload_id_marker.take())
                .send()
                .await
                .map_err(sdk_error(StoreOperation::List))?;

            for upload in output.uploads().unwrap_or_default() {
                if let (Some(key), Some(upload_id)) = (upload.key(), upload.upload_id()) {
                    pending.push(PendingUpload {
                        key: key.to_owned(),
                        upload_id: upload_id.to_owned(),
                    });
                }
            }

            if !output.is_truncated() {
                break;
            }
            key_marker = output.next_key_marker().map(str::to_owned);
            upload_id_marker = output.next_upload_id_marker().map(str::to_owned);
            if key_marker.is_none() && upload_id_marker.is_none() {
                break;
            }
        }

        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_requires_live_credentials() {
        let factory = S3StoreFactory::new("us-east-1");
        let mut creds = Credentials::new("access", "secret").unwrap();
        creds.dispose();
        assert!(matches!(
            factory.connect(&creds, "https://nyc3.digitaloceanspaces.com"),
            Err(crate::UploadError::CredentialsDisposed)
        ));
    }
}

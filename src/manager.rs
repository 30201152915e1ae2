//! Upload coordinator and stale-upload reaper.

use std::path::Path;
use std::sync::Arc;

use crate::config::{validate_part_policy, UploaderConfig};
use crate::content_type::{ContentTypeResolver, SniffingResolver};
use crate::credentials::Credentials;
use crate::error::{Result, UploadError};
use crate::events::{UploadEvents, UploadStatus};
use crate::parts::{PartDescriptor, PartPlan};
use crate::session::{SessionState, UploadSession, UploadTarget};
use crate::store::{ObjectStore, PartRequest, S3StoreFactory, StoreFactory};
use crate::{TRACING_TARGET_CLEANUP, TRACING_TARGET_UPLOAD};

/// Uploads files to one space as sequential multipart uploads.
///
/// Every operation connects its own store client through the factory and
/// drops it before returning. A session that does not return an upload id
/// has always had an abort attempted.
pub struct UploadManager<F = S3StoreFactory> {
    credentials: Credentials,
    config: UploaderConfig,
    factory: F,
    content_types: Arc<dyn ContentTypeResolver>,
    events: UploadEvents,
}

impl UploadManager<S3StoreFactory> {
    /// Creates a manager talking to the configured S3-compatible endpoint.
    pub fn new(credentials: Credentials, config: UploaderConfig) -> Result<Self> {
        let factory = S3StoreFactory::new(config.region.clone());
        Self::with_factory(credentials, config, factory)
    }
}

impl<F: StoreFactory> UploadManager<F> {
    pub fn with_factory(credentials: Credentials, config: UploaderConfig, factory: F) -> Result<Self> {
        config.validate()?;
        if credentials.is_disposed() {
            return Err(UploadError::CredentialsDisposed);
        }

        Ok(Self {
            credentials,
            config,
            factory,
            content_types: Arc::new(SniffingResolver),
            events: UploadEvents::new(),
        })
    }

    /// Replaces the content type collaborator.
    pub fn with_content_types(mut self, resolver: impl ContentTypeResolver + 'static) -> Self {
        self.content_types = Arc::new(resolver);
        self
    }

    pub fn events_mut(&mut self) -> &mut UploadEvents {
        &mut self.events
    }

    /// Wipes the held credentials. Later operations fail.
    pub fn dispose(&mut self) {
        self.credentials.dispose();
    }

    fn connect(&self) -> Result<F::Store> {
        self.factory
            .connect(&self.credentials, &self.config.service_url)
    }

    /// Aborts every multipart upload the space still lists as in flight.
    ///
    /// Individual abort failures are reported and skipped; only a failure to
    /// list the uploads is returned.
    #[tracing::instrument(
        target = "spaces_uploader::cleanup",
        skip(self),
        fields(space = %self.config.space_name),
        err
    )]
    pub async fn cleanup_previous_attempts(&self) -> Result<()> {
        let store = self.connect()?;
        let space = self.config.space_name.as_str();
        let pending = store.list_multipart_uploads(space).await?;

        if pending.is_empty() {
            tracing::debug!(target: TRACING_TARGET_CLEANUP, "no stale uploads");
            return Ok(());
        }

        let mut aborted = 0usize;
        for upload in &pending {
            match store
                .abort_multipart_upload(space, &upload.key, &upload.upload_id)
                .await
            {
                Ok(()) => {
                    aborted += 1;
                    tracing::info!(
                        target: TRACING_TARGET_CLEANUP,
                        key = %upload.key,
                        upload_id = %upload.upload_id,
                        "aborted stale upload"
                    );
                }
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET_CLEANUP,
                        key = %upload.key,
                        upload_id = %upload.upload_id,
                        error = %err,
                        "failed to abort stale upload"
                    );
                    self.events.emit_failure(
                        format!(
                            "Failed to abort stale upload {} of {}",
                            upload.upload_id, upload.key
                        ),
                        err.into(),
                    );
                }
            }
        }

        tracing::info!(
            target: TRACING_TARGET_CLEANUP,
            found = pending.len(),
            aborted,
            "stale upload cleanup finished"
        );
        Ok(())
    }

    /// Uploads `file_path` as `upload_name` with the configured part policy.
    pub async fn upload_file(
        &self,
        file_path: impl AsRef<Path>,
        upload_name: &str,
    ) -> Result<String> {
        self.upload_file_with(
            file_path,
            upload_name,
            self.config.max_part_retry,
            self.config.max_part_size,
        )
        .await
    }

    /// Uploads `file_path` as `upload_name` and returns the upload id.
    ///
    /// `max_part_retry` is the total number of attempts per part.
    pub async fn upload_file_with(
        &self,
        file_path: impl AsRef<Path>,
        upload_name: &str,
        max_part_retry: u32,
        max_part_size: u64,
    ) -> Result<String> {
        let file_path = file_path.as_ref();
        if file_path.as_os_str().is_empty() {
            return Err(UploadError::invalid_argument("file_path", "must not be empty"));
        }
        if upload_name.trim().is_empty() {
            return Err(UploadError::invalid_argument(
                "upload_name",
                "must not be empty",
            ));
        }
        validate_part_policy(max_part_retry, max_part_size)?;

        self.upload(file_path, upload_name, max_part_retry, max_part_size)
            .await
    }

    #[tracing::instrument(
        target = "spaces_uploader::upload",
        skip(self, file_path),
        fields(
            space = %self.config.space_name,
            path = %file_path.display(),
            upload_id = tracing::field::Empty,
        ),
        err
    )]
    async fn upload(
        &self,
        file_path: &Path,
        upload_name: &str,
        max_part_retry: u32,
        max_part_size: u64,
    ) -> Result<String> {
        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| UploadError::io(file_path, e))?;
        if !metadata.is_file() {
            return Err(UploadError::invalid_argument(
                "file_path",
                format!("`{}` is not a regular file", file_path.display()),
            ));
        }

        let file_length = metadata.len();
        let plan = PartPlan::new(file_length, max_part_size)?;
        let content_type = self.resolve_content_type(file_path).await?;
        let target = UploadTarget {
            bucket: self.config.space_name.clone(),
            key: upload_name.to_owned(),
            content_type,
        };

        let store = self.connect()?;
        let upload_id = store
            .create_multipart_upload(&target.bucket, &target.key, &target.content_type)
            .await?;
        tracing::Span::current().record("upload_id", upload_id.as_str());
        tracing::info!(
            target: TRACING_TARGET_UPLOAD,
            key = %target.key,
            content_type = %target.content_type,
            file_length,
            parts = plan.part_count(),
            "multipart upload initiated"
        );

        let mut session = UploadSession::new(target, upload_id);
        self.events.emit_status(UploadStatus {
            part_number: 0,
            estimated_parts: plan.estimated_parts(),
            bytes_uploaded: 0,
            total_bytes: file_length,
        });

        match self
            .drive(&store, &mut session, &plan, file_path, max_part_retry)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    target: TRACING_TARGET_UPLOAD,
                    parts = session.parts().len(),
                    "multipart upload completed"
                );
                Ok(session.upload_id().to_owned())
            }
            Err(err) => {
                self.abort(&store, &mut session, &err).await;
                Err(err)
            }
        }
    }

    /// Runs the resolver on the blocking pool, since it may read the file.
    async fn resolve_content_type(&self, file_path: &Path) -> Result<String> {
        let resolver = Arc::clone(&self.content_types);
        let path = file_path.to_path_buf();
        tokio::task::spawn_blocking(move || resolver.content_type(&path))
            .await
            .map_err(|e| UploadError::io(file_path, std::io::Error::other(e)))
    }

    /// Uploads every part, then completes the session.
    async fn drive(
        &self,
        store: &F::Store,
        session: &mut UploadSession,
        plan: &PartPlan,
        file_path: &Path,
        max_part_retry: u32,
    ) -> Result<()> {
        session.transition(SessionState::Uploading)?;

        let mut bytes_uploaded = 0u64;
        for part in plan {
            let etag = self
                .upload_part(store, session, part, file_path, max_part_retry)
                .await?;
            session.record_part(part.number, etag)?;
            bytes_uploaded += part.length;
            self.events.emit_status(UploadStatus {
                part_number: part.number,
                estimated_parts: plan.estimated_parts(),
                bytes_uploaded,
                total_bytes: plan.file_length(),
            });
        }

        session.transition(SessionState::Completing)?;
        let parts = session.parts().completed(plan.part_count())?;
        let target = session.target();
        store
            .complete_multipart_upload(&target.bucket, &target.key, session.upload_id(), &parts)
            .await?;
        session.transition(SessionState::Completed)
    }

    async fn upload_part(
        &self,
        store: &F::Store,
        session: &UploadSession,
        part: PartDescriptor,
        file_path: &Path,
        max_part_retry: u32,
    ) -> Result<String> {
        let target = session.target();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = PartRequest {
                bucket: &target.bucket,
                key: &target.key,
                upload_id: session.upload_id(),
                file_path,
                part,
            };

            let err = match store.upload_part(request).await {
                Ok(etag) => {
                    tracing::debug!(
                        target: TRACING_TARGET_UPLOAD,
                        part_number = part.number,
                        attempt,
                        length = part.length,
                        is_last = part.is_last,
                        "part uploaded"
                    );
                    return Ok(etag);
                }
                Err(err) => err,
            };

            tracing::warn!(
                target: TRACING_TARGET_UPLOAD,
                part_number = part.number,
                attempt,
                max_part_retry,
                error = %err,
                "part upload failed"
            );
            self.events.emit_failure(
                format!("Failed to upload part {} on try #{}", part.number, attempt),
                err.clone().into(),
            );

            if attempt >= max_part_retry {
                return Err(UploadError::PartExhausted {
                    part_number: part.number,
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.config.retry_delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Issues the single abort for a failed session.
    async fn abort(&self, store: &F::Store, session: &mut UploadSession, cause: &UploadError) {
        if let Err(err) = session.transition(SessionState::Aborting) {
            tracing::error!(target: TRACING_TARGET_UPLOAD, error = %err, "abort refused");
            return;
        }

        let target = session.target();
        let result = store
            .abort_multipart_upload(&target.bucket, &target.key, session.upload_id())
            .await;

        match result {
            Ok(()) => tracing::warn!(
                target: TRACING_TARGET_UPLOAD,
                upload_id = %session.upload_id(),
                error = %cause,
                "multipart upload aborted"
            ),
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_UPLOAD,
                    upload_id = %session.upload_id(),
                    error = %err,
                    "abort failed, upload left in flight"
                );
                self.events.emit_failure(
                    format!("Unable to abort upload {}", session.upload_id()),
                    err.into(),
                );
            }
        }

        self.events.emit_failure(
            "Something went wrong uploading the file and it was aborted",
            cause.clone(),
        );
        let aborted = session.transition(SessionState::Aborted);
        debug_assert!(aborted.is_ok(), "aborting sessions always reach aborted");
    }
}

impl<F> std::fmt::Debug for UploadManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadManager")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

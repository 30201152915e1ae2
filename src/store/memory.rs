//! In-process store with fault injection.
//!
//! Parts are read from the source file like a real upload, so completed
//! objects can be compared byte for byte with their source.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::{CompletedPart, ObjectStore, PartRequest, PendingUpload, StoreFactory};
use crate::credentials::Credentials;
use crate::error::{Result, StoreError, StoreOperation, StoreResult};

/// One store call, in the order it was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Initiate { key: String },
    UploadPart { upload_id: String, part_number: u32 },
    Complete { upload_id: String, parts: Vec<u32> },
    Abort { upload_id: String },
    List { bucket: String },
}

/// Object assembled by a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub data: Vec<u8>,
    pub part_count: usize,
}

#[derive(Debug)]
struct PendingState {
    bucket: String,
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (String, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct Faults {
    initiate: bool,
    complete: bool,
    list: bool,
    parts: HashMap<u32, u32>,
    aborts: HashSet<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_upload: u64,
    uploads: BTreeMap<String, PendingState>,
    objects: HashMap<(String, String), StoredObject>,
    calls: Vec<StoreCall>,
    faults: Faults,
}

impl MemoryState {
    fn next_upload_id(&mut self) -> String {
        self.next_upload += 1;
        format!("upload-{:04}", self.next_upload)
    }
}

/// Shared in-memory store. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    open_clients: Arc<AtomicUsize>,
    connections: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `times` attempts to upload `part_number`.
    pub fn fail_part(&self, part_number: u32, times: u32) {
        self.state.lock().faults.parts.insert(part_number, times);
    }

    pub fn fail_initiate(&self) {
        self.state.lock().faults.initiate = true;
    }

    pub fn fail_complete(&self) {
        self.state.lock().faults.complete = true;
    }

    pub fn fail_list(&self) {
        self.state.lock().faults.list = true;
    }

    /// Fails every abort of `upload_id`.
    pub fn fail_abort(&self, upload_id: impl Into<String>) {
        self.state.lock().faults.aborts.insert(upload_id.into());
    }

    /// Leaves an in-flight upload behind, as a crashed session would.
    pub fn seed_pending(&self, bucket: &str, key: &str) -> String {
        let mut state = self.state.lock();
        let upload_id = state.next_upload_id();
        state.uploads.insert(
            upload_id.clone(),
            PendingState {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
                parts: BTreeMap::new(),
            },
        );
        upload_id
    }

    pub fn pending_uploads(&self, bucket: &str) -> Vec<PendingUpload> {
        self.state
            .lock()
            .uploads
            .iter()
            .filter(|(_, pending)| pending.bucket == bucket)
            .map(|(upload_id, pending)| PendingUpload {
                key: pending.key.clone(),
                upload_id: upload_id.clone(),
            })
            .collect()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Clients currently alive.
    pub fn open_clients(&self) -> usize {
        self.open_clients.load(Ordering::SeqCst)
    }

    /// Clients created so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl StoreFactory for MemoryStore {
    type Store = MemoryClient;

    fn connect(&self, credentials: &Credentials, endpoint: &str) -> Result<MemoryClient> {
        // Same credential checks as a real client construction.
        credentials.expose_access_key()?;
        credentials.expose_secret_key()?;
        if endpoint.is_empty() {
            return Err(StoreError::message(StoreOperation::Connect, "empty endpoint").into());
        }

        self.connections.fetch_add(1, Ordering::SeqCst);
        self.open_clients.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryClient {
            store: self.clone(),
        })
    }
}

/// Client handle produced by [`MemoryStore`]'s factory.
#[derive(Debug)]
pub struct MemoryClient {
    store: MemoryStore,
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.store.open_clients.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn read_range(request: &PartRequest<'_>) -> StoreResult<Vec<u8>> {
    let io_error = |e: std::io::Error| StoreError::new(StoreOperation::UploadPart, e);
    let mut file = tokio::fs::File::open(request.file_path)
        .await
        .map_err(io_error)?;
    file.seek(SeekFrom::Start(request.part.offset))
        .await
        .map_err(io_error)?;

    let length = usize::try_from(request.part.length).map_err(|_| {
        StoreError::message(StoreOperation::UploadPart, "part too large for memory store")
    })?;
    let mut data = vec![0u8; length];
    file.read_exact(&mut data).await.map_err(io_error)?;
    Ok(data)
}

#[async_trait]
impl ObjectStore for MemoryClient {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> StoreResult<String> {
        let mut state = self.store.state.lock();
        state.calls.push(StoreCall::Initiate {
            key: key.to_owned(),
        });
        if state.faults.initiate {
            return Err(StoreError::message(
                StoreOperation::Initiate,
                "injected initiate failure",
            ));
        }

        let upload_id = state.next_upload_id();
        state.uploads.insert(
            upload_id.clone(),
            PendingState {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                content_type: content_type.to_owned(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(&self, request: PartRequest<'_>) -> StoreResult<String> {
        let part_number = request.part.number;
        {
            let mut state = self.store.state.lock();
            state.calls.push(StoreCall::UploadPart {
                upload_id: request.upload_id.to_owned(),
                part_number,
            });
            if let Some(remaining) = state.faults.parts.get_mut(&part_number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::message(
                        StoreOperation::UploadPart,
                        format!("injected failure for part {part_number}"),
                    ));
                }
            }
        }

        let data = read_range(&request).await?;

        let mut state = self.store.state.lock();
        let pending = state.uploads.get_mut(request.upload_id).ok_or_else(|| {
            StoreError::message(StoreOperation::UploadPart, "NoSuchUpload")
        })?;
        let etag = format!("\"{}-{}-{}\"", request.upload_id, part_number, data.len());
        pending.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let mut state = self.store.state.lock();
        state.calls.push(StoreCall::Complete {
            upload_id: upload_id.to_owned(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        if state.faults.complete {
            return Err(StoreError::message(
                StoreOperation::Complete,
                "injected complete failure",
            ));
        }
        if parts.is_empty() {
            return Err(StoreError::message(StoreOperation::Complete, "MalformedXML"));
        }

        let pending = state.uploads.get(upload_id).ok_or_else(|| {
            StoreError::message(StoreOperation::Complete, "NoSuchUpload")
        })?;
        if pending.bucket != bucket || pending.key != key {
            return Err(StoreError::message(StoreOperation::Complete, "NoSuchUpload"));
        }

        let mut data = Vec::new();
        let mut previous = 0;
        for part in parts {
            if part.part_number <= previous {
                return Err(StoreError::message(
                    StoreOperation::Complete,
                    "InvalidPartOrder",
                ));
            }
            previous = part.part_number;
            match pending.parts.get(&part.part_number) {
                Some((etag, bytes)) if *etag == part.etag => data.extend_from_slice(bytes),
                _ => {
                    return Err(StoreError::message(
                        StoreOperation::Complete,
                        format!("InvalidPart {}", part.part_number),
                    ))
                }
            }
        }

        let object = StoredObject {
            content_type: pending.content_type.clone(),
            data,
            part_count: parts.len(),
        };
        state.uploads.remove(upload_id);
        state
            .objects
            .insert((bucket.to_owned(), key.to_owned()), object);
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> StoreResult<()> {
        let mut state = self.store.state.lock();
        state.calls.push(StoreCall::Abort {
            upload_id: upload_id.to_owned(),
        });
        if state.faults.aborts.contains(upload_id) {
            return Err(StoreError::message(
                StoreOperation::Abort,
                "injected abort failure",
            ));
        }

        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::message(StoreOperation::Abort, "NoSuchUpload"))
    }

    async fn list_multipart_uploads(&self, bucket: &str) -> StoreResult<Vec<PendingUpload>> {
        {
            let mut state = self.store.state.lock();
            state.calls.push(StoreCall::List {
                bucket: bucket.to_owned(),
            });
            if state.faults.list {
                return Err(StoreError::message(
                    StoreOperation::List,
                    "injected list failure",
                ));
            }
        }
        Ok(self.store.pending_uploads(bucket))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::parts::PartDescriptor;

    fn creds() -> Credentials {
        Credentials::new("access", "secret").unwrap()
    }

    #[test]
    fn test_client_lease_is_released() {
        let store = MemoryStore::new();
        {
            let _client = store.connect(&creds(), "memory://").unwrap();
            assert_eq!(store.open_clients(), 1);
        }
        assert_eq!(store.open_clients(), 0);
        assert_eq!(store.connections(), 1);
    }

    #[test]
    fn test_connect_rejects_disposed_credentials() {
        let store = MemoryStore::new();
        let mut creds = creds();
        creds.dispose();
        assert!(store.connect(&creds, "memory://").is_err());
        assert_eq!(store.open_clients(), 0);
    }

    #[tokio::test]
    async fn test_complete_assembles_parts_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abcdefgh").unwrap();

        let store = MemoryStore::new();
        let client = store.connect(&creds(), "memory://").unwrap();
        let upload_id = client
            .create_multipart_upload("space", "letters", "text/plain")
            .await
            .unwrap();

        let mut parts = Vec::new();
        for (number, offset) in [(1u32, 0u64), (2, 4)] {
            let etag = client
                .upload_part(PartRequest {
                    bucket: "space",
                    key: "letters",
                    upload_id: &upload_id,
                    file_path: file.path(),
                    part: PartDescriptor {
                        number,
                        offset,
                        length: 4,
                        is_last: number == 2,
                    },
                })
                .await
                .unwrap();
            parts.push(CompletedPart {
                part_number: number,
                etag,
            });
        }

        client
            .complete_multipart_upload("space", "letters", &upload_id, &parts)
            .await
            .unwrap();

        let object = store.object("space", "letters").unwrap();
        assert_eq!(object.data, b"abcdefgh");
        assert_eq!(object.content_type, "text/plain");
        assert!(store.pending_uploads("space").is_empty());
    }

    #[tokio::test]
    async fn test_abort_unknown_upload() {
        let store = MemoryStore::new();
        let client = store.connect(&creds(), "memory://").unwrap();
        let err = client
            .abort_multipart_upload("space", "key", "missing")
            .await
            .unwrap_err();
        assert_eq!(err.operation(), StoreOperation::Abort);
    }
}

use spaces_uploader::store::StoreCall;
use spaces_uploader::{Credentials, MemoryStore, UploadEvent, UploadManager, UploaderConfig};

const SPACE: &str = "media";

fn manager(store: &MemoryStore) -> UploadManager<MemoryStore> {
    let credentials = Credentials::new("DO00EXAMPLE", "example/secret").unwrap();
    UploadManager::with_factory(credentials, UploaderConfig::new(SPACE), store.clone()).unwrap()
}

#[tokio::test]
async fn cleanup_of_empty_space_is_a_no_op() {
    let store = MemoryStore::new();
    let manager = manager(&store);

    manager.cleanup_previous_attempts().await.unwrap();
    manager.cleanup_previous_attempts().await.unwrap();

    assert_eq!(
        store.calls(),
        vec![
            StoreCall::List {
                bucket: SPACE.into()
            },
            StoreCall::List {
                bucket: SPACE.into()
            },
        ]
    );
    assert_eq!(store.open_clients(), 0);
}

#[tokio::test]
async fn cleanup_aborts_every_stale_upload() {
    let store = MemoryStore::new();
    store.seed_pending(SPACE, "one.bin");
    store.seed_pending(SPACE, "two.bin");
    store.seed_pending("other-space", "three.bin");

    manager(&store).cleanup_previous_attempts().await.unwrap();

    assert!(store.pending_uploads(SPACE).is_empty());
    assert_eq!(store.pending_uploads("other-space").len(), 1);
}

#[tokio::test]
async fn cleanup_continues_past_failed_abort() {
    let store = MemoryStore::new();
    let stuck = store.seed_pending(SPACE, "stuck.bin");
    store.seed_pending(SPACE, "fine.bin");
    store.fail_abort(stuck.clone());

    let mut manager = manager(&store);
    let mut rx = manager.events_mut().subscribe();

    manager.cleanup_previous_attempts().await.unwrap();

    let remaining = store.pending_uploads(SPACE);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].upload_id, stuck);
    assert_eq!(remaining[0].key, "stuck.bin");

    let mut failures = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let UploadEvent::Failure(failure) = event {
            failures.push(failure.message);
        }
    }
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains(&stuck));
}

#[tokio::test]
async fn cleanup_surfaces_listing_failure() {
    let store = MemoryStore::new();
    store.seed_pending(SPACE, "left.bin");
    store.fail_list();

    let err = manager(&store)
        .cleanup_previous_attempts()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("list multipart uploads failed"));
    assert_eq!(store.pending_uploads(SPACE).len(), 1);
    assert_eq!(store.open_clients(), 0);
}

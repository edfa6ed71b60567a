// Behaviour of the filesystem store under the access patterns of the
// upload/delete/erase lifecycle.

mod common;

use bytes::Bytes;
use common::{plant, seeded_bytes, sha256_hash};
use futures::TryStreamExt;
use moada_storage::{FileStore, FilesystemBackend, StagingArea};
use std::sync::Arc;
use tempfile::TempDir;

async fn store() -> (TempDir, Arc<FilesystemBackend>) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FilesystemBackend::new(temp_dir.path().join("files"))
        .await
        .unwrap();
    (temp_dir, Arc::new(backend))
}

#[tokio::test]
async fn test_staged_copy_preserves_content() {
    let (temp_dir, store) = store().await;
    let staging = StagingArea::new(temp_dir.path().join("staging"))
        .await
        .unwrap();

    let data = seeded_bytes(7, 300 * 1024);
    let staged = staging.stage(data.clone()).await.unwrap();
    let written = store
        .copy_from_path(staged.path(), "client/big.zip")
        .await
        .unwrap();
    drop(staged);

    assert_eq!(written, data.len() as u64);
    assert_eq!(staging.pending().await.unwrap(), 0);

    let read: Vec<Bytes> = store
        .get_stream("client/big.zip")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(sha256_hash(&read.concat()), sha256_hash(&data));
}

#[tokio::test]
async fn test_total_size_tracks_writes_and_deletes() {
    let (temp_dir, store) = store().await;
    let root = temp_dir.path().join("files");

    plant(&root, "a/1.bin", &seeded_bytes(1, 1000));
    plant(&root, "b/2.bin", &seeded_bytes(2, 500));
    assert_eq!(store.total_size().await.unwrap(), 1500);

    store.delete("a/1.bin").await.unwrap();
    assert_eq!(store.total_size().await.unwrap(), 500);

    store.remove_dir_all("b").await.unwrap();
    assert_eq!(store.total_size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_concurrent_writes_to_one_directory() {
    let (temp_dir, store) = store().await;
    let staging = StagingArea::new(temp_dir.path().join("staging"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..20u64 {
        let store = store.clone();
        let staged = staging.stage(seeded_bytes(i, 64)).await.unwrap();
        handles.push(tokio::spawn(async move {
            store
                .copy_from_path(staged.path(), &format!("client/{i}.txt"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let listed = store.list_dir("client").await.unwrap();
    assert_eq!(listed.len(), 20);
    assert!(listed.iter().all(|o| o.size == 64));
}

#[tokio::test]
async fn test_overwrite_is_atomic_replacement() {
    let (temp_dir, store) = store().await;
    let staging = StagingArea::new(temp_dir.path().join("staging"))
        .await
        .unwrap();

    for content in ["first", "second!"] {
        let staged = staging.stage(Bytes::from(content)).await.unwrap();
        store
            .copy_from_path(staged.path(), "client/f.txt")
            .await
            .unwrap();
    }

    let listed = store.list_dir("client").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].size, 7);
}

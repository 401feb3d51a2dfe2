use blog_platform::storage::{public_url, upload_key, FsMediaStore, MediaStore, MediaStoreError, AVATARS};

#[tokio::test]
async fn fs_store_save_load_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsMediaStore::new(dir.path());
    let key = upload_key(AVATARS, "me.txt");

    store.save(&key, b"hello").await.unwrap();
    assert!(dir.path().join(&key).exists());
    let (bytes, mime) = store.load(&key).await.unwrap();
    assert_eq!(bytes, b"hello");
    assert_eq!(mime, "application/octet-stream");
    assert_eq!(public_url(&key), format!("/uploads/{key}"));

    store.delete(&key).await.unwrap();
    assert!(matches!(store.load(&key).await, Err(MediaStoreError::NotFound)));
    // deleting twice is fine
    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn fs_store_refuses_keys_outside_root() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsMediaStore::new(dir.path().join("uploads"));
    for key in ["../escape.txt", "/etc/passwd", "images/../../escape.txt"] {
        assert!(matches!(store.save(key, b"x").await, Err(MediaStoreError::InvalidKey(_))), "{key}");
        assert!(matches!(store.load(key).await, Err(MediaStoreError::InvalidKey(_))), "{key}");
    }
    assert!(!dir.path().join("escape.txt").exists());
}

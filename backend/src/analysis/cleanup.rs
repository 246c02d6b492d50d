use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use crate::gemini_api::GenerativeApi;
use crate::media_storage::ObjectStore;

/// Tracks every artifact a request creates and removes them on any outcome
///
/// Call [`CleanupCoordinator::run`] once the pipeline is done. If the
/// request future is dropped first, `Drop` removes the temp file right away
/// and hands the remote deletions to the current runtime.
pub struct CleanupCoordinator {
    api: Arc<dyn GenerativeApi>,
    store: Arc<dyn ObjectStore>,
    temp_file: Option<PathBuf>,
    vendor_file: Option<String>,
    storage_object: Option<String>,
}

impl CleanupCoordinator {
    #[must_use]
    pub fn new(api: Arc<dyn GenerativeApi>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            api,
            store,
            temp_file: None,
            vendor_file: None,
            storage_object: None,
        }
    }

    pub fn track_temp_file(&mut self, path: PathBuf) {
        self.temp_file = Some(path);
    }

    pub fn track_vendor_file(&mut self, name: String) {
        self.vendor_file = Some(name);
    }

    pub fn track_storage_object(&mut self, object_key: String) {
        self.storage_object = Some(object_key);
    }

    /// Best-effort removal of everything tracked; failures are only logged
    pub async fn run(mut self) {
        if let Some(path) = self.temp_file.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "Removed temp file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "Failed to remove temp file: {e}"),
            }
        }

        if let Some(name) = self.vendor_file.take() {
            delete_vendor_file(self.api.as_ref(), &name).await;
        }

        if let Some(object_key) = self.storage_object.take() {
            delete_storage_object(self.store.as_ref(), &object_key).await;
        }
    }
}

async fn delete_vendor_file(api: &dyn GenerativeApi, name: &str) {
    if let Err(e) = api.delete_file(name).await {
        tracing::warn!(name, "Failed to delete vendor file: {e}");
    }
}

async fn delete_storage_object(store: &dyn ObjectStore, object_key: &str) {
    if let Err(e) = store.delete_object(object_key).await {
        tracing::warn!(object_key, "Failed to delete storage object: {e}");
    }
}

impl Drop for CleanupCoordinator {
    fn drop(&mut self) {
        if let Some(path) = self.temp_file.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), "Failed to remove temp file: {e}");
                }
            }
        }

        let vendor_file = self.vendor_file.take();
        let storage_object = self.storage_object.take();
        if vendor_file.is_none() && storage_object.is_none() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime available, leaving remote artifacts behind");
            return;
        };

        let api = self.api.clone();
        let store = self.store.clone();
        handle.spawn(async move {
            if let Some(name) = vendor_file {
                delete_vendor_file(api.as_ref(), &name).await;
            }
            if let Some(object_key) = storage_object {
                delete_storage_object(store.as_ref(), &object_key).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::gemini_api::mock::MockGenerativeApi;
    use crate::media_storage::mock::MockObjectStore;

    fn fixtures() -> (Arc<MockGenerativeApi>, Arc<MockObjectStore>) {
        let store = MockObjectStore::new(Some("bucket"));
        store.put("uploads/a-video.mp4", vec![1, 2, 3]);
        (Arc::new(MockGenerativeApi::new()), Arc::new(store))
    }

    #[tokio::test]
    async fn test_run_removes_everything_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"data").unwrap();
        let (api, store) = fixtures();

        let mut cleanup = CleanupCoordinator::new(api.clone(), store.clone());
        cleanup.track_temp_file(path.clone());
        cleanup.track_vendor_file("files/mock-0".to_string());
        cleanup.track_storage_object("uploads/a-video.mp4".to_string());
        cleanup.run().await;

        assert!(!path.exists());
        assert_eq!(api.deleted(), vec!["files/mock-0".to_string()]);
        assert!(!store.contains("uploads/a-video.mp4"));
    }

    #[tokio::test]
    async fn test_run_with_nothing_tracked_is_a_no_op() {
        let (api, store) = fixtures();

        CleanupCoordinator::new(api.clone(), store.clone()).run().await;

        assert!(api.deleted().is_empty());
        assert!(store.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_missing_temp_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let (api, store) = fixtures();

        let mut cleanup = CleanupCoordinator::new(api, store);
        cleanup.track_temp_file(dir.path().join("never-written.mp4"));
        cleanup.run().await;
    }

    #[tokio::test]
    async fn test_drop_without_run_still_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.mp4");
        std::fs::write(&path, b"data").unwrap();
        let (api, store) = fixtures();

        {
            let mut cleanup = CleanupCoordinator::new(api.clone(), store.clone());
            cleanup.track_temp_file(path.clone());
            cleanup.track_vendor_file("files/mock-7".to_string());
        }

        // Temp file goes synchronously, the vendor delete runs on the runtime
        assert!(!path.exists());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.deleted(), vec!["files/mock-7".to_string()]);
    }
}

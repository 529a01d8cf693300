//! The image handler: one orchestration point over the content and metadata
//! stores, shared by the RPC and HTTP surfaces.
//!
//! Every operation that touches a store runs to completion on a blocking
//! worker. If the caller's future is dropped (connection reset, timeout) the
//! worker keeps going, so a put, insert, delete or compensation step is never
//! abandoned halfway.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use ims_core::config::DEFAULT_MAX_IMAGE_BYTES;
use ims_core::{
    ContentStore, Error, ImageId, ImageRecord, MetadataStore, PageRequest, Removal, Result,
};
use serde::{Deserialize, Serialize};

/// An image record as returned to clients, with its resolvable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub url: String,
}

/// One page of images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageList {
    pub images: Vec<Image>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Outcome of the compensating delete after a failed metadata insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// The blob is gone again; both stores agree.
    RolledBack,
    /// The blob could not be removed and needs out-of-band reconciliation.
    Orphaned,
}

/// Shared, thread-safe handler. Cloning is cheap.
#[derive(Clone)]
pub struct ImageHandler {
    content: Arc<dyn ContentStore>,
    metadata: Arc<dyn MetadataStore>,
    base_url: Arc<str>,
    max_image_bytes: u64,
}

impl ImageHandler {
    /// Build a handler over two stores. `base_url` is treated as an opaque
    /// prefix; one trailing `/` is dropped.
    pub fn new(
        content: Arc<dyn ContentStore>,
        metadata: Arc<dyn MetadataStore>,
        base_url: &str,
    ) -> Self {
        let base_url = base_url.strip_suffix('/').unwrap_or(base_url);
        Self {
            content,
            metadata,
            base_url: Arc::from(base_url),
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    pub fn with_max_image_bytes(mut self, max: u64) -> Self {
        self.max_image_bytes = max;
        self
    }

    pub fn max_image_bytes(&self) -> u64 {
        self.max_image_bytes
    }

    pub fn metadata(&self) -> &dyn MetadataStore {
        self.metadata.as_ref()
    }

    /// `{base}/images/{id}`, the exact path the HTTP surface serves.
    pub fn url_for(&self, id: &ImageId) -> String {
        format!("{}/images/{}", self.base_url, id)
    }

    fn view(&self, record: ImageRecord) -> Image {
        Image {
            url: self.url_for(&record.id),
            id: record.id,
            content_type: record.content_type,
            size_bytes: record.size_bytes,
            created_at: record.created_at,
        }
    }

    // -----------------------------------------------------------------------
    // Async API used by the network surfaces
    // -----------------------------------------------------------------------

    pub async fn create_image(&self, content_type: String, data: Bytes) -> Result<Image> {
        self.run(move |h| h.create_image_blocking(&content_type, &data))
            .await
    }

    pub async fn get_image(&self, id: String) -> Result<Image> {
        self.run(move |h| h.get_image_blocking(&id)).await
    }

    pub async fn delete_image(&self, id: String) -> Result<()> {
        self.run(move |h| h.delete_image_blocking(&id)).await
    }

    pub async fn list_images(&self, request: PageRequest) -> Result<ImageList> {
        self.run(move |h| h.list_images_blocking(&request)).await
    }

    /// Metadata plus bytes for the HTTP surface.
    pub async fn fetch_content(&self, id: String) -> Result<(ImageRecord, Bytes)> {
        self.run(move |h| h.fetch_content_blocking(&id)).await
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&ImageHandler) -> Result<T> + Send + 'static,
    {
        let handler = self.clone();
        tokio::task::spawn_blocking(move || op(&handler))
            .await
            .map_err(|e| Error::Internal(format!("store worker failed: {e}")))?
    }

    // -----------------------------------------------------------------------
    // Blocking core
    // -----------------------------------------------------------------------

    /// Validate, write bytes, then write metadata. A failed metadata insert
    /// triggers one compensating blob delete and is reported as
    /// [`Error::PartialWrite`].
    pub fn create_image_blocking(&self, content_type: &str, data: &[u8]) -> Result<Image> {
        let content_type = validate_content_type(content_type)?;
        if data.is_empty() {
            return Err(Error::Validation("image data is empty".into()));
        }
        if data.len() as u64 > self.max_image_bytes {
            return Err(Error::Validation(format!(
                "image is {} bytes; the limit is {}",
                data.len(),
                self.max_image_bytes
            )));
        }

        let id = ImageId::new();
        let written = self.content.put(&id, data)?;
        let record = ImageRecord::new(id, content_type, written);

        if let Err(cause) = self.metadata.insert(&record) {
            tracing::warn!(%id, error = %cause, "Metadata insert failed after blob write");
            let compensation = self.compensate_orphaned_blob(&id);
            return Err(Error::PartialWrite {
                id: id.to_string(),
                cause: Box::new(cause),
                compensated: compensation == Compensation::RolledBack,
            });
        }

        tracing::info!(%id, content_type, size_bytes = written, "Created image");
        Ok(self.view(record))
    }

    /// Remove the blob written by a create whose metadata insert failed.
    ///
    /// Runs exactly once; a failure here leaves an orphaned blob that is
    /// logged and left for reconciliation.
    pub fn compensate_orphaned_blob(&self, id: &ImageId) -> Compensation {
        match self.content.delete(id) {
            Ok(()) => {
                tracing::info!(%id, "Rolled back blob after failed metadata insert");
                Compensation::RolledBack
            }
            Err(e) if e.is_not_found() => Compensation::RolledBack,
            Err(e) => {
                tracing::error!(
                    %id,
                    error = %e,
                    "Compensating blob delete failed; orphaned blob requires reconciliation"
                );
                Compensation::Orphaned
            }
        }
    }

    pub fn get_image_blocking(&self, id: &str) -> Result<Image> {
        let id = parse_image_id(id)?;
        self.metadata.get(&id).map(|record| self.view(record))
    }

    /// Delete metadata first, then the blob.
    ///
    /// A metadata row that is already gone (tombstoned) still proceeds to the
    /// blob step and a missing blob counts as deleted, so retrying after a
    /// [`Error::PartialDelete`] finishes the job.
    pub fn delete_image_blocking(&self, id: &str) -> Result<()> {
        let id = parse_image_id(id)?;
        let removal = self.metadata.delete(&id)?;

        match self.content.delete(&id) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                if removal == Removal::Removed {
                    tracing::warn!(%id, "Deleted image had no blob");
                }
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "Blob delete failed after metadata delete");
                return Err(Error::PartialDelete {
                    id: id.to_string(),
                    cause: Box::new(e),
                });
            }
        }

        if removal == Removal::Removed {
            tracing::info!(%id, "Deleted image");
        }
        Ok(())
    }

    pub fn list_images_blocking(&self, request: &PageRequest) -> Result<ImageList> {
        let page = self.metadata.list(request)?;
        Ok(ImageList {
            images: page.records.into_iter().map(|r| self.view(r)).collect(),
            next_page_token: page.next_page_token,
        })
    }

    pub fn fetch_content_blocking(&self, id: &str) -> Result<(ImageRecord, Bytes)> {
        let id = parse_image_id(id)?;
        let record = self.metadata.get(&id)?;
        match self.content.get(&id) {
            Ok(data) => Ok((record, data)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(%id, "Image metadata exists but blob is missing");
                Err(Error::not_found("image", id))
            }
            Err(e) => Err(e),
        }
    }
}

/// Ids that do not parse cannot name a stored image.
fn parse_image_id(raw: &str) -> Result<ImageId> {
    raw.trim()
        .parse()
        .map_err(|_| Error::not_found("image", raw))
}

/// Accept `type/subtype` with optional parameters, made of characters that
/// are legal in an HTTP header value. Returns the trimmed value.
fn validate_content_type(raw: &str) -> Result<&str> {
    // Checked before trimming so CR/LF is rejected, not stripped.
    if !raw.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b)) {
        return Err(Error::Validation(
            "content_type contains invalid characters".into(),
        ));
    }
    let value = raw.trim();
    if value.is_empty() {
        return Err(Error::Validation("content_type is required".into()));
    }

    let essence = value.split(';').next().unwrap_or_default().trim();
    let valid = essence
        .split_once('/')
        .is_some_and(|(ty, sub)| is_token(ty) && is_token(sub));
    if !valid {
        return Err(Error::Validation(format!(
            "content_type '{value}' is not a MIME type"
        )));
    }
    Ok(value)
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ims_core::memory::{MemoryContentStore, MemoryMetadataStore};
    use ims_core::Page;
    use std::sync::{mpsc, Mutex};
    use std::time::Duration;

    const PNG: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

    fn memory_handler() -> (ImageHandler, Arc<MemoryContentStore>, Arc<MemoryMetadataStore>) {
        let content = Arc::new(MemoryContentStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let handler = ImageHandler::new(
            content.clone(),
            metadata.clone(),
            "http://localhost:8087",
        );
        (handler, content, metadata)
    }

    /// Metadata store whose writes always fail.
    struct BrokenMetadata;

    impl MetadataStore for BrokenMetadata {
        fn insert(&self, _: &ImageRecord) -> Result<()> {
            Err(Error::metadata("disk I/O error"))
        }
        fn get(&self, id: &ImageId) -> Result<ImageRecord> {
            Err(Error::not_found("image", id))
        }
        fn delete(&self, _: &ImageId) -> Result<Removal> {
            Err(Error::metadata("disk I/O error"))
        }
        fn list(&self, _: &PageRequest) -> Result<Page> {
            Err(Error::metadata("disk I/O error"))
        }
    }

    /// Content store that stores normally but can be told to fail deletes.
    #[derive(Default)]
    struct FlakyContent {
        inner: MemoryContentStore,
        fail_deletes: std::sync::atomic::AtomicBool,
    }

    impl FlakyContent {
        fn failing() -> Self {
            let s = Self::default();
            s.set_failing(true);
            s
        }
        fn set_failing(&self, v: bool) {
            self.fail_deletes
                .store(v, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl ContentStore for FlakyContent {
        fn put(&self, id: &ImageId, data: &[u8]) -> Result<u64> {
            self.inner.put(id, data)
        }
        fn get(&self, id: &ImageId) -> Result<Bytes> {
            self.inner.get(id)
        }
        fn delete(&self, id: &ImageId) -> Result<()> {
            if self.fail_deletes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::content("read-only file system"));
            }
            self.inner.delete(id)
        }
    }

    #[test]
    fn create_then_get() {
        let (handler, _, _) = memory_handler();
        let created = handler.create_image_blocking("image/png", &PNG).unwrap();

        assert_eq!(created.size_bytes, 4);
        assert_eq!(created.content_type, "image/png");
        assert_eq!(
            created.url,
            format!("http://localhost:8087/images/{}", created.id)
        );

        let fetched = handler
            .get_image_blocking(&created.id.to_string())
            .unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn trailing_slash_in_base_url() {
        let handler = ImageHandler::new(
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemoryMetadataStore::new()),
            "https://cdn.example.com/",
        );
        let id = ImageId::new();
        assert_eq!(
            handler.url_for(&id),
            format!("https://cdn.example.com/images/{id}")
        );
    }

    #[test]
    fn fetch_content_returns_exact_bytes() {
        let (handler, _, _) = memory_handler();
        let created = handler.create_image_blocking("image/png", &PNG).unwrap();
        let (record, data) = handler
            .fetch_content_blocking(&created.id.to_string())
            .unwrap();
        assert_eq!(record.content_type, "image/png");
        assert_eq!(data.as_ref(), &PNG);
    }

    #[test]
    fn unknown_and_malformed_ids_are_not_found() {
        let (handler, _, _) = memory_handler();
        assert!(handler
            .get_image_blocking("unknown-id")
            .unwrap_err()
            .is_not_found());
        assert!(handler
            .get_image_blocking(&ImageId::new().to_string())
            .unwrap_err()
            .is_not_found());
        assert!(handler
            .delete_image_blocking("unknown-id")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn delete_then_get_is_not_found_and_delete_is_idempotent() {
        let (handler, content, _) = memory_handler();
        let created = handler.create_image_blocking("image/gif", b"GIF89a").unwrap();
        let id = created.id.to_string();

        handler.delete_image_blocking(&id).unwrap();
        assert!(handler.get_image_blocking(&id).unwrap_err().is_not_found());
        assert!(content.is_empty());

        handler.delete_image_blocking(&id).unwrap();
    }

    #[test]
    fn validation_rejects_bad_input() {
        let (handler, content, _) = memory_handler();
        for ct in ["", "   ", "png", "image/", "/png", "image/p ng", "image/png\r\n"] {
            let err = handler.create_image_blocking(ct, &PNG).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{ct:?}: {err}");
        }
        let err = handler.create_image_blocking("image/png", &[]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(content.is_empty());
    }

    #[test]
    fn control_characters_rejected_before_trim() {
        let (handler, content, metadata) = memory_handler();
        for ct in ["image/png\r\n", "\nimage/png", "image/png\0", "image/png\r\nX-Evil: 1"] {
            let err = handler.create_image_blocking(ct, &PNG).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{ct:?}: {err}");
        }
        assert!(content.is_empty());
        assert!(metadata.list(&PageRequest::default()).unwrap().records.is_empty());

        let created = handler.create_image_blocking("\timage/png ", &PNG).unwrap();
        assert_eq!(created.content_type, "image/png");
    }

    #[test]
    fn content_type_parameters_are_kept() {
        let (handler, _, _) = memory_handler();
        let created = handler
            .create_image_blocking(" image/svg+xml; charset=utf-8 ", b"<svg/>")
            .unwrap();
        assert_eq!(created.content_type, "image/svg+xml; charset=utf-8");
    }

    #[test]
    fn oversized_upload_rejected() {
        let (handler, content, _) = memory_handler();
        let handler = handler.with_max_image_bytes(3);
        let err = handler.create_image_blocking("image/png", &PNG).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(content.is_empty());
    }

    #[test]
    fn failed_insert_rolls_back_blob() {
        let content = Arc::new(MemoryContentStore::new());
        let handler = ImageHandler::new(content.clone(), Arc::new(BrokenMetadata), "http://x");

        let err = handler.create_image_blocking("image/png", &PNG).unwrap_err();
        match err {
            Error::PartialWrite {
                compensated, cause, ..
            } => {
                assert!(compensated);
                assert!(matches!(*cause, Error::StoreUnavailable { .. }));
            }
            other => panic!("expected PartialWrite, got {other}"),
        }
        assert!(content.is_empty());
    }

    #[test]
    fn failed_rollback_still_reports_original_failure() {
        let content = Arc::new(FlakyContent::failing());
        let handler = ImageHandler::new(content.clone(), Arc::new(BrokenMetadata), "http://x");

        let err = handler.create_image_blocking("image/png", &PNG).unwrap_err();
        assert_eq!(err.code(), "unavailable");
        assert!(matches!(
            err,
            Error::PartialWrite {
                compensated: false,
                ..
            }
        ));
        assert_eq!(content.inner.len(), 1);
    }

    #[test]
    fn compensation_reports_outcome() {
        let content = Arc::new(FlakyContent::default());
        let handler = ImageHandler::new(
            content.clone(),
            Arc::new(MemoryMetadataStore::new()),
            "http://x",
        );
        let id = ImageId::new();

        content.put(&id, b"orphan").unwrap();
        content.set_failing(true);
        assert_eq!(handler.compensate_orphaned_blob(&id), Compensation::Orphaned);

        content.set_failing(false);
        assert_eq!(handler.compensate_orphaned_blob(&id), Compensation::RolledBack);
        assert_eq!(handler.compensate_orphaned_blob(&id), Compensation::RolledBack);
    }

    #[test]
    fn partial_delete_then_retry_completes() {
        let content = Arc::new(FlakyContent::default());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let handler = ImageHandler::new(content.clone(), metadata.clone(), "http://x");

        let created = handler.create_image_blocking("image/png", &PNG).unwrap();
        let id = created.id.to_string();

        content.set_failing(true);
        let err = handler.delete_image_blocking(&id).unwrap_err();
        assert!(matches!(err, Error::PartialDelete { .. }));
        assert!(handler.get_image_blocking(&id).unwrap_err().is_not_found());
        assert_eq!(content.inner.len(), 1);

        content.set_failing(false);
        handler.delete_image_blocking(&id).unwrap();
        assert!(content.inner.is_empty());
    }

    #[test]
    fn missing_blob_is_not_found_over_http_path() {
        let (handler, content, _) = memory_handler();
        let created = handler.create_image_blocking("image/png", &PNG).unwrap();
        content.delete(&created.id).unwrap();

        let err = handler
            .fetch_content_blocking(&created.id.to_string())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn list_returns_urls_and_pages() {
        let (handler, _, _) = memory_handler();
        for _ in 0..3 {
            handler.create_image_blocking("image/png", &PNG).unwrap();
        }
        let first = handler
            .list_images_blocking(&PageRequest::first(2))
            .unwrap();
        assert_eq!(first.images.len(), 2);
        assert!(first.images.iter().all(|i| i.url.ends_with(&i.id.to_string())));

        let rest = handler
            .list_images_blocking(&PageRequest::after(
                2,
                first.next_page_token.unwrap(),
            ))
            .unwrap();
        assert_eq!(rest.images.len(), 1);
        assert!(rest.next_page_token.is_none());
    }

    /// Content store whose `put` waits for the test to release it.
    struct GatedContent {
        inner: MemoryContentStore,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ContentStore for GatedContent {
        fn put(&self, id: &ImageId, data: &[u8]) -> Result<u64> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            self.inner.put(id, data)
        }
        fn get(&self, id: &ImageId) -> Result<Bytes> {
            self.inner.get(id)
        }
        fn delete(&self, id: &ImageId) -> Result<()> {
            self.inner.delete(id)
        }
    }

    #[tokio::test]
    async fn dropped_create_still_completes_both_writes() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let content = Arc::new(GatedContent {
            inner: MemoryContentStore::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let metadata = Arc::new(MemoryMetadataStore::new());
        let handler = ImageHandler::new(content.clone(), metadata.clone(), "http://img");

        let caller = tokio::spawn({
            let handler = handler.clone();
            async move {
                handler
                    .create_image("image/png".into(), Bytes::from_static(&PNG))
                    .await
            }
        });

        // Drop the caller while the worker is inside the blob write.
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());
        release_tx.send(()).unwrap();

        let mut records = Vec::new();
        for _ in 0..200 {
            records = metadata.list(&PageRequest::default()).unwrap().records;
            if !records.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(records.len(), 1);
        assert_eq!(content.inner.len(), 1);
        assert_eq!(content.inner.get(&records[0].id).unwrap().as_ref(), &PNG);
    }

    #[tokio::test]
    async fn async_api_runs_on_blocking_workers() {
        let (handler, _, _) = memory_handler();
        let created = handler
            .create_image("image/png".into(), Bytes::from_static(&PNG))
            .await
            .unwrap();
        let fetched = handler.get_image(created.id.to_string()).await.unwrap();
        assert_eq!(fetched, created);

        let (_, data) = handler.fetch_content(created.id.to_string()).await.unwrap();
        assert_eq!(data.as_ref(), &PNG);

        handler.delete_image(created.id.to_string()).await.unwrap();
        let list = handler.list_images(PageRequest::default()).await.unwrap();
        assert!(list.images.is_empty());
    }
}

//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which builds an [`ImageHandler`] over a file-backed
//! SQLite database and a blob directory in a temp dir. The
//! [`TestHarness::with_server`] constructor starts both surfaces on random
//! ports for network-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ims_core::Result;
use ims_db::pool::{init_pool, DbPool};
use ims_db::SqliteMetadataStore;
use ims_server::rpc::SERVICE_PATH;
use ims_server::ImageHandler;
use ims_storage::FsContentStore;
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// PNG magic number, used as a recognisable payload.
pub const PNG_MAGIC: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// Test harness wrapping a running image store.
pub struct TestHarness {
    pub handler: ImageHandler,
    pub db: DbPool,
    pub content: Arc<FsContentStore>,
    pub rpc_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub client: reqwest::Client,
    cancel: CancellationToken,
    server: JoinHandle<Result<()>>,
    _dir: TempDir,
}

impl TestHarness {
    /// Start both surfaces on random ports with the default upload limit.
    pub async fn with_server() -> Self {
        Self::with_max_image_bytes(ims_core::config::DEFAULT_MAX_IMAGE_BYTES).await
    }

    /// Start both surfaces with a custom upload limit.
    pub async fn with_max_image_bytes(max: u64) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = dir.path().join("imagestore.db");
        let db = init_pool(db_path.to_str().expect("utf-8 temp path"), 4)
            .expect("failed to create pool");
        let content = Arc::new(FsContentStore::new(dir.path().join("images")));

        let rpc_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let http_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let rpc_addr = rpc_listener.local_addr().expect("failed to get local addr");
        let http_addr = http_listener.local_addr().expect("failed to get local addr");

        let handler = ImageHandler::new(
            content.clone(),
            Arc::new(SqliteMetadataStore::new(db.clone())),
            &format!("http://{http_addr}"),
        )
        .with_max_image_bytes(max);

        let cancel = CancellationToken::new();
        let server = tokio::spawn(ims_server::serve(
            handler.clone(),
            rpc_listener,
            http_listener,
            cancel.clone(),
            Duration::from_secs(10),
        ));

        Self {
            handler,
            db,
            content,
            rpc_addr,
            http_addr,
            client: reqwest::Client::new(),
            cancel,
            server,
            _dir: dir,
        }
    }

    /// Call an RPC method with a JSON body.
    pub async fn rpc(&self, method: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("http://{}{SERVICE_PATH}/{method}", self.rpc_addr))
            .json(&body)
            .send()
            .await
            .expect("rpc request failed")
    }

    /// Create an image over RPC and return the `image` object.
    pub async fn create(&self, content_type: &str, data: &[u8]) -> Value {
        let resp = self
            .rpc(
                "CreateImage",
                serde_json::json!({
                    "content_type": content_type,
                    "data": STANDARD.encode(data),
                }),
            )
            .await;
        assert_eq!(resp.status(), 200, "CreateImage failed");
        let body: Value = resp.json().await.expect("invalid json");
        body["image"].clone()
    }

    /// Fetch raw bytes from the HTTP surface.
    pub async fn fetch(&self, id: &str) -> reqwest::Response {
        self.client
            .get(format!("http://{}/images/{id}", self.http_addr))
            .send()
            .await
            .expect("http request failed")
    }

    /// Signal shutdown without waiting for in-flight requests.
    pub fn begin_shutdown(&self) {
        self.cancel.cancel();
    }

    /// Stop both surfaces and wait for them to drain.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.server.await.expect("server task panicked")
    }
}

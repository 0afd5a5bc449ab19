//! 集成测试共用的装配与替身
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use fencinghub_ingest::mutation::{CustomerProjectPayload, CustomerSnagPayload};
use fencinghub_ingest::{
    create_router, BatchProcessor, CustomerApi, FsObjectStorage, IngestError, ObjectStorage, RecordId,
    Result, SqliteBackend, USER_ID_HEADER,
};

/// 记录转发调用；`fail_with` 非空时返回对方端点的错误信息
#[derive(Debug, Default)]
pub struct FakeCustomerApi {
    pub projects: Mutex<Vec<(CustomerProjectPayload, Option<String>)>>,
    pub snags: Mutex<Vec<(CustomerSnagPayload, Option<String>)>>,
    pub fail_with: Mutex<Option<String>>,
}

#[async_trait]
impl CustomerApi for FakeCustomerApi {
    async fn create_project(&self, project: &CustomerProjectPayload, cookie: Option<&str>) -> Result<RecordId> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(IngestError::Forward(message));
        }
        let mut projects = self.projects.lock();
        projects.push((project.clone(), cookie.map(str::to_string)));
        Ok(RecordId(format!("proj-{}", projects.len())))
    }

    async fn create_snag(&self, snag: &CustomerSnagPayload, cookie: Option<&str>) -> Result<RecordId> {
        if let Some(message) = self.fail_with.lock().clone() {
            return Err(IngestError::Forward(message));
        }
        let mut snags = self.snags.lock();
        snags.push((snag.clone(), cookie.map(str::to_string)));
        Ok(RecordId(format!("csnag-{}", snags.len())))
    }
}

/// 前 `failures_left` 次上传失败，之后交给文件系统实现
#[derive(Debug)]
pub struct FlakyStorage {
    pub inner: FsObjectStorage,
    pub failures_left: Mutex<usize>,
    pub fail_after: Mutex<usize>,
}

#[async_trait]
impl ObjectStorage for FlakyStorage {
    async fn upload(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        {
            let mut fail_after = self.fail_after.lock();
            if *fail_after > 0 {
                *fail_after -= 1;
            } else {
                let mut failures = self.failures_left.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err(IngestError::Storage("bucket unavailable".into()));
                }
            }
        }
        self.inner.upload(bucket, path, bytes, content_type).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub backend: Arc<SqliteBackend>,
    pub storage: Arc<FlakyStorage>,
    pub customer_api: Arc<FakeCustomerApi>,
    pub router: Router,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_body_limit(10 * 1024 * 1024)
    }

    pub fn with_body_limit(body_limit: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(SqliteBackend::open(&dir.path().join("ingest.db")).unwrap());
        let storage = Arc::new(FlakyStorage {
            inner: FsObjectStorage::new(dir.path().join("objects")),
            failures_left: Mutex::new(0),
            fail_after: Mutex::new(0),
        });
        let customer_api = Arc::new(FakeCustomerApi::default());
        let processor = BatchProcessor::new(backend.clone(), backend.clone(), storage.clone(), customer_api.clone());
        let router = create_router(Arc::new(processor), body_limit);
        Self {
            dir,
            backend,
            storage,
            customer_api,
            router,
        }
    }

    pub fn objects(&self) -> &FsObjectStorage {
        &self.storage.inner
    }

    /// 失败 `count` 次之前先放行 `after` 次上传
    pub fn fail_uploads(&self, after: usize, count: usize) {
        *self.storage.fail_after.lock() = after;
        *self.storage.failures_left.lock() = count;
    }

    pub async fn post_batch(&self, user: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/sync/batch")
            .header("content-type", "application/json")
            .header("cookie", "session=abc");
        if let Some(user) = user {
            request = request.header(USER_ID_HEADER, user);
        }
        let request = request.body(Body::from(serde_json::to_vec(&body).unwrap())).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

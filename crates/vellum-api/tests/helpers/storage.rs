//! Storage wrapper that injects failures into variant writes.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use vellum_storage::{LocalStorage, Storage, StorageBackend, StorageError, StorageResult};

/// Which puts fail: the next `count` writes whose key starts with `prefix`.
#[derive(Debug, Clone)]
pub struct FailurePlan {
    pub prefix: String,
    pub count: usize,
}

impl FailurePlan {
    pub fn none() -> Self {
        Self {
            prefix: String::new(),
            count: 0,
        }
    }

    pub fn variant_puts(count: usize) -> Self {
        Self {
            prefix: "variants/".to_string(),
            count,
        }
    }

    pub fn original_puts(count: usize) -> Self {
        Self {
            prefix: "originals/".to_string(),
            count,
        }
    }
}

pub struct FlakyStorage {
    inner: LocalStorage,
    plan: Mutex<FailurePlan>,
    failed_puts: AtomicUsize,
    puts: Mutex<Vec<String>>,
}

impl FlakyStorage {
    pub fn new(inner: LocalStorage, plan: FailurePlan) -> Self {
        Self {
            inner,
            plan: Mutex::new(plan),
            failed_puts: AtomicUsize::new(0),
            puts: Mutex::new(Vec::new()),
        }
    }

    pub fn failed_puts(&self) -> usize {
        self.failed_puts.load(Ordering::SeqCst)
    }

    /// Keys of successful puts, in order
    pub fn puts(&self) -> Vec<String> {
        self.puts.lock().unwrap().clone()
    }

    fn should_fail(&self, key: &str) -> bool {
        let mut plan = self.plan.lock().unwrap();
        if plan.count > 0 && key.starts_with(&plan.prefix) {
            plan.count -= 1;
            return true;
        }
        false
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if self.should_fail(key) {
            self.failed_puts.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::UploadFailed(format!(
                "injected outage writing {}",
                key
            )));
        }
        self.inner.put(key, data, content_type).await?;
        self.puts.lock().unwrap().push(key.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    fn url(&self, key: &str) -> String {
        self.inner.url(key)
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}
